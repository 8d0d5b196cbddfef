//! Database and bucket handles.

use std::sync::Arc;

use bson::{doc, Bson, Document};

use super::change_stream::{self, Scope};
use super::client::{cursor_reply, MemoryClient};
use super::collection::MemoryCollection;
use super::query;
use super::server::Namespace;
use crate::options::{
    AggregateOptions, ChangeStreamOptions, CollectionOptions, CreateCollectionOptions,
    DatabaseOptions, DropCollectionOptions, ListCollectionsOptions,
};
use crate::{
    BucketHandle, ChangeStreamHandle, CollectionHandle, DatabaseHandle, DriverResult,
    SessionHandle,
};

/// A database of an in-memory deployment.
pub struct MemoryDatabase {
    client: MemoryClient,
    name: String,
    options: DatabaseOptions,
}

impl MemoryDatabase {
    pub(crate) fn new(client: MemoryClient, name: &str, options: DatabaseOptions) -> Self {
        Self {
            client,
            name: name.to_string(),
            options,
        }
    }

    fn list(
        &self,
        filter: Option<Document>,
        name_only: bool,
        batch_size: Option<i64>,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>> {
        let session = self.client.session(session)?;
        let filter = filter.unwrap_or_default();
        let mut command = doc! { "listCollections": 1, "cursor": {} };
        if !filter.is_empty() {
            command.insert("filter", filter.clone());
        }
        if name_only {
            command.insert("nameOnly", true);
        }
        if let Some(batch_size) = batch_size {
            command.insert("cursor", doc! { "batchSize": batch_size });
        }
        let db = self.name.clone();
        self.client.execute(&self.name, command, session, |state, _| {
            let mut listed = Vec::new();
            for spec in state.list_collections(&db) {
                if query::matches(&spec, &filter)? {
                    listed.push(spec);
                }
            }
            let reply = cursor_reply(&format!("{}.$cmd.listCollections", db), &listed);
            Ok((listed, reply))
        })
    }
}

fn create_options_document(options: &CreateCollectionOptions) -> Document {
    let mut out = Document::new();
    let mut put = |key: &str, value: Option<Bson>| {
        if let Some(value) = value {
            out.insert(key, value);
        }
    };
    put("capped", options.capped.map(Bson::Boolean));
    put("size", options.size.map(Bson::Int64));
    put("max", options.max.map(Bson::Int64));
    put("validator", options.validator.clone().map(Bson::Document));
    put("validationLevel", options.validation_level.clone().map(Bson::String));
    put("validationAction", options.validation_action.clone().map(Bson::String));
    put("expireAfterSeconds", options.expire_after_seconds.map(Bson::Int64));
    put("timeseries", options.timeseries.clone().map(Bson::Document));
    put("clusteredIndex", options.clustered_index.clone().map(Bson::Document));
    put(
        "changeStreamPreAndPostImages",
        options.change_stream_pre_and_post_images.clone().map(Bson::Document),
    );
    out
}

impl DatabaseHandle for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str, options: &CollectionOptions) -> Arc<dyn CollectionHandle> {
        let options = CollectionOptions {
            read_concern: options.read_concern.clone().or_else(|| self.options.read_concern.clone()),
            read_preference: options
                .read_preference
                .clone()
                .or_else(|| self.options.read_preference.clone()),
            write_concern: options.write_concern.clone().or_else(|| self.options.write_concern.clone()),
        };
        Arc::new(MemoryCollection::new(
            self.client.clone(),
            Namespace::new(self.name.clone(), name),
            options,
        ))
    }

    fn bucket(&self, options: &Document) -> Arc<dyn BucketHandle> {
        Arc::new(MemoryBucket {
            database_name: self.name.clone(),
            options: options.clone(),
        })
    }

    fn create_collection(
        &self,
        name: &str,
        options: &CreateCollectionOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<()> {
        let session = self.client.session(session)?;
        let collection_options = create_options_document(options);
        let mut command = doc! { "create": name };
        for (k, v) in &collection_options {
            command.insert(k.clone(), v.clone());
        }
        if let Some(write_concern) = &options.write_concern {
            command.insert("writeConcern", write_concern.clone());
        }
        let ns = Namespace::new(self.name.clone(), name);
        self.client.execute(&self.name, command, session, |state, _| {
            state.create_collection(&ns, collection_options)?;
            Ok(((), Document::new()))
        })
    }

    fn drop_collection(
        &self,
        name: &str,
        options: &DropCollectionOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<()> {
        let session = self.client.session(session)?;
        let mut command = doc! { "drop": name };
        if let Some(write_concern) = &options.write_concern {
            command.insert("writeConcern", write_concern.clone());
        }
        let ns = Namespace::new(self.name.clone(), name);
        self.client.execute(&self.name, command, session, |state, _| {
            state.drop_collection(&ns);
            Ok(((), doc! { "ns": ns.to_string() }))
        })
    }

    fn list_collections(
        &self,
        filter: Option<Document>,
        options: &ListCollectionsOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>> {
        self.list(filter, false, options.batch_size, session)
    }

    fn list_collection_names(
        &self,
        filter: Option<Document>,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<String>> {
        let specs = self.list(filter, true, None, session)?;
        Ok(specs
            .iter()
            .filter_map(|spec| spec.get_str("name").ok().map(String::from))
            .collect())
    }

    fn run_command(
        &self,
        command: Document,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Document> {
        let session = self.client.session(session)?;
        let config = &self.client.deployment().config;
        let db = self.name.clone();
        self.client.execute(&self.name, command, session, |state, command| {
            let reply = state.run_command(config, &db, command, None)?;
            Ok((reply.clone(), reply))
        })
    }

    fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: &AggregateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>> {
        let session = self.client.session(session)?;
        let stages: Vec<Bson> = pipeline.iter().cloned().map(Bson::Document).collect();
        let mut command = doc! { "aggregate": 1, "pipeline": stages, "cursor": {} };
        if let Some(batch_size) = options.batch_size {
            command.insert("cursor", doc! { "batchSize": batch_size });
        }
        if let Some(comment) = &options.comment {
            command.insert("comment", comment.clone());
        }
        let ns = format!("{}.$cmd.aggregate", self.name);
        self.client.execute(&self.name, command, session, |_, _| {
            let docs = query::run_pipeline(Vec::new(), &pipeline)?;
            let reply = cursor_reply(&ns, &docs);
            Ok((docs, reply))
        })
    }

    fn watch(
        &self,
        pipeline: Vec<Document>,
        options: &ChangeStreamOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Arc<dyn ChangeStreamHandle>> {
        let session = self.client.session(session)?;
        change_stream::open(
            &self.client,
            Scope::Database(self.name.clone()),
            pipeline,
            options,
            session,
        )
    }
}

/// A GridFS bucket. Only its identity is modelled.
pub struct MemoryBucket {
    database_name: String,
    options: Document,
}

impl BucketHandle for MemoryBucket {
    fn database_name(&self) -> &str {
        &self.database_name
    }

    fn options(&self) -> &Document {
        &self.options
    }
}
