//! Collection handles: CRUD, bulk writes, indexes and renames.

use std::sync::Arc;

use bson::{doc, Bson, Document};
use serde::Serialize;
use unified_core::document::{lookup_path, values_equal};
use unified_core::DriverError;

use super::change_stream::{self, Scope};
use super::client::{cursor_reply, MemoryClient};
use super::query;
use super::server::{ensure_id, Modify, Namespace, ServerState};
use super::session::MemorySession;
use crate::model::{UpdateModification, WriteModel};
use crate::options::*;
use crate::results::{BulkWriteResult, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use crate::{ChangeStreamHandle, CollectionHandle, DriverResult, SessionHandle};

/// A collection of an in-memory deployment.
pub struct MemoryCollection {
    client: MemoryClient,
    ns: Namespace,
    options: CollectionOptions,
}

fn put(command: &mut Document, key: &str, value: Option<impl Into<Bson>>) {
    if let Some(value) = value {
        command.insert(key, value.into());
    }
}

fn update_bson(update: &UpdateModification) -> Bson {
    match update {
        UpdateModification::Document(d) => Bson::Document(d.clone()),
        UpdateModification::Pipeline(stages) => {
            Bson::Array(stages.iter().cloned().map(Bson::Document).collect())
        }
    }
}

fn documents_bson(documents: &[Document]) -> Bson {
    Bson::Array(documents.iter().cloned().map(Bson::Document).collect())
}

/// Attach a partial result to an error.
fn with_partial<T: Serialize>(error: DriverError, partial: &T) -> DriverError {
    match bson::to_bson(partial) {
        Ok(result) => error.with_partial_result(result),
        Err(_) => error,
    }
}

/// Reply of a write command: the count plus any write error.
fn write_reply(n: i64, error: Option<&DriverError>) -> Document {
    let mut reply = doc! { "n": n };
    if let Some(error) = error {
        reply.insert(
            "writeErrors",
            vec![Bson::Document(doc! {
                "index": 0,
                "code": error.code().unwrap_or_default(),
                "errmsg": error.message.clone(),
            })],
        );
    }
    reply
}

/// Default index name: `field_direction` pairs joined by `_`.
fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(k, v)| match v {
            Bson::String(s) => format!("{}_{}", k, s),
            Bson::Int32(i) => format!("{}_{}", k, i),
            Bson::Int64(i) => format!("{}_{}", k, i),
            Bson::Double(d) => format!("{}_{}", k, d),
            other => format!("{}_{}", k, other),
        })
        .collect::<Vec<_>>()
        .join("_")
}

impl MemoryCollection {
    pub(crate) fn new(client: MemoryClient, ns: Namespace, options: CollectionOptions) -> Self {
        Self { client, ns, options }
    }

    fn write_concern(&self, command: &mut Document, session: Option<&MemorySession>) {
        let in_transaction = session.map_or(false, |s| {
            matches!(
                crate::SessionHandle::transaction_state(s),
                unified_core::TransactionState::Starting | unified_core::TransactionState::InProgress
            )
        });
        if !in_transaction {
            put(command, "writeConcern", self.options.write_concern.clone());
        }
    }

    /// Run a write command whose write errors are reported in a successful
    /// reply, as the server does.
    fn write<T>(
        &self,
        command: Document,
        session: Option<&MemorySession>,
        op: impl FnOnce(&mut ServerState) -> (DriverResult<T>, i64),
    ) -> DriverResult<T> {
        self.client
            .execute(&self.ns.db, command, session, |state, _| {
                let (outcome, n) = op(state);
                let reply = write_reply(n, outcome.as_ref().err());
                Ok((outcome, reply))
            })
            .and_then(|outcome| outcome)
    }

    fn find_and_modify(
        &self,
        filter: Document,
        modify: Modify<'_>,
        sort: Option<&Document>,
        projection: Option<&Document>,
        upsert: bool,
        return_after: bool,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>> {
        let session = self.client.session(session)?;
        let mut command = doc! { "findAndModify": self.ns.coll.clone(), "query": filter.clone() };
        match &modify {
            Modify::Delete => {
                command.insert("remove", true);
            }
            Modify::Replace(replacement) => {
                command.insert("update", (*replacement).clone());
            }
            Modify::Update(update) => {
                command.insert("update", update_bson(update));
            }
        }
        put(&mut command, "sort", sort.cloned());
        put(&mut command, "fields", projection.cloned());
        if upsert {
            command.insert("upsert", true);
        }
        if return_after {
            command.insert("new", true);
        }
        self.write_concern(&mut command, session);
        let ns = self.ns.clone();
        self.client.execute(&self.ns.db, command, session, |state, _| {
            let found = state.find_and_modify(&ns, &filter, sort, modify, upsert, return_after)?;
            let found = match (found, projection) {
                (Some(doc), Some(projection)) => Some(query::project(&doc, projection)?),
                (found, _) => found,
            };
            let value = found.clone().map_or(Bson::Null, Bson::Document);
            let reply = doc! { "lastErrorObject": { "n": i32::from(found.is_some()) }, "value": value };
            Ok((found, reply))
        })
    }

    fn update_command(&self, q: &Document, u: Bson, multi: bool, upsert: Option<bool>) -> Document {
        let mut statement = doc! { "q": q.clone(), "u": u };
        if multi {
            statement.insert("multi", true);
        }
        put(&mut statement, "upsert", upsert);
        doc! { "update": self.ns.coll.clone(), "updates": [statement], "ordered": true }
    }

    fn run_update(
        &self,
        filter: Document,
        update: UpdateModification,
        options: &UpdateOptions,
        many: bool,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<UpdateResult> {
        query::validate_update(&update)?;
        let session = self.client.session(session)?;
        let mut command = self.update_command(&filter, update_bson(&update), many, options.upsert);
        put(&mut command, "comment", options.comment.clone());
        put(&mut command, "let", options.let_vars.clone());
        self.write_concern(&mut command, session);
        let upsert = options.upsert.unwrap_or(false);
        self.write(command, session, |state| {
            let outcome = state.update(&self.ns, &filter, &update, upsert, many);
            let n = outcome.as_ref().map_or(0, |r| r.matched_count + r.upserted_count);
            (outcome, n)
        })
    }

    fn run_delete(
        &self,
        filter: Document,
        options: &DeleteOptions,
        many: bool,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<DeleteResult> {
        let session = self.client.session(session)?;
        let mut statement = doc! { "q": filter.clone(), "limit": if many { 0 } else { 1 } };
        put(&mut statement, "collation", options.collation.clone());
        put(&mut statement, "hint", options.hint.clone());
        let mut command = doc! { "delete": self.ns.coll.clone(), "deletes": [statement], "ordered": true };
        put(&mut command, "comment", options.comment.clone());
        put(&mut command, "let", options.let_vars.clone());
        self.write_concern(&mut command, session);
        self.write(command, session, |state| {
            let outcome = state.delete(&self.ns, &filter, many);
            let n = *outcome.as_ref().unwrap_or(&0);
            (outcome.map(|deleted_count| DeleteResult { deleted_count }), n)
        })
    }
}

/// Consecutive requests that travel in one write command.
fn batches(requests: &[WriteModel]) -> Vec<(usize, &[WriteModel])> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=requests.len() {
        if i == requests.len() || requests[i].command_name() != requests[start].command_name() {
            out.push((start, &requests[start..i]));
            start = i;
        }
    }
    out
}

fn batch_command(coll: &str, models: &[WriteModel], ordered: bool) -> Document {
    let command_name = models.first().map_or("insert", WriteModel::command_name);
    let (list_key, statements): (&str, Vec<Bson>) = match command_name {
        "insert" => (
            "documents",
            models
                .iter()
                .filter_map(|m| match m {
                    WriteModel::InsertOne { document } => Some(Bson::Document(document.clone())),
                    _ => None,
                })
                .collect(),
        ),
        "delete" => (
            "deletes",
            models
                .iter()
                .filter_map(|m| match m {
                    WriteModel::DeleteOne { filter, .. } => Some(Bson::Document(doc! { "q": filter.clone(), "limit": 1 })),
                    WriteModel::DeleteMany { filter, .. } => Some(Bson::Document(doc! { "q": filter.clone(), "limit": 0 })),
                    _ => None,
                })
                .collect(),
        ),
        _ => (
            "updates",
            models
                .iter()
                .filter_map(|m| {
                    let (filter, update, multi, upsert) = match m {
                        WriteModel::ReplaceOne { filter, replacement, options } => {
                            (filter, Bson::Document(replacement.clone()), false, options.upsert)
                        }
                        WriteModel::UpdateOne { filter, update, options } => (filter, update_bson(update), false, options.upsert),
                        WriteModel::UpdateMany { filter, update, options } => (filter, update_bson(update), true, options.upsert),
                        _ => return None,
                    };
                    let mut statement = doc! { "q": filter.clone(), "u": update, "multi": multi };
                    put(&mut statement, "upsert", upsert);
                    Some(Bson::Document(statement))
                })
                .collect(),
        ),
    };
    doc! { command_name: coll, list_key: statements, "ordered": ordered }
}

fn merge_update(result: &mut BulkWriteResult, index: usize, update: UpdateResult) {
    result.matched_count += update.matched_count;
    result.modified_count += update.modified_count;
    result.upserted_count += update.upserted_count;
    if let Some(id) = update.upserted_id {
        result.upserted_ids.insert(index.to_string(), id);
    }
}

/// Apply one batch, recording successes into `result`. Returns the first
/// write error.
fn apply_batch(
    state: &mut ServerState,
    ns: &Namespace,
    start: usize,
    models: &[WriteModel],
    ordered: bool,
    result: &mut BulkWriteResult,
) -> Option<DriverError> {
    let mut first_error = None;
    for (offset, model) in models.iter().enumerate() {
        let index = start + offset;
        let outcome = match model {
            WriteModel::InsertOne { document } => {
                let (inserted, error) = state.insert(ns, vec![document.clone()], true);
                if let Some((_, id)) = inserted.into_iter().next() {
                    result.inserted_count += 1;
                    result.inserted_ids.insert(index.to_string(), id);
                }
                error.map_or(Ok(()), Err)
            }
            WriteModel::DeleteOne { filter, .. } => state.delete(ns, filter, false).map(|n| result.deleted_count += n),
            WriteModel::DeleteMany { filter, .. } => state.delete(ns, filter, true).map(|n| result.deleted_count += n),
            WriteModel::ReplaceOne { filter, replacement, options } => state
                .replace(ns, filter, replacement, options.upsert.unwrap_or(false))
                .map(|r| merge_update(result, index, r)),
            WriteModel::UpdateOne { filter, update, options } => state
                .update(ns, filter, update, options.upsert.unwrap_or(false), false)
                .map(|r| merge_update(result, index, r)),
            WriteModel::UpdateMany { filter, update, options } => state
                .update(ns, filter, update, options.upsert.unwrap_or(false), true)
                .map(|r| merge_update(result, index, r)),
        };
        if let Err(error) = outcome {
            if ordered {
                return Some(error);
            }
            first_error.get_or_insert(error);
        }
    }
    first_error
}

impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.ns.coll
    }

    fn database_name(&self) -> &str {
        &self.ns.db
    }

    fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: &AggregateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>> {
        let session = self.client.session(session)?;
        let mut command = doc! {
            "aggregate": self.ns.coll.clone(),
            "pipeline": documents_bson(&pipeline),
            "cursor": {},
        };
        if let Some(batch_size) = options.batch_size {
            command.insert("cursor", doc! { "batchSize": batch_size });
        }
        put(&mut command, "allowDiskUse", options.allow_disk_use);
        put(&mut command, "collation", options.collation.clone());
        put(&mut command, "comment", options.comment.clone());
        put(&mut command, "hint", options.hint.clone());
        put(&mut command, "let", options.let_vars.clone());
        put(&mut command, "maxTimeMS", options.max_time_ms);
        let ns = self.ns.clone();
        self.client.execute(&self.ns.db, command, session, |state, _| {
            let docs = query::run_pipeline(state.documents(&ns), &pipeline)?;
            let reply = cursor_reply(&ns.to_string(), &docs);
            Ok((docs, reply))
        })
    }

    fn bulk_write(
        &self,
        requests: Vec<WriteModel>,
        options: &BulkWriteOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<BulkWriteResult> {
        if requests.is_empty() {
            return Err(DriverError::client("cannot execute an empty bulk write"));
        }
        for request in &requests {
            match request {
                WriteModel::ReplaceOne { replacement, .. } => query::validate_replacement(replacement)?,
                WriteModel::UpdateOne { update, .. } | WriteModel::UpdateMany { update, .. } => {
                    query::validate_update(update)?
                }
                _ => {}
            }
        }
        let session = self.client.session(session)?;
        let mut requests = requests;
        for request in requests.iter_mut() {
            if let WriteModel::InsertOne { document } = request {
                ensure_id(document);
            }
        }
        let ordered = options.ordered.unwrap_or(true);
        let mut result = BulkWriteResult::default();
        let mut first_error: Option<DriverError> = None;

        for (start, models) in batches(&requests) {
            let mut command = batch_command(&self.ns.coll, models, ordered);
            put(&mut command, "bypassDocumentValidation", options.bypass_document_validation);
            put(&mut command, "comment", options.comment.clone());
            put(&mut command, "let", options.let_vars.clone());
            self.write_concern(&mut command, session);
            let ns = self.ns.clone();
            let outcome = self.client.execute(&self.ns.db, command, session, |state, _| {
                let mut partial = BulkWriteResult::default();
                let error = apply_batch(state, &ns, start, models, ordered, &mut partial);
                let n = partial.inserted_count + partial.matched_count + partial.deleted_count + partial.upserted_count;
                let reply = write_reply(n, error.as_ref());
                Ok(((partial, error), reply))
            });
            let error = match outcome {
                Ok((partial, error)) => {
                    result.inserted_count += partial.inserted_count;
                    result.matched_count += partial.matched_count;
                    result.modified_count += partial.modified_count;
                    result.deleted_count += partial.deleted_count;
                    result.upserted_count += partial.upserted_count;
                    for (k, v) in partial.inserted_ids {
                        result.inserted_ids.insert(k, v);
                    }
                    for (k, v) in partial.upserted_ids {
                        result.upserted_ids.insert(k, v);
                    }
                    error
                }
                Err(error) => Some(error),
            };
            if let Some(error) = error {
                first_error.get_or_insert(error);
                if ordered {
                    break;
                }
            }
        }

        match first_error {
            Some(error) => Err(with_partial(error, &result)),
            None => Ok(result),
        }
    }

    fn count_documents(
        &self,
        filter: Document,
        options: &CountOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<i64> {
        let session = self.client.session(session)?;
        let mut pipeline = vec![doc! { "$match": filter.clone() }];
        if let Some(skip) = options.skip {
            pipeline.push(doc! { "$skip": skip });
        }
        if let Some(limit) = options.limit {
            pipeline.push(doc! { "$limit": limit });
        }
        pipeline.push(doc! { "$group": { "_id": 1, "n": { "$sum": 1 } } });
        let mut command = doc! {
            "aggregate": self.ns.coll.clone(),
            "pipeline": documents_bson(&pipeline),
            "cursor": {},
        };
        put(&mut command, "collation", options.collation.clone());
        put(&mut command, "comment", options.comment.clone());
        put(&mut command, "hint", options.hint.clone());
        put(&mut command, "maxTimeMS", options.max_time_ms);
        let ns = self.ns.clone();
        let (skip, limit) = (options.skip, options.limit);
        self.client.execute(&self.ns.db, command, session, |state, _| {
            let n = query::select(state.documents(&ns), &filter, None, skip, limit, None)?.len() as i64;
            let batch = if n > 0 { vec![doc! { "_id": 1, "n": n }] } else { Vec::new() };
            Ok((n, cursor_reply(&ns.to_string(), &batch)))
        })
    }

    fn estimated_document_count(&self, options: &EstimatedDocumentCountOptions) -> DriverResult<i64> {
        let mut command = doc! { "count": self.ns.coll.clone() };
        put(&mut command, "comment", options.comment.clone());
        put(&mut command, "maxTimeMS", options.max_time_ms);
        let ns = self.ns.clone();
        self.client.execute(&self.ns.db, command, None, |state, _| {
            let n = state.collection(&ns).map_or(0, |c| c.documents.len() as i64);
            Ok((n, doc! { "n": n }))
        })
    }

    fn distinct(
        &self,
        field_name: &str,
        filter: Option<Document>,
        options: &DistinctOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Bson>> {
        let session = self.client.session(session)?;
        let filter = filter.unwrap_or_default();
        let mut command = doc! { "distinct": self.ns.coll.clone(), "key": field_name, "query": filter.clone() };
        put(&mut command, "collation", options.collation.clone());
        put(&mut command, "comment", options.comment.clone());
        put(&mut command, "maxTimeMS", options.max_time_ms);
        let ns = self.ns.clone();
        self.client.execute(&self.ns.db, command, session, |state, _| {
            let mut values: Vec<Bson> = Vec::new();
            for doc in query::select(state.documents(&ns), &filter, None, None, None, None)? {
                let candidates = match lookup_path(&doc, field_name) {
                    Some(Bson::Array(items)) => items.clone(),
                    Some(value) => vec![value.clone()],
                    None => continue,
                };
                for candidate in candidates {
                    if !values.iter().any(|v| values_equal(v, &candidate)) {
                        values.push(candidate);
                    }
                }
            }
            let reply = doc! { "values": values.clone() };
            Ok((values, reply))
        })
    }

    fn find(
        &self,
        filter: Option<Document>,
        options: &FindOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>> {
        let session = self.client.session(session)?;
        let filter = filter.unwrap_or_default();
        let mut command = doc! { "find": self.ns.coll.clone(), "filter": filter.clone() };
        put(&mut command, "sort", options.sort.clone());
        put(&mut command, "projection", options.projection.clone());
        put(&mut command, "skip", options.skip);
        put(&mut command, "limit", options.limit);
        put(&mut command, "batchSize", options.batch_size);
        put(&mut command, "allowDiskUse", options.allow_disk_use);
        put(&mut command, "collation", options.collation.clone());
        put(&mut command, "comment", options.comment.clone());
        put(&mut command, "hint", options.hint.clone());
        put(&mut command, "let", options.let_vars.clone());
        put(&mut command, "maxTimeMS", options.max_time_ms);
        put(&mut command, "noCursorTimeout", options.no_cursor_timeout);
        put(&mut command, "readConcern", self.options.read_concern.clone());
        let ns = self.ns.clone();
        self.client.execute(&self.ns.db, command, session, |state, _| {
            let docs = query::select(
                state.documents(&ns),
                &filter,
                options.sort.as_ref(),
                options.skip,
                options.limit,
                options.projection.as_ref(),
            )?;
            let reply = cursor_reply(&ns.to_string(), &docs);
            Ok((docs, reply))
        })
    }

    fn find_one(
        &self,
        filter: Option<Document>,
        options: &FindOneOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>> {
        let options = FindOptions::from(options.clone());
        Ok(self.find(filter, &options, session)?.into_iter().next())
    }

    fn find_one_and_delete(
        &self,
        filter: Document,
        options: &FindOneAndDeleteOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>> {
        self.find_and_modify(
            filter,
            Modify::Delete,
            options.sort.as_ref(),
            options.projection.as_ref(),
            false,
            false,
            session,
        )
    }

    fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        options: &FindOneAndReplaceOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>> {
        query::validate_replacement(&replacement)?;
        self.find_and_modify(
            filter,
            Modify::Replace(&replacement),
            options.sort.as_ref(),
            options.projection.as_ref(),
            options.upsert.unwrap_or(false),
            options.return_document == Some(ReturnDocument::After),
            session,
        )
    }

    fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateModification,
        options: &FindOneAndUpdateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>> {
        query::validate_update(&update)?;
        self.find_and_modify(
            filter,
            Modify::Update(&update),
            options.sort.as_ref(),
            options.projection.as_ref(),
            options.upsert.unwrap_or(false),
            options.return_document == Some(ReturnDocument::After),
            session,
        )
    }

    fn insert_one(
        &self,
        document: Document,
        options: &InsertOneOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<InsertOneResult> {
        let session = self.client.session(session)?;
        let mut document = document;
        let inserted_id = ensure_id(&mut document);
        let mut command = doc! {
            "insert": self.ns.coll.clone(),
            "documents": [document.clone()],
            "ordered": true,
        };
        put(&mut command, "bypassDocumentValidation", options.bypass_document_validation);
        put(&mut command, "comment", options.comment.clone());
        self.write_concern(&mut command, session);
        self.write(command, session, |state| {
            let (inserted, error) = state.insert(&self.ns, vec![document], true);
            let outcome = match error {
                Some(error) => Err(error),
                None => Ok(InsertOneResult { inserted_id }),
            };
            (outcome, inserted.len() as i64)
        })
    }

    fn insert_many(
        &self,
        documents: Vec<Document>,
        options: &InsertManyOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<InsertManyResult> {
        if documents.is_empty() {
            return Err(DriverError::client("insertMany requires at least one document"));
        }
        let session = self.client.session(session)?;
        let mut documents = documents;
        for document in documents.iter_mut() {
            ensure_id(document);
        }
        let ordered = options.ordered.unwrap_or(true);
        let mut command = doc! {
            "insert": self.ns.coll.clone(),
            "documents": documents_bson(&documents),
            "ordered": ordered,
        };
        put(&mut command, "bypassDocumentValidation", options.bypass_document_validation);
        put(&mut command, "comment", options.comment.clone());
        match &options.write_concern {
            Some(write_concern) => {
                command.insert("writeConcern", write_concern.clone());
            }
            None => self.write_concern(&mut command, session),
        }
        self.write(command, session, |state| {
            let (inserted, error) = state.insert(&self.ns, documents, ordered);
            let n = inserted.len() as i64;
            let mut result = InsertManyResult::default();
            for (index, id) in inserted {
                result.inserted_ids.insert(index.to_string(), id);
            }
            let outcome = match error {
                Some(error) => Err(with_partial(error, &result)),
                None => Ok(result),
            };
            (outcome, n)
        })
    }

    fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: &ReplaceOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<UpdateResult> {
        query::validate_replacement(&replacement)?;
        let session = self.client.session(session)?;
        let mut command = self.update_command(&filter, Bson::Document(replacement.clone()), false, options.upsert);
        put(&mut command, "comment", options.comment.clone());
        put(&mut command, "let", options.let_vars.clone());
        self.write_concern(&mut command, session);
        let upsert = options.upsert.unwrap_or(false);
        self.write(command, session, |state| {
            let outcome = state.replace(&self.ns, &filter, &replacement, upsert);
            let n = outcome.as_ref().map_or(0, |r| r.matched_count + r.upserted_count);
            (outcome, n)
        })
    }

    fn update_one(
        &self,
        filter: Document,
        update: UpdateModification,
        options: &UpdateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<UpdateResult> {
        self.run_update(filter, update, options, false, session)
    }

    fn update_many(
        &self,
        filter: Document,
        update: UpdateModification,
        options: &UpdateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<UpdateResult> {
        self.run_update(filter, update, options, true, session)
    }

    fn delete_one(
        &self,
        filter: Document,
        options: &DeleteOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<DeleteResult> {
        self.run_delete(filter, options, false, session)
    }

    fn delete_many(
        &self,
        filter: Document,
        options: &DeleteOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<DeleteResult> {
        self.run_delete(filter, options, true, session)
    }

    fn create_index(
        &self,
        keys: Document,
        name: Option<&str>,
        options: &IndexOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<String> {
        let session = self.client.session(session)?;
        let name = name.map_or_else(|| index_name(&keys), String::from);
        let mut index_options = Document::new();
        put(&mut index_options, "unique", options.unique);
        put(&mut index_options, "sparse", options.sparse);
        put(&mut index_options, "expireAfterSeconds", options.expire_after_seconds);
        let mut spec = doc! { "key": keys.clone(), "name": name.clone() };
        for (k, v) in &index_options {
            spec.insert(k.clone(), v.clone());
        }
        let command = doc! { "createIndexes": self.ns.coll.clone(), "indexes": [spec] };
        let ns = self.ns.clone();
        self.client.execute(&self.ns.db, command, session, |state, _| {
            let name = state.create_index(&ns, &keys, name, index_options)?;
            Ok((name, doc! { "numIndexesAfter": 2 }))
        })
    }

    fn list_indexes(&self, session: Option<&dyn SessionHandle>) -> DriverResult<Vec<Document>> {
        let session = self.client.session(session)?;
        let command = doc! { "listIndexes": self.ns.coll.clone(), "cursor": {} };
        let ns = self.ns.clone();
        self.client.execute(&self.ns.db, command, session, |state, _| {
            let indexes = state.list_indexes(&ns)?;
            let reply = cursor_reply(&ns.to_string(), &indexes);
            Ok((indexes, reply))
        })
    }

    fn list_index_names(&self, session: Option<&dyn SessionHandle>) -> DriverResult<Vec<String>> {
        Ok(self
            .list_indexes(session)?
            .iter()
            .filter_map(|index| index.get_str("name").ok().map(String::from))
            .collect())
    }

    fn rename(
        &self,
        to: &str,
        options: &RenameCollectionOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<()> {
        let session = self.client.session(session)?;
        let target = Namespace::new(self.ns.db.clone(), to);
        let mut command = doc! { "renameCollection": self.ns.to_string(), "to": target.to_string() };
        put(&mut command, "dropTarget", options.drop_target);
        put(&mut command, "comment", options.comment.clone());
        let from = self.ns.clone();
        let drop_target = options.drop_target.unwrap_or(false);
        self.client.execute("admin", command, session, |state, _| {
            state.rename_collection(&from, &target, drop_target)?;
            Ok(((), Document::new()))
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
            Scope::Collection(self.ns.clone()),
            pipeline,
            options,
            session,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_models_share_a_batch() {
        let requests = vec![
            WriteModel::InsertOne { document: doc! { "_id": 1 } },
            WriteModel::InsertOne { document: doc! { "_id": 2 } },
            WriteModel::DeleteOne { filter: doc! {}, options: Default::default() },
            WriteModel::InsertOne { document: doc! { "_id": 3 } },
        ];
        let starts: Vec<(usize, usize)> = batches(&requests).iter().map(|(s, m)| (*s, m.len())).collect();
        assert_eq!(starts, vec![(0, 2), (2, 1), (3, 1)]);
    }

    #[test]
    fn default_index_names() {
        assert_eq!(index_name(&doc! { "x": 1, "y": -1 }), "x_1_y_-1");
        assert_eq!(index_name(&doc! { "loc": "2dsphere" }), "loc_2dsphere");
    }
}
