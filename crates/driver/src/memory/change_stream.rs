//! Change streams over the server's change log.

use std::sync::Arc;

use bson::{doc, Bson, Document};
use parking_lot::Mutex;
use unified_core::DriverError;

use super::client::{cursor_reply, MemoryClient};
use super::query;
use super::server::Namespace;
use super::session::MemorySession;
use super::Deployment;
use crate::options::ChangeStreamOptions;
use crate::{ChangeStreamHandle, DriverResult};

/// Stages allowed after `$changeStream`.
const ALLOWED_STAGES: &[&str] = &["$match", "$project", "$addFields", "$set", "$unset"];

/// What a change stream watches.
#[derive(Debug, Clone)]
pub(crate) enum Scope {
    Cluster,
    Database(String),
    Collection(Namespace),
}

impl Scope {
    fn contains(&self, event: &Document) -> bool {
        let Ok(ns) = event.get_document("ns") else {
            return false;
        };
        let db = ns.get_str("db").unwrap_or_default();
        match self {
            Scope::Cluster => true,
            Scope::Database(name) => db == name.as_str(),
            Scope::Collection(target) => {
                db == target.db && ns.get_str("coll").unwrap_or_default() == target.coll
            }
        }
    }
}

/// Open a change stream positioned after every change recorded so far.
pub(crate) fn open(
    client: &MemoryClient,
    scope: Scope,
    pipeline: Vec<Document>,
    options: &ChangeStreamOptions,
    session: Option<&MemorySession>,
) -> DriverResult<Arc<dyn ChangeStreamHandle>> {
    for stage in &pipeline {
        let name = stage.keys().next().map(String::as_str).unwrap_or_default();
        if !ALLOWED_STAGES.contains(&name) {
            return Err(DriverError::server(
                40324,
                "Location40324",
                format!("{} is not permitted in a $changeStream pipeline", name),
            ));
        }
    }

    let mut stage = Document::new();
    if let Some(full_document) = &options.full_document {
        stage.insert("fullDocument", full_document.clone());
    }
    if let Some(before_change) = &options.full_document_before_change {
        stage.insert("fullDocumentBeforeChange", before_change.clone());
    }
    if let Some(resume_after) = &options.resume_after {
        stage.insert("resumeAfter", resume_after.clone());
    }
    if let Some(start_after) = &options.start_after {
        stage.insert("startAfter", start_after.clone());
    }
    if options.show_expanded_events == Some(true) {
        stage.insert("showExpandedEvents", true);
    }
    let (database, target) = match &scope {
        Scope::Cluster => {
            stage.insert("allChangesForCluster", true);
            ("admin".to_string(), Bson::Int32(1))
        }
        Scope::Database(name) => (name.clone(), Bson::Int32(1)),
        Scope::Collection(ns) => (ns.db.clone(), Bson::String(ns.coll.clone())),
    };
    let mut stages = vec![Bson::Document(doc! { "$changeStream": stage })];
    stages.extend(pipeline.iter().cloned().map(Bson::Document));
    let mut cursor = Document::new();
    if let Some(batch_size) = options.batch_size {
        cursor.insert("batchSize", batch_size);
    }
    let mut command = doc! { "aggregate": target, "pipeline": stages, "cursor": cursor };
    if let Some(comment) = &options.comment {
        command.insert("comment", comment.clone());
    }

    let cursor_ns = format!("{}.$cmd.aggregate", database);
    let position = client.execute(&database, command, session, |state, _| {
        Ok((state.change_log.len(), cursor_reply(&cursor_ns, &[])))
    })?;

    Ok(Arc::new(MemoryChangeStream {
        deployment: Arc::clone(client.deployment()),
        scope,
        pipeline,
        update_lookup: options.full_document.as_deref() == Some("updateLookup"),
        position: Mutex::new(position),
    }))
}

/// A change stream reading the deployment's change log.
pub struct MemoryChangeStream {
    deployment: Arc<Deployment>,
    scope: Scope,
    pipeline: Vec<Document>,
    update_lookup: bool,
    position: Mutex<usize>,
}

impl MemoryChangeStream {
    fn lookup(&self, event: &mut Document, current: &[Document]) {
        let key = event.get_document("documentKey").ok().and_then(|k| k.get("_id")).cloned();
        let found = key.and_then(|id| {
            current
                .iter()
                .find(|d| d.get("_id").map_or(false, |v| unified_core::document::values_equal(v, &id)))
                .cloned()
        });
        event.insert("fullDocument", found.map_or(Bson::Null, Bson::Document));
    }
}

impl ChangeStreamHandle for MemoryChangeStream {
    fn next_document(&self) -> DriverResult<Document> {
        let mut position = self.position.lock();
        let state = self.deployment.state.lock();
        // Aborted transactions truncate the log
        let start = (*position).min(state.change_log.len());
        for (offset, event) in state.change_log[start..].iter().enumerate() {
            if !self.scope.contains(event) {
                continue;
            }
            let mut event = event.clone();
            if self.update_lookup && event.get_str("operationType").ok() == Some("update") {
                let ns = event.get_document("ns").cloned().unwrap_or_default();
                let ns = Namespace::new(
                    ns.get_str("db").unwrap_or_default(),
                    ns.get_str("coll").unwrap_or_default(),
                );
                self.lookup(&mut event, &state.documents(&ns));
            }
            let mut output = query::run_pipeline(vec![event], &self.pipeline)?;
            if let Some(event) = output.pop() {
                *position = start + offset + 1;
                return Ok(event);
            }
        }
        *position = state.change_log.len();
        Err(DriverError::client("no change events available"))
    }
}
