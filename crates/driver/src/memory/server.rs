//! Server-side state of an in-memory deployment.
//!
//! One [`ServerState`] is shared by every client of a deployment behind a
//! single mutex. Each command runs to completion while holding it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use tracing::debug;
use unified_core::document::{as_number, values_equal};
use unified_core::{DriverError, TopologyKind};
use uuid::Uuid;

use super::query;
use super::DeploymentConfig;
use crate::model::UpdateModification;
use crate::results::UpdateResult;
use crate::DriverResult;

/// Code name for the server error codes the backend produces.
pub(crate) fn code_name(code: i32) -> &'static str {
    match code {
        2 => "BadValue",
        8 => "UnknownError",
        9 => "FailedToParse",
        11 => "UserNotFound",
        13 => "Unauthorized",
        14 => "TypeMismatch",
        20 => "IllegalOperation",
        24 => "LockTimeout",
        26 => "NamespaceNotFound",
        43 => "CursorNotFound",
        48 => "NamespaceExists",
        50 => "MaxTimeMSExpired",
        59 => "CommandNotFound",
        66 => "ImmutableField",
        86 => "IndexKeySpecsConflict",
        89 => "NetworkTimeout",
        91 => "ShutdownInProgress",
        112 => "WriteConflict",
        189 => "PrimarySteppedDown",
        251 => "NoSuchTransaction",
        262 => "ExceededTimeLimit",
        10107 => "NotWritablePrimary",
        11000 => "DuplicateKey",
        11600 => "InterruptedAtShutdown",
        11602 => "InterruptedDueToReplStateChange",
        13435 => "NotPrimaryNoSecondaryOk",
        13436 => "NotPrimaryOrSecondary",
        _ => "",
    }
}

/// Fields the driver adds to every command.
const COMMAND_ENVELOPE: &[&str] = &[
    "$db",
    "lsid",
    "txnNumber",
    "startTransaction",
    "autocommit",
    "readConcern",
    "writeConcern",
    "comment",
];

fn server_error(code: i32, message: impl Into<String>) -> DriverError {
    DriverError::server(code, code_name(code), message)
}

/// `database.collection`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Namespace {
    pub(crate) db: String,
    pub(crate) coll: String,
}

impl Namespace {
    pub(crate) fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    fn to_document(&self) -> Document {
        doc! { "db": self.db.clone(), "coll": self.coll.clone() }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

/// Documents, indexes and creation options of one collection.
#[derive(Debug, Clone)]
pub(crate) struct CollectionState {
    pub(crate) documents: Vec<Document>,
    pub(crate) indexes: Vec<Document>,
    pub(crate) options: Document,
}

impl CollectionState {
    fn new(options: Document) -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![doc! { "v": 2, "key": { "_id": 1 }, "name": "_id_" }],
            options,
        }
    }

    fn position_of(&self, id: &Bson) -> Option<usize> {
        self.documents
            .iter()
            .position(|d| d.get("_id").map_or(false, |v| values_equal(v, id)))
    }

    /// The index a document would violate, if any. `skip` excludes the
    /// document being replaced.
    fn duplicate_key(&self, candidate: &Document, skip: Option<usize>) -> Option<String> {
        for index in &self.indexes {
            let name = index.get_str("name").unwrap_or_default();
            let unique = name == "_id_" || index.get_bool("unique").unwrap_or(false);
            let keys = match index.get_document("key") {
                Ok(keys) if unique => keys,
                _ => continue,
            };
            let clash = self.documents.iter().enumerate().any(|(i, existing)| {
                Some(i) != skip
                    && keys.keys().all(|k| match (existing.get(k), candidate.get(k)) {
                        (Some(a), Some(b)) => values_equal(a, b),
                        (None, None) => true,
                        _ => false,
                    })
            });
            if clash {
                return Some(name.to_string());
            }
        }
        None
    }
}

pub(crate) type Databases = BTreeMap<String, BTreeMap<String, CollectionState>>;

/// Snapshot taken at the first operation of a transaction.
#[derive(Debug, Clone)]
pub(crate) struct TransactionRecord {
    txn_number: i64,
    databases: Databases,
    change_log_len: usize,
}

/// A configured `failCommand` fail point.
#[derive(Debug, Clone)]
pub(crate) struct FailPoint {
    /// `None` for `alwaysOn`
    remaining: Option<u64>,
    commands: Vec<String>,
    error_code: Option<i32>,
    error_labels: Option<Vec<String>>,
    close_connection: bool,
    address: Option<String>,
}

impl FailPoint {
    fn parse(command: &Document, address: Option<&str>) -> DriverResult<Option<Self>> {
        let name = command.get_str("configureFailPoint").unwrap_or_default();
        if name != "failCommand" {
            return Err(server_error(2, format!("unsupported fail point: {}", name)));
        }
        let remaining = match command.get("mode") {
            Some(Bson::String(mode)) if mode == "off" => return Ok(None),
            Some(Bson::String(mode)) if mode == "alwaysOn" => None,
            Some(Bson::Document(mode)) => match mode.get("times").and_then(as_number) {
                Some(times) if times > 0.0 => Some(times as u64),
                _ => return Err(server_error(2, "fail point mode must set a positive times")),
            },
            _ => return Err(server_error(2, "invalid fail point mode")),
        };
        let data = command.get_document("data").cloned().unwrap_or_default();
        let commands: Vec<String> = data
            .get_array("failCommands")
            .map(|names| names.iter().filter_map(Bson::as_str).map(String::from).collect())
            .unwrap_or_default();
        let error_labels: Option<Vec<String>> = data.get_array("errorLabels").ok().map(|labels| {
            labels.iter().filter_map(Bson::as_str).map(String::from).collect()
        });
        Ok(Some(Self {
            remaining,
            commands,
            error_code: data.get("errorCode").and_then(as_number).map(|c| c as i32),
            error_labels,
            close_connection: data.get_bool("closeConnection").unwrap_or(false),
            address: address.map(String::from),
        }))
    }

    fn applies_to(&self, command_name: &str, address: &str) -> bool {
        self.commands.iter().any(|c| c == command_name)
            && self.address.as_deref().map_or(true, |a| a == address)
    }

    fn error(&self, in_transaction: bool, command_name: &str) -> Option<DriverError> {
        let (mut error, default_labels) = if self.close_connection {
            let label = match (in_transaction, command_name) {
                (true, "commitTransaction") => Some("UnknownTransactionCommitResult"),
                (true, _) => Some("TransientTransactionError"),
                _ => None,
            };
            (DriverError::network("connection closed by failCommand fail point"), label)
        } else {
            let code = self.error_code?;
            (server_error(code, "Failing command via 'failCommand' failpoint"), None)
        };
        error.labels = match &self.error_labels {
            Some(labels) => labels.clone(),
            None => default_labels.map(|l| vec![l.to_string()]).unwrap_or_default(),
        };
        Some(error)
    }
}

/// A row-level change for the change log.
pub(crate) enum Change<'a> {
    Insert(&'a Document),
    Update { before: &'a Document, after: &'a Document },
    Replace(&'a Document),
    Delete(&'a Bson),
}

/// How `findOneAnd*` modifies the matched document.
pub(crate) enum Modify<'a> {
    Delete,
    Replace(&'a Document),
    Update(&'a UpdateModification),
}

/// Everything the server knows.
#[derive(Debug, Default)]
pub(crate) struct ServerState {
    pub(crate) databases: Databases,
    pub(crate) fail_points: Vec<FailPoint>,
    pub(crate) transactions: HashMap<Uuid, TransactionRecord>,
    pub(crate) change_log: Vec<Document>,
    change_seq: u64,
}

impl ServerState {
    // ==================== Namespaces ====================

    pub(crate) fn collection(&self, ns: &Namespace) -> Option<&CollectionState> {
        self.databases.get(&ns.db).and_then(|db| db.get(&ns.coll))
    }

    /// Look up a collection, creating it implicitly as writes do.
    pub(crate) fn collection_mut(&mut self, ns: &Namespace) -> &mut CollectionState {
        self.databases
            .entry(ns.db.clone())
            .or_default()
            .entry(ns.coll.clone())
            .or_insert_with(|| CollectionState::new(Document::new()))
    }

    pub(crate) fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.collection(ns).map(|c| c.documents.clone()).unwrap_or_default()
    }

    pub(crate) fn create_collection(&mut self, ns: &Namespace, options: Document) -> DriverResult<()> {
        if self.collection(ns).is_some() {
            return Err(server_error(48, format!("Collection {} already exists.", ns)));
        }
        self.databases
            .entry(ns.db.clone())
            .or_default()
            .insert(ns.coll.clone(), CollectionState::new(options));
        Ok(())
    }

    /// Drop a collection. Returns whether it existed.
    pub(crate) fn drop_collection(&mut self, ns: &Namespace) -> bool {
        let existed = self
            .databases
            .get_mut(&ns.db)
            .map_or(false, |db| db.remove(&ns.coll).is_some());
        if existed {
            self.push_change("drop", ns, Document::new());
        }
        existed
    }

    pub(crate) fn drop_database(&mut self, db: &str) {
        if let Some(collections) = self.databases.remove(db) {
            for coll in collections.keys() {
                self.push_change("drop", &Namespace::new(db, coll.clone()), Document::new());
            }
        }
    }

    pub(crate) fn rename_collection(&mut self, from: &Namespace, to: &Namespace, drop_target: bool) -> DriverResult<()> {
        if self.collection(from).is_none() {
            return Err(server_error(26, format!("Source collection {} does not exist", from)));
        }
        if self.collection(to).is_some() {
            if !drop_target {
                return Err(server_error(48, "target namespace exists"));
            }
            self.drop_collection(to);
        }
        let state = self
            .databases
            .get_mut(&from.db)
            .and_then(|db| db.remove(&from.coll))
            .ok_or_else(|| server_error(26, format!("Source collection {} does not exist", from)))?;
        self.databases
            .entry(to.db.clone())
            .or_default()
            .insert(to.coll.clone(), state);
        self.push_change("rename", from, doc! { "to": to.to_document() });
        Ok(())
    }

    pub(crate) fn list_collections(&self, db: &str) -> Vec<Document> {
        self.databases
            .get(db)
            .map(|collections| {
                collections
                    .iter()
                    .map(|(name, state)| {
                        doc! {
                            "name": name.clone(),
                            "type": "collection",
                            "options": state.options.clone(),
                            "info": { "readOnly": false },
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn list_databases(&self) -> Vec<Document> {
        self.databases
            .iter()
            .map(|(name, collections)| {
                doc! {
                    "name": name.clone(),
                    "sizeOnDisk": collections.values().map(|c| c.documents.len() as i64).sum::<i64>(),
                    "empty": collections.values().all(|c| c.documents.is_empty()),
                }
            })
            .collect()
    }

    // ==================== Writes ====================

    /// Insert documents in order, stopping at the first failure when
    /// `ordered`. Returns the `(index, _id)` pairs that were inserted and the
    /// first error, if any.
    pub(crate) fn insert(
        &mut self,
        ns: &Namespace,
        documents: Vec<Document>,
        ordered: bool,
    ) -> (Vec<(usize, Bson)>, Option<DriverError>) {
        let mut inserted = Vec::new();
        let mut first_error = None;
        for (index, mut document) in documents.into_iter().enumerate() {
            let id = ensure_id(&mut document);
            let collection = self.collection_mut(ns);
            if let Some(index_name) = collection.duplicate_key(&document, None) {
                let error = duplicate_key_error(ns, &index_name, &id);
                first_error.get_or_insert(error);
                if ordered {
                    break;
                }
                continue;
            }
            collection.documents.push(document);
            let stored = collection.documents.last().cloned().unwrap_or_default();
            self.record_change(ns, Change::Insert(&stored));
            inserted.push((index, id));
        }
        (inserted, first_error)
    }

    /// Update the first (or every) matching document, upserting if asked.
    pub(crate) fn update(
        &mut self,
        ns: &Namespace,
        filter: &Document,
        update: &UpdateModification,
        upsert: bool,
        many: bool,
    ) -> DriverResult<UpdateResult> {
        query::validate_update(update)?;
        let positions = self.matching_positions(ns, filter, many)?;
        if positions.is_empty() {
            if !upsert {
                return Ok(UpdateResult::default());
            }
            let mut seed = query::upsert_seed(filter);
            query::apply_update(&mut seed, update)?;
            return self.upsert(ns, seed);
        }
        let mut result = UpdateResult {
            matched_count: positions.len() as i64,
            ..Default::default()
        };
        for position in positions {
            let collection = self.collection_mut(ns);
            let before = collection.documents[position].clone();
            let mut after = before.clone();
            if !query::apply_update(&mut after, update)? {
                continue;
            }
            if let Some(index_name) = collection.duplicate_key(&after, Some(position)) {
                let id = before.get("_id").cloned().unwrap_or(Bson::Null);
                return Err(duplicate_key_error(ns, &index_name, &id));
            }
            collection.documents[position] = after.clone();
            self.record_change(ns, Change::Update { before: &before, after: &after });
            result.modified_count += 1;
        }
        Ok(result)
    }

    /// Replace the first matching document, upserting if asked.
    pub(crate) fn replace(
        &mut self,
        ns: &Namespace,
        filter: &Document,
        replacement: &Document,
        upsert: bool,
    ) -> DriverResult<UpdateResult> {
        query::validate_replacement(replacement)?;
        let position = self.matching_positions(ns, filter, false)?.into_iter().next();
        let position = match position {
            Some(position) => position,
            None if upsert => {
                let mut seed = query::upsert_seed(filter);
                for (k, v) in replacement {
                    seed.insert(k.clone(), v.clone());
                }
                return self.upsert(ns, seed);
            }
            None => return Ok(UpdateResult::default()),
        };
        let collection = self.collection_mut(ns);
        let before = collection.documents[position].clone();
        let after = query::replace_document(&before, replacement);
        if let Some(index_name) = collection.duplicate_key(&after, Some(position)) {
            let id = before.get("_id").cloned().unwrap_or(Bson::Null);
            return Err(duplicate_key_error(ns, &index_name, &id));
        }
        let modified = after != before;
        collection.documents[position] = after.clone();
        if modified {
            self.record_change(ns, Change::Replace(&after));
        }
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: i64::from(modified),
            ..Default::default()
        })
    }

    fn upsert(&mut self, ns: &Namespace, document: Document) -> DriverResult<UpdateResult> {
        let (inserted, error) = self.insert(ns, vec![document], true);
        if let Some(error) = error {
            return Err(error);
        }
        Ok(UpdateResult {
            upserted_count: 1,
            upserted_id: inserted.into_iter().next().map(|(_, id)| id),
            ..Default::default()
        })
    }

    /// Delete the first (or every) matching document. Returns the count.
    pub(crate) fn delete(&mut self, ns: &Namespace, filter: &Document, many: bool) -> DriverResult<i64> {
        let mut positions = self.matching_positions(ns, filter, many)?;
        positions.sort_unstable_by(|a, b| b.cmp(a));
        let mut deleted = 0;
        for position in positions {
            let removed = self.collection_mut(ns).documents.remove(position);
            let id = removed.get("_id").cloned().unwrap_or(Bson::Null);
            self.record_change(ns, Change::Delete(&id));
            deleted += 1;
        }
        Ok(deleted)
    }

    /// `findOneAnd*`: modify the first match in sort order and return the
    /// document before or after the modification.
    pub(crate) fn find_and_modify(
        &mut self,
        ns: &Namespace,
        filter: &Document,
        sort: Option<&Document>,
        modify: Modify<'_>,
        upsert: bool,
        return_after: bool,
    ) -> DriverResult<Option<Document>> {
        let mut candidates = query::select(self.documents(ns), filter, sort, None, Some(1), None)?;
        let target = match candidates.pop() {
            Some(target) => target,
            None => {
                let upserted = match modify {
                    Modify::Update(update) if upsert => self.update(ns, filter, update, true, false)?,
                    Modify::Replace(replacement) if upsert => self.replace(ns, filter, replacement, true)?,
                    _ => return Ok(None),
                };
                if !return_after {
                    return Ok(None);
                }
                let id = upserted.upserted_id.unwrap_or(Bson::Null);
                return Ok(self.find_by_id(ns, &id));
            }
        };
        let id = target.get("_id").cloned().unwrap_or(Bson::Null);
        let by_id = doc! { "_id": id.clone() };
        match modify {
            Modify::Delete => {
                self.delete(ns, &by_id, false)?;
                return Ok(Some(target));
            }
            Modify::Replace(replacement) => {
                self.replace(ns, &by_id, replacement, false)?;
            }
            Modify::Update(update) => {
                self.update(ns, &by_id, update, false, false)?;
            }
        }
        if return_after {
            Ok(self.find_by_id(ns, &id))
        } else {
            Ok(Some(target))
        }
    }

    fn find_by_id(&self, ns: &Namespace, id: &Bson) -> Option<Document> {
        let collection = self.collection(ns)?;
        collection.position_of(id).map(|p| collection.documents[p].clone())
    }

    fn matching_positions(&self, ns: &Namespace, filter: &Document, many: bool) -> DriverResult<Vec<usize>> {
        let mut positions = Vec::new();
        if let Some(collection) = self.collection(ns) {
            for (position, document) in collection.documents.iter().enumerate() {
                if query::matches(document, filter)? {
                    positions.push(position);
                    if !many {
                        break;
                    }
                }
            }
        }
        Ok(positions)
    }

    // ==================== Indexes ====================

    pub(crate) fn create_index(&mut self, ns: &Namespace, keys: &Document, name: String, options: Document) -> DriverResult<String> {
        let collection = self.collection_mut(ns);
        if let Some(existing) = collection
            .indexes
            .iter()
            .find(|i| i.get_str("name").ok() == Some(name.as_str()))
        {
            if existing.get_document("key").ok() != Some(keys) {
                return Err(server_error(
                    86,
                    format!("An existing index has the same name as the requested index: {}", name),
                ));
            }
            return Ok(name);
        }
        let mut index = doc! { "v": 2, "key": keys.clone(), "name": name.clone() };
        for (k, v) in options {
            index.insert(k, v);
        }
        collection.indexes.push(index);
        Ok(name)
    }

    pub(crate) fn list_indexes(&self, ns: &Namespace) -> DriverResult<Vec<Document>> {
        self.collection(ns)
            .map(|c| c.indexes.clone())
            .ok_or_else(|| server_error(26, format!("ns does not exist: {}", ns)))
    }

    // ==================== Change log ====================

    pub(crate) fn record_change(&mut self, ns: &Namespace, change: Change<'_>) {
        match change {
            Change::Insert(document) => {
                let key = document_key(document);
                self.push_change(
                    "insert",
                    ns,
                    doc! { "documentKey": key, "fullDocument": document.clone() },
                );
            }
            Change::Update { before, after } => {
                let mut updated = Document::new();
                for (k, v) in after {
                    if before.get(k) != Some(v) {
                        updated.insert(k.clone(), v.clone());
                    }
                }
                let removed: Vec<Bson> = before
                    .keys()
                    .filter(|k| !after.contains_key(k.as_str()))
                    .map(|k| Bson::String(k.clone()))
                    .collect();
                self.push_change(
                    "update",
                    ns,
                    doc! {
                        "documentKey": document_key(after),
                        "updateDescription": { "updatedFields": updated, "removedFields": removed },
                    },
                );
            }
            Change::Replace(document) => {
                self.push_change(
                    "replace",
                    ns,
                    doc! { "documentKey": document_key(document), "fullDocument": document.clone() },
                );
            }
            Change::Delete(id) => {
                self.push_change("delete", ns, doc! { "documentKey": { "_id": id.clone() } });
            }
        }
    }

    fn push_change(&mut self, operation_type: &str, ns: &Namespace, fields: Document) {
        self.change_seq += 1;
        let mut event = doc! {
            "_id": { "_data": format!("{:016X}", self.change_seq) },
            "operationType": operation_type,
            "ns": ns.to_document(),
        };
        for (k, v) in fields {
            event.insert(k, v);
        }
        self.change_log.push(event);
    }

    // ==================== Transactions ====================

    pub(crate) fn begin_transaction(&mut self, lsid: Uuid, txn_number: i64) {
        let record = TransactionRecord {
            txn_number,
            databases: self.databases.clone(),
            change_log_len: self.change_log.len(),
        };
        self.transactions.insert(lsid, record);
    }

    pub(crate) fn commit_transaction(&mut self, lsid: &Uuid, txn_number: i64, retry: bool) -> DriverResult<()> {
        match self.transactions.get(lsid) {
            Some(record) if record.txn_number == txn_number => {
                self.transactions.remove(lsid);
                Ok(())
            }
            // A retried commit of an already committed transaction succeeds
            None if retry => Ok(()),
            _ => Err(no_such_transaction(txn_number)),
        }
    }

    pub(crate) fn abort_transaction(&mut self, lsid: &Uuid, txn_number: i64) -> DriverResult<()> {
        match self.transactions.remove(lsid) {
            Some(record) if record.txn_number == txn_number => {
                self.restore(record);
                Ok(())
            }
            _ => Err(no_such_transaction(txn_number)),
        }
    }

    fn restore(&mut self, record: TransactionRecord) {
        self.databases = record.databases;
        self.change_log.truncate(record.change_log_len);
    }

    /// Abort every open transaction.
    pub(crate) fn kill_all_sessions(&mut self) {
        let records: Vec<TransactionRecord> = self.transactions.drain().map(|(_, r)| r).collect();
        if let Some(oldest) = records.into_iter().min_by_key(|r| r.change_log_len) {
            debug!(target: "unified::memory", "killAllSessions aborted open transactions");
            self.restore(oldest);
        }
    }

    // ==================== Fail points ====================

    pub(crate) fn configure_fail_point(&mut self, command: &Document, address: Option<&str>) -> DriverResult<()> {
        match FailPoint::parse(command, address)? {
            Some(fail_point) => {
                debug!(
                    target: "unified::memory",
                    commands = ?fail_point.commands,
                    address = ?fail_point.address,
                    "fail point enabled"
                );
                self.fail_points.push(fail_point);
            }
            None => {
                self.fail_points
                    .retain(|fp| address.map_or(false, |a| fp.address.as_deref() != Some(a)));
            }
        }
        Ok(())
    }

    /// Consume a fail point matching the command, returning the error it
    /// injects.
    pub(crate) fn trigger_fail_point(
        &mut self,
        command_name: &str,
        address: &str,
        in_transaction: bool,
    ) -> Option<DriverError> {
        let index = self
            .fail_points
            .iter()
            .position(|fp| fp.applies_to(command_name, address))?;
        let error = self.fail_points[index].error(in_transaction, command_name);
        if let Some(remaining) = self.fail_points[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.fail_points.remove(index);
            }
        }
        error
    }

    // ==================== Commands ====================

    /// Run a generic command (`runCommand`).
    pub(crate) fn run_command(
        &mut self,
        config: &DeploymentConfig,
        db: &str,
        command: &Document,
        address: Option<&str>,
    ) -> DriverResult<Document> {
        let name = command.keys().next().map(String::as_str).unwrap_or_default();
        let reply = match name {
            "ping" | "endSessions" => doc! {},
            "hello" | "isMaster" | "ismaster" => hello_reply(config),
            "buildInfo" | "buildinfo" => {
                let v = config.server_version;
                doc! {
                    "version": v.to_string(),
                    "versionArray": [v.major as i32, v.minor as i32, v.patch as i32, 0],
                }
            }
            "getParameter" => config.server_parameters.clone(),
            "configureFailPoint" => {
                self.configure_fail_point(command, address)?;
                doc! {}
            }
            "killAllSessions" => {
                self.kill_all_sessions();
                doc! {}
            }
            "listDatabases" => {
                let databases: Vec<Bson> = self.list_databases().into_iter().map(Bson::Document).collect();
                doc! { "databases": databases }
            }
            "listCollections" => {
                let batch: Vec<Bson> = self.list_collections(db).into_iter().map(Bson::Document).collect();
                doc! { "cursor": { "id": 0_i64, "ns": format!("{}.$cmd.listCollections", db), "firstBatch": batch } }
            }
            "create" => {
                let coll = command.get_str("create").unwrap_or_default();
                let options: Document = command
                    .iter()
                    .filter(|(k, _)| !COMMAND_ENVELOPE.contains(&k.as_str()) && k.as_str() != "create")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                self.create_collection(&Namespace::new(db, coll), options)?;
                doc! {}
            }
            "drop" => {
                let ns = Namespace::new(db, command.get_str("drop").unwrap_or_default());
                if !self.drop_collection(&ns) {
                    return Err(server_error(26, "ns not found"));
                }
                doc! {}
            }
            "dropDatabase" => {
                self.drop_database(db);
                doc! {}
            }
            "insert" => {
                let ns = Namespace::new(db, command.get_str("insert").unwrap_or_default());
                let documents: Vec<Document> = command
                    .get_array("documents")
                    .map(|docs| docs.iter().filter_map(|d| d.as_document().cloned()).collect())
                    .unwrap_or_default();
                let (inserted, error) = self.insert(&ns, documents, true);
                if let Some(error) = error {
                    return Err(error);
                }
                doc! { "n": inserted.len() as i32 }
            }
            "count" => {
                let ns = Namespace::new(db, command.get_str("count").unwrap_or_default());
                let filter = command.get_document("query").cloned().unwrap_or_default();
                let n = query::select(self.documents(&ns), &filter, None, None, None, None)?.len();
                doc! { "n": n as i32 }
            }
            other => {
                return Err(server_error(59, format!("no such command: '{}'", other)));
            }
        };
        let mut reply = reply;
        reply.insert("ok", 1.0);
        Ok(reply)
    }
}

fn hello_reply(config: &DeploymentConfig) -> Document {
    let mut reply = doc! {
        "isWritablePrimary": true,
        "ismaster": true,
        "maxWireVersion": 21,
    };
    match config.topology {
        TopologyKind::ReplicaSet => {
            let hosts: Vec<Bson> = config.hosts.iter().map(|h| Bson::String(h.clone())).collect();
            reply.insert("setName", "rs0");
            reply.insert("hosts", hosts);
            if let Some(primary) = config.hosts.first() {
                reply.insert("primary", primary.as_str());
            }
        }
        TopologyKind::Sharded => {
            reply.insert("msg", "isdbgrid");
        }
        TopologyKind::LoadBalanced => {
            reply.insert("serviceId", ObjectId::new());
        }
        TopologyKind::Single => {}
    }
    reply
}

pub(crate) fn ensure_id(document: &mut Document) -> Bson {
    match document.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            let mut with_id = doc! { "_id": id.clone() };
            for (k, v) in std::mem::take(document) {
                with_id.insert(k, v);
            }
            *document = with_id;
            id
        }
    }
}

fn document_key(document: &Document) -> Document {
    doc! { "_id": document.get("_id").cloned().unwrap_or(Bson::Null) }
}

fn duplicate_key_error(ns: &Namespace, index: &str, id: &Bson) -> DriverError {
    server_error(
        11000,
        format!("E11000 duplicate key error collection: {} index: {} dup key: {{ _id: {} }}", ns, index, id),
    )
}

fn no_such_transaction(txn_number: i64) -> DriverError {
    server_error(251, format!("Transaction {} has been aborted.", txn_number))
        .with_labels(vec!["TransientTransactionError".to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("db", "coll")
    }

    #[test]
    fn duplicate_id_stops_ordered_insert() {
        let mut state = ServerState::default();
        let (inserted, error) = state.insert(
            &ns(),
            vec![doc! { "_id": 1 }, doc! { "_id": 1 }, doc! { "_id": 2 }],
            true,
        );
        assert_eq!(inserted.len(), 1);
        let error = error.unwrap();
        assert_eq!(error.code(), Some(11000));
        assert_eq!(error.code_name(), Some("DuplicateKey"));
        assert_eq!(state.documents(&ns()).len(), 1);
    }

    #[test]
    fn unordered_insert_continues_past_duplicates() {
        let mut state = ServerState::default();
        let (inserted, error) = state.insert(
            &ns(),
            vec![doc! { "_id": 1 }, doc! { "_id": 1 }, doc! { "_id": 2 }],
            false,
        );
        assert_eq!(inserted.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
        assert!(error.is_some());
    }

    #[test]
    fn generated_id_comes_first() {
        let mut state = ServerState::default();
        state.insert(&ns(), vec![doc! { "x": 1 }], true);
        let docs = state.documents(&ns());
        assert_eq!(docs[0].keys().next().map(String::as_str), Some("_id"));
    }

    #[test]
    fn update_with_upsert_inserts_seed() {
        let mut state = ServerState::default();
        let update = UpdateModification::Document(doc! { "$set": { "x": 1 } });
        let result = state.update(&ns(), &doc! { "_id": 7 }, &update, true, false).unwrap();
        assert_eq!(result.upserted_id, Some(Bson::Int32(7)));
        assert_eq!(state.documents(&ns()), vec![doc! { "_id": 7, "x": 1 }]);
    }

    #[test]
    fn create_existing_collection_fails() {
        let mut state = ServerState::default();
        state.create_collection(&ns(), Document::new()).unwrap();
        let error = state.create_collection(&ns(), Document::new()).unwrap_err();
        assert_eq!(error.code(), Some(48));
    }

    #[test]
    fn abort_restores_snapshot() {
        let mut state = ServerState::default();
        let lsid = Uuid::new_v4();
        state.insert(&ns(), vec![doc! { "_id": 1 }], true);
        state.begin_transaction(lsid, 1);
        state.insert(&ns(), vec![doc! { "_id": 2 }], true);
        state.abort_transaction(&lsid, 1).unwrap();
        assert_eq!(state.documents(&ns()), vec![doc! { "_id": 1 }]);
        assert_eq!(state.change_log.len(), 1);
    }

    #[test]
    fn fail_point_counts_down() {
        let mut state = ServerState::default();
        let command = doc! {
            "configureFailPoint": "failCommand",
            "mode": { "times": 1 },
            "data": { "failCommands": ["insert"], "errorCode": 91 },
        };
        state.configure_fail_point(&command, None).unwrap();
        let error = state.trigger_fail_point("insert", "localhost:27017", false).unwrap();
        assert_eq!(error.code_name(), Some("ShutdownInProgress"));
        assert!(state.trigger_fail_point("insert", "localhost:27017", false).is_none());
    }

    #[test]
    fn targeted_fail_point_only_fires_on_its_address() {
        let mut state = ServerState::default();
        let command = doc! {
            "configureFailPoint": "failCommand",
            "mode": "alwaysOn",
            "data": { "failCommands": ["find"], "closeConnection": true },
        };
        state.configure_fail_point(&command, Some("b:27017")).unwrap();
        assert!(state.trigger_fail_point("find", "a:27017", false).is_none());
        let error = state.trigger_fail_point("find", "b:27017", true).unwrap();
        assert!(error.is_network_error());
        assert!(error.has_label("TransientTransactionError"));
    }

    #[test]
    fn unknown_command_is_command_not_found() {
        let mut state = ServerState::default();
        let error = state
            .run_command(&DeploymentConfig::default(), "admin", &doc! { "frobnicate": 1 }, None)
            .unwrap_err();
        assert_eq!(error.code(), Some(59));
    }
}
