//! Option structures accepted by driver operations.
//!
//! Every options type declares its field names statically through
//! [`KnownFields`]. The operation decoder unions these names with an
//! operation's explicit argument keys to reject arguments it does not
//! recognise. The [`options!`] macro keeps the struct fields and the name
//! list in one place so they cannot drift apart.

use bson::{Bson, Document};
use serde::Deserialize;

/// Statically declared wire names of an options type's fields.
pub trait KnownFields {
    /// Field names as they appear in test files.
    const FIELDS: &'static [&'static str];
}

/// Declare an options struct whose fields are all optional and whose wire
/// names are recorded in its [`KnownFields`] impl.
macro_rules! options {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident: $ty:ty => $key:literal,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                #[serde(rename = $key, default)]
                pub $field: Option<$ty>,
            )*
        }

        impl KnownFields for $name {
            const FIELDS: &'static [&'static str] = &[$($key),*];
        }
    };
}

/// Which version of a document `findOneAnd*` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ReturnDocument {
    Before,
    After,
}

// =============================================================================
// Collection read options
// =============================================================================

options! {
    /// Options for `aggregate`.
    pub struct AggregateOptions {
        allow_disk_use: bool => "allowDiskUse",
        batch_size: i64 => "batchSize",
        bypass_document_validation: bool => "bypassDocumentValidation",
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
        max_time_ms: i64 => "maxTimeMS",
        max_await_time_ms: i64 => "maxAwaitTimeMS",
        read_concern: Document => "readConcern",
        write_concern: Document => "writeConcern",
    }
}

options! {
    /// Options for `countDocuments`.
    pub struct CountOptions {
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        limit: i64 => "limit",
        max_time_ms: i64 => "maxTimeMS",
        skip: i64 => "skip",
    }
}

options! {
    /// Options for `estimatedDocumentCount`.
    pub struct EstimatedDocumentCountOptions {
        comment: Bson => "comment",
        max_time_ms: i64 => "maxTimeMS",
    }
}

options! {
    /// Options for `distinct`.
    pub struct DistinctOptions {
        collation: Document => "collation",
        comment: Bson => "comment",
        max_time_ms: i64 => "maxTimeMS",
    }
}

options! {
    /// Options for `find`.
    pub struct FindOptions {
        allow_disk_use: bool => "allowDiskUse",
        allow_partial_results: bool => "allowPartialResults",
        batch_size: i64 => "batchSize",
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
        limit: i64 => "limit",
        max: Document => "max",
        max_time_ms: i64 => "maxTimeMS",
        min: Document => "min",
        no_cursor_timeout: bool => "noCursorTimeout",
        projection: Document => "projection",
        return_key: bool => "returnKey",
        show_record_id: bool => "showRecordId",
        skip: i64 => "skip",
        sort: Document => "sort",
    }
}

options! {
    /// Options for `findOne`.
    pub struct FindOneOptions {
        allow_partial_results: bool => "allowPartialResults",
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
        max: Document => "max",
        max_time_ms: i64 => "maxTimeMS",
        min: Document => "min",
        projection: Document => "projection",
        return_key: bool => "returnKey",
        show_record_id: bool => "showRecordId",
        skip: i64 => "skip",
        sort: Document => "sort",
    }
}

impl From<FindOneOptions> for FindOptions {
    fn from(o: FindOneOptions) -> Self {
        FindOptions {
            allow_partial_results: o.allow_partial_results,
            collation: o.collation,
            comment: o.comment,
            hint: o.hint,
            let_vars: o.let_vars,
            limit: Some(1),
            max: o.max,
            max_time_ms: o.max_time_ms,
            min: o.min,
            projection: o.projection,
            return_key: o.return_key,
            show_record_id: o.show_record_id,
            skip: o.skip,
            sort: o.sort,
            ..Default::default()
        }
    }
}

// =============================================================================
// Collection write options
// =============================================================================

options! {
    /// Options for `insertOne`.
    pub struct InsertOneOptions {
        bypass_document_validation: bool => "bypassDocumentValidation",
        comment: Bson => "comment",
    }
}

options! {
    /// Options for `insertMany`.
    pub struct InsertManyOptions {
        bypass_document_validation: bool => "bypassDocumentValidation",
        comment: Bson => "comment",
        ordered: bool => "ordered",
        write_concern: Document => "writeConcern",
    }
}

options! {
    /// Options for `updateOne` and `updateMany`.
    pub struct UpdateOptions {
        array_filters: Vec<Document> => "arrayFilters",
        bypass_document_validation: bool => "bypassDocumentValidation",
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
        upsert: bool => "upsert",
    }
}

options! {
    /// Options for `replaceOne`.
    pub struct ReplaceOptions {
        bypass_document_validation: bool => "bypassDocumentValidation",
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
        upsert: bool => "upsert",
    }
}

options! {
    /// Options for `deleteOne` and `deleteMany`.
    pub struct DeleteOptions {
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
    }
}

options! {
    /// Options for `findOneAndDelete`.
    pub struct FindOneAndDeleteOptions {
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
        max_time_ms: i64 => "maxTimeMS",
        projection: Document => "projection",
        sort: Document => "sort",
    }
}

options! {
    /// Options for `findOneAndReplace`.
    pub struct FindOneAndReplaceOptions {
        bypass_document_validation: bool => "bypassDocumentValidation",
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
        max_time_ms: i64 => "maxTimeMS",
        projection: Document => "projection",
        return_document: ReturnDocument => "returnDocument",
        sort: Document => "sort",
        upsert: bool => "upsert",
    }
}

options! {
    /// Options for `findOneAndUpdate`.
    pub struct FindOneAndUpdateOptions {
        array_filters: Vec<Document> => "arrayFilters",
        bypass_document_validation: bool => "bypassDocumentValidation",
        collation: Document => "collation",
        comment: Bson => "comment",
        hint: Bson => "hint",
        let_vars: Document => "let",
        max_time_ms: i64 => "maxTimeMS",
        projection: Document => "projection",
        return_document: ReturnDocument => "returnDocument",
        sort: Document => "sort",
        upsert: bool => "upsert",
    }
}

options! {
    /// Options for `bulkWrite`.
    pub struct BulkWriteOptions {
        bypass_document_validation: bool => "bypassDocumentValidation",
        comment: Bson => "comment",
        let_vars: Document => "let",
        ordered: bool => "ordered",
    }
}

// Write model options (bulk write requests)

options! {
    /// Options of a delete write model.
    pub struct DeleteModelOptions {
        collation: Document => "collation",
        hint: Bson => "hint",
    }
}

options! {
    /// Options of a replace write model.
    pub struct ReplaceModelOptions {
        collation: Document => "collation",
        hint: Bson => "hint",
        upsert: bool => "upsert",
    }
}

options! {
    /// Options of an update write model.
    pub struct UpdateModelOptions {
        array_filters: Vec<Document> => "arrayFilters",
        collation: Document => "collation",
        hint: Bson => "hint",
        upsert: bool => "upsert",
    }
}

// =============================================================================
// Index, collection and database administration
// =============================================================================

options! {
    /// Options for `createIndex` besides the index name.
    pub struct IndexOptions {
        expire_after_seconds: i64 => "expireAfterSeconds",
        sparse: bool => "sparse",
        unique: bool => "unique",
    }
}

options! {
    /// Options for `createCollection`.
    pub struct CreateCollectionOptions {
        capped: bool => "capped",
        change_stream_pre_and_post_images: Document => "changeStreamPreAndPostImages",
        clustered_index: Document => "clusteredIndex",
        expire_after_seconds: i64 => "expireAfterSeconds",
        max: i64 => "max",
        size: i64 => "size",
        timeseries: Document => "timeseries",
        validation_action: String => "validationAction",
        validation_level: String => "validationLevel",
        validator: Document => "validator",
        write_concern: Document => "writeConcern",
    }
}

options! {
    /// Options for dropping a collection.
    pub struct DropCollectionOptions {
        write_concern: Document => "writeConcern",
    }
}

options! {
    /// Options for `renameCollection`.
    pub struct RenameCollectionOptions {
        comment: Bson => "comment",
        drop_target: bool => "dropTarget",
    }
}

options! {
    /// Options for `listCollections` and `listCollectionNames`.
    pub struct ListCollectionsOptions {
        batch_size: i64 => "batchSize",
        comment: Bson => "comment",
    }
}

options! {
    /// Options for `listDatabases`.
    pub struct ListDatabasesOptions {
        authorized_databases: bool => "authorizedDatabases",
        comment: Bson => "comment",
        name_only: bool => "nameOnly",
    }
}

options! {
    /// Options for `createChangeStream`.
    pub struct ChangeStreamOptions {
        batch_size: i64 => "batchSize",
        collation: Document => "collation",
        comment: Bson => "comment",
        full_document: String => "fullDocument",
        full_document_before_change: String => "fullDocumentBeforeChange",
        max_await_time_ms: i64 => "maxAwaitTimeMS",
        resume_after: Document => "resumeAfter",
        show_expanded_events: bool => "showExpandedEvents",
        start_after: Document => "startAfter",
        start_at_operation_time: Bson => "startAtOperationTime",
    }
}

// =============================================================================
// Entity options
// =============================================================================

options! {
    /// Options for a transaction.
    pub struct TransactionOptions {
        max_commit_time_ms: i64 => "maxCommitTimeMS",
        read_concern: Document => "readConcern",
        read_preference: Document => "readPreference",
        write_concern: Document => "writeConcern",
    }
}

options! {
    /// Options for a session entity.
    pub struct SessionOptions {
        causal_consistency: bool => "causalConsistency",
        default_transaction_options: TransactionOptions => "defaultTransactionOptions",
        snapshot: bool => "snapshot",
    }
}

options! {
    /// Options for a database entity.
    pub struct DatabaseOptions {
        read_concern: Document => "readConcern",
        read_preference: Document => "readPreference",
        write_concern: Document => "writeConcern",
    }
}

options! {
    /// Options for a collection entity.
    pub struct CollectionOptions {
        read_concern: Document => "readConcern",
        read_preference: Document => "readPreference",
        write_concern: Document => "writeConcern",
    }
}

/// Options for creating a client entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOptions {
    /// Extra URI options applied to the suite's connection string
    pub uri_options: Document,
    /// Connect to every mongos (`Some(true)`), exactly one (`Some(false)`),
    /// or leave the connection string alone
    pub use_multiple_mongoses: Option<bool>,
    /// Event type names to capture, e.g. `commandStartedEvent`
    pub observe_events: Vec<String>,
    /// Command names whose events are never captured
    pub ignore_command_monitoring_events: Vec<String>,
    /// Capture events for security-sensitive commands too
    pub observe_sensitive_commands: bool,
    /// Declared server API version
    pub server_api: Option<Document>,
}
