//! Driver capabilities consumed by the unified test runner
//!
//! The runner never talks to a database directly. It drives handles that
//! implement the traits in this crate, one per entity kind:
//!
//! | Trait | Entity | Obtained from |
//! |-------|--------|---------------|
//! | [`ClientHandle`] | client | [`Driver::create_client`] |
//! | [`DatabaseHandle`] | database | [`ClientHandle::database`] |
//! | [`CollectionHandle`] | collection | [`DatabaseHandle::collection`] |
//! | [`SessionHandle`] | session | [`ClientHandle::start_session`] |
//! | [`BucketHandle`] | bucket | [`DatabaseHandle::bucket`] |
//! | [`ChangeStreamHandle`] | saved change stream | `watch` on any of the above |
//!
//! Every fallible call returns a [`DriverError`] so expected-error
//! assertions can inspect origin, code, code name and labels.
//!
//! The [`memory`] module provides a complete in-process implementation used
//! by the runner's own test-suite.

#![warn(clippy::all)]

use std::any::Any;
use std::sync::Arc;

use bson::{Bson, Document};
use unified_core::{DriverError, ServerVersion, TopologyKind, TransactionState};

pub mod events;
pub mod memory;
pub mod model;
pub mod options;
pub mod results;

pub use events::CommandEvent;
pub use model::{UpdateModification, WriteModel};
pub use options::*;
pub use results::{BulkWriteResult, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};

/// Result of a driver call.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Entry point of a driver implementation.
pub trait Driver: Send + Sync {
    /// A privileged client used for seeding, outcome checks, fail points and
    /// session cleanup. It observes no events.
    fn internal_client(&self) -> Arc<dyn ClientHandle>;

    /// Create a client entity.
    fn create_client(&self, options: &ClientOptions) -> DriverResult<Arc<dyn ClientHandle>>;
}

/// A connected client.
pub trait ClientHandle: Send + Sync {
    /// Handle to a database.
    fn database(&self, name: &str, options: &DatabaseOptions) -> Arc<dyn DatabaseHandle>;

    /// Start a logical session.
    fn start_session(&self, options: &SessionOptions) -> DriverResult<Arc<dyn SessionHandle>>;

    /// Run a command, optionally against a specific server address.
    fn run_command(
        &self,
        database: &str,
        command: Document,
        address: Option<&str>,
    ) -> DriverResult<Document>;

    /// Kill every server-side session, optionally on a specific server.
    fn kill_all_sessions(&self, address: Option<&str>) -> DriverResult<()>;

    /// Version of the connected deployment.
    fn server_version(&self) -> DriverResult<ServerVersion>;

    /// Topology of the connected deployment.
    fn topology(&self) -> TopologyKind;

    /// Addresses of every server (mongos for sharded clusters).
    fn hosts(&self) -> Vec<String>;

    /// Whether the deployment requires authentication.
    fn auth_enabled(&self) -> bool {
        false
    }

    /// Whether the deployment is serverless.
    fn serverless(&self) -> bool {
        false
    }

    /// List database specifications.
    fn list_databases(
        &self,
        filter: Option<Document>,
        options: &ListDatabasesOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>>;

    /// Open a cluster-wide change stream.
    fn watch(
        &self,
        pipeline: Vec<Document>,
        options: &ChangeStreamOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Arc<dyn ChangeStreamHandle>>;

    /// Command events captured so far, in order.
    fn observed_events(&self) -> Vec<CommandEvent>;
}

/// A database handle.
pub trait DatabaseHandle: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Handle to a collection in this database.
    fn collection(&self, name: &str, options: &CollectionOptions) -> Arc<dyn CollectionHandle>;

    /// GridFS bucket handle.
    fn bucket(&self, options: &Document) -> Arc<dyn BucketHandle>;

    /// Create a collection.
    fn create_collection(
        &self,
        name: &str,
        options: &CreateCollectionOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<()>;

    /// Drop a collection. Dropping a missing collection succeeds.
    fn drop_collection(
        &self,
        name: &str,
        options: &DropCollectionOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<()>;

    /// List collection specifications.
    fn list_collections(
        &self,
        filter: Option<Document>,
        options: &ListCollectionsOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>>;

    /// List collection names.
    fn list_collection_names(
        &self,
        filter: Option<Document>,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<String>>;

    /// Run a command against this database.
    fn run_command(
        &self,
        command: Document,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Document>;

    /// Run a database-level aggregation.
    fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: &AggregateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>>;

    /// Open a database-wide change stream.
    fn watch(
        &self,
        pipeline: Vec<Document>,
        options: &ChangeStreamOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Arc<dyn ChangeStreamHandle>>;
}

/// A collection handle.
pub trait CollectionHandle: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Name of the owning database.
    fn database_name(&self) -> &str;

    fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: &AggregateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>>;

    fn bulk_write(
        &self,
        requests: Vec<WriteModel>,
        options: &BulkWriteOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<BulkWriteResult>;

    fn count_documents(
        &self,
        filter: Document,
        options: &CountOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<i64>;

    fn estimated_document_count(&self, options: &EstimatedDocumentCountOptions) -> DriverResult<i64>;

    fn distinct(
        &self,
        field_name: &str,
        filter: Option<Document>,
        options: &DistinctOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Bson>>;

    fn find(
        &self,
        filter: Option<Document>,
        options: &FindOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>>;

    fn find_one(
        &self,
        filter: Option<Document>,
        options: &FindOneOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>>;

    fn find_one_and_delete(
        &self,
        filter: Document,
        options: &FindOneAndDeleteOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>>;

    fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        options: &FindOneAndReplaceOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>>;

    fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateModification,
        options: &FindOneAndUpdateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Option<Document>>;

    fn insert_one(
        &self,
        document: Document,
        options: &InsertOneOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<InsertOneResult>;

    fn insert_many(
        &self,
        documents: Vec<Document>,
        options: &InsertManyOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<InsertManyResult>;

    fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: &ReplaceOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<UpdateResult>;

    fn update_one(
        &self,
        filter: Document,
        update: UpdateModification,
        options: &UpdateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<UpdateResult>;

    fn update_many(
        &self,
        filter: Document,
        update: UpdateModification,
        options: &UpdateOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<UpdateResult>;

    fn delete_one(
        &self,
        filter: Document,
        options: &DeleteOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<DeleteResult>;

    fn delete_many(
        &self,
        filter: Document,
        options: &DeleteOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<DeleteResult>;

    /// Create an index and return its name.
    fn create_index(
        &self,
        keys: Document,
        name: Option<&str>,
        options: &IndexOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<String>;

    fn list_indexes(&self, session: Option<&dyn SessionHandle>) -> DriverResult<Vec<Document>>;

    fn list_index_names(&self, session: Option<&dyn SessionHandle>) -> DriverResult<Vec<String>>;

    /// Rename this collection within its database.
    fn rename(
        &self,
        to: &str,
        options: &RenameCollectionOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<()>;

    fn watch(
        &self,
        pipeline: Vec<Document>,
        options: &ChangeStreamOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Arc<dyn ChangeStreamHandle>>;
}

/// A logical session.
pub trait SessionHandle: Send + Sync {
    /// The session id document (`{ id: <UUID> }`).
    fn lsid(&self) -> Document;

    /// The client that started this session.
    fn client(&self) -> Arc<dyn ClientHandle>;

    fn start_transaction(&self, options: &TransactionOptions) -> DriverResult<()>;

    fn commit_transaction(&self) -> DriverResult<()>;

    fn abort_transaction(&self) -> DriverResult<()>;

    /// End the session, aborting any open transaction. Idempotent.
    fn end(&self);

    fn transaction_state(&self) -> TransactionState;

    /// Address of the mongos this session is pinned to, if any.
    fn pinned_address(&self) -> Option<String>;

    /// Whether a network error was observed while the session was in use.
    fn is_dirty(&self) -> bool;

    /// Downcasting hook for implementations that need their concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// An open change stream.
pub trait ChangeStreamHandle: Send + Sync {
    /// Next change event, or an error if none is available.
    fn next_document(&self) -> DriverResult<Document>;
}

/// A GridFS bucket handle.
pub trait BucketHandle: Send + Sync {
    fn database_name(&self) -> &str;

    fn options(&self) -> &Document;
}
