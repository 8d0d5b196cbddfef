//! Typed operations.
//!
//! An [`Operation`] is the decoded form of one entry of a test's
//! `operations` list: the operation name plus its arguments, with every
//! argument key accounted for. Decoding lives in [`crate::registry`].
//!
//! # Operation Categories
//!
//! | Category | Target | Operations |
//! |----------|--------|-----------|
//! | CRUD | collection | find, findOne, insertOne, insertMany, update*, delete*, replaceOne, findOneAnd* |
//! | Aggregation | collection, database | aggregate, countDocuments, estimatedDocumentCount, distinct |
//! | Indexes | collection | createIndex, listIndexes, listIndexNames |
//! | Lifecycle | collection, database, client | createCollection, dropCollection, renameCollection, listCollections, listCollectionNames, listDatabases, runCommand |
//! | Sessions | session | startTransaction, commitTransaction, abortTransaction, endSession |
//! | Change streams | client, database, collection | createChangeStream, iterateUntilDocumentOrError |
//! | Test runner | testRunner | failPoint, targetedFailPoint, assert* |

pub mod arguments;
pub mod bulk;

use bson::Document;
use unified_core::TransactionState;
use unified_driver::*;

/// A decoded operation.
///
/// `session` fields hold the id of a session entity, resolved at execution
/// time.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    // ==================== CRUD ====================
    Find {
        filter: Option<Document>,
        session: Option<String>,
        options: FindOptions,
    },
    FindOne {
        filter: Option<Document>,
        session: Option<String>,
        options: FindOneOptions,
    },
    InsertOne {
        document: Document,
        session: Option<String>,
        options: InsertOneOptions,
    },
    InsertMany {
        documents: Vec<Document>,
        session: Option<String>,
        options: InsertManyOptions,
    },
    UpdateOne {
        filter: Document,
        update: UpdateModification,
        session: Option<String>,
        options: UpdateOptions,
    },
    UpdateMany {
        filter: Document,
        update: UpdateModification,
        session: Option<String>,
        options: UpdateOptions,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        session: Option<String>,
        options: ReplaceOptions,
    },
    DeleteOne {
        filter: Document,
        session: Option<String>,
        options: DeleteOptions,
    },
    DeleteMany {
        filter: Document,
        session: Option<String>,
        options: DeleteOptions,
    },
    FindOneAndDelete {
        filter: Document,
        session: Option<String>,
        options: FindOneAndDeleteOptions,
    },
    FindOneAndReplace {
        filter: Document,
        replacement: Document,
        session: Option<String>,
        options: FindOneAndReplaceOptions,
    },
    FindOneAndUpdate {
        filter: Document,
        update: UpdateModification,
        session: Option<String>,
        options: FindOneAndUpdateOptions,
    },
    BulkWrite {
        requests: Vec<WriteModel>,
        session: Option<String>,
        options: BulkWriteOptions,
    },

    // ==================== Aggregation ====================
    /// Runs against a collection or a database.
    Aggregate {
        pipeline: Vec<Document>,
        session: Option<String>,
        options: AggregateOptions,
    },
    CountDocuments {
        filter: Document,
        session: Option<String>,
        options: CountOptions,
    },
    EstimatedDocumentCount {
        options: EstimatedDocumentCountOptions,
    },
    Distinct {
        field_name: String,
        filter: Option<Document>,
        session: Option<String>,
        options: DistinctOptions,
    },

    // ==================== Indexes ====================
    CreateIndex {
        keys: Document,
        name: Option<String>,
        session: Option<String>,
        options: IndexOptions,
    },
    ListIndexes {
        session: Option<String>,
    },
    ListIndexNames {
        session: Option<String>,
    },

    // ==================== Collections and databases ====================
    CreateCollection {
        collection: String,
        session: Option<String>,
        options: CreateCollectionOptions,
    },
    DropCollection {
        collection: String,
        session: Option<String>,
        options: DropCollectionOptions,
    },
    RenameCollection {
        to: String,
        session: Option<String>,
        options: RenameCollectionOptions,
    },
    ListCollections {
        filter: Option<Document>,
        session: Option<String>,
        options: ListCollectionsOptions,
    },
    ListCollectionNames {
        filter: Option<Document>,
        session: Option<String>,
    },
    ListDatabases {
        filter: Option<Document>,
        session: Option<String>,
        options: ListDatabasesOptions,
    },
    RunCommand {
        command: Document,
        command_name: Option<String>,
        read_concern: Option<Document>,
        read_preference: Option<Document>,
        write_concern: Option<Document>,
        session: Option<String>,
    },

    // ==================== Sessions ====================
    StartTransaction {
        options: TransactionOptions,
    },
    CommitTransaction,
    AbortTransaction,
    EndSession,

    // ==================== Change streams ====================
    /// Runs against a client, database or collection.
    CreateChangeStream {
        pipeline: Vec<Document>,
        session: Option<String>,
        options: ChangeStreamOptions,
    },
    IterateUntilDocumentOrError,

    // ==================== Test runner ====================
    FailPoint {
        fail_point: Document,
        client: String,
    },
    TargetedFailPoint {
        fail_point: Document,
        session: String,
    },
    AssertSessionTransactionState {
        session: String,
        state: TransactionState,
    },
    AssertSessionPinned {
        session: String,
    },
    AssertSessionUnpinned {
        session: String,
    },
    AssertSessionDirty {
        session: String,
    },
    AssertSessionNotDirty {
        session: String,
    },
    AssertSameLsidOnLastTwoCommands {
        client: String,
    },
    AssertDifferentLsidOnLastTwoCommands {
        client: String,
    },
    AssertCollectionExists {
        database_name: String,
        collection_name: String,
    },
    AssertCollectionNotExists {
        database_name: String,
        collection_name: String,
    },
    AssertIndexExists {
        database_name: String,
        collection_name: String,
        index_name: String,
    },
    AssertIndexNotExists {
        database_name: String,
        collection_name: String,
        index_name: String,
    },
}

impl Operation {
    /// The operation name as written in test files.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Find { .. } => "find",
            Operation::FindOne { .. } => "findOne",
            Operation::InsertOne { .. } => "insertOne",
            Operation::InsertMany { .. } => "insertMany",
            Operation::UpdateOne { .. } => "updateOne",
            Operation::UpdateMany { .. } => "updateMany",
            Operation::ReplaceOne { .. } => "replaceOne",
            Operation::DeleteOne { .. } => "deleteOne",
            Operation::DeleteMany { .. } => "deleteMany",
            Operation::FindOneAndDelete { .. } => "findOneAndDelete",
            Operation::FindOneAndReplace { .. } => "findOneAndReplace",
            Operation::FindOneAndUpdate { .. } => "findOneAndUpdate",
            Operation::BulkWrite { .. } => "bulkWrite",
            Operation::Aggregate { .. } => "aggregate",
            Operation::CountDocuments { .. } => "countDocuments",
            Operation::EstimatedDocumentCount { .. } => "estimatedDocumentCount",
            Operation::Distinct { .. } => "distinct",
            Operation::CreateIndex { .. } => "createIndex",
            Operation::ListIndexes { .. } => "listIndexes",
            Operation::ListIndexNames { .. } => "listIndexNames",
            Operation::CreateCollection { .. } => "createCollection",
            Operation::DropCollection { .. } => "dropCollection",
            Operation::RenameCollection { .. } => "renameCollection",
            Operation::ListCollections { .. } => "listCollections",
            Operation::ListCollectionNames { .. } => "listCollectionNames",
            Operation::ListDatabases { .. } => "listDatabases",
            Operation::RunCommand { .. } => "runCommand",
            Operation::StartTransaction { .. } => "startTransaction",
            Operation::CommitTransaction => "commitTransaction",
            Operation::AbortTransaction => "abortTransaction",
            Operation::EndSession => "endSession",
            Operation::CreateChangeStream { .. } => "createChangeStream",
            Operation::IterateUntilDocumentOrError => "iterateUntilDocumentOrError",
            Operation::FailPoint { .. } => "failPoint",
            Operation::TargetedFailPoint { .. } => "targetedFailPoint",
            Operation::AssertSessionTransactionState { .. } => "assertSessionTransactionState",
            Operation::AssertSessionPinned { .. } => "assertSessionPinned",
            Operation::AssertSessionUnpinned { .. } => "assertSessionUnpinned",
            Operation::AssertSessionDirty { .. } => "assertSessionDirty",
            Operation::AssertSessionNotDirty { .. } => "assertSessionNotDirty",
            Operation::AssertSameLsidOnLastTwoCommands { .. } => "assertSameLsidOnLastTwoCommands",
            Operation::AssertDifferentLsidOnLastTwoCommands { .. } => {
                "assertDifferentLsidOnLastTwoCommands"
            }
            Operation::AssertCollectionExists { .. } => "assertCollectionExists",
            Operation::AssertCollectionNotExists { .. } => "assertCollectionNotExists",
            Operation::AssertIndexExists { .. } => "assertIndexExists",
            Operation::AssertIndexNotExists { .. } => "assertIndexNotExists",
        }
    }

    /// Whether the operation runs against the `testRunner` object.
    pub fn is_test_runner_operation(&self) -> bool {
        matches!(
            self,
            Operation::FailPoint { .. }
                | Operation::TargetedFailPoint { .. }
                | Operation::AssertSessionTransactionState { .. }
                | Operation::AssertSessionPinned { .. }
                | Operation::AssertSessionUnpinned { .. }
                | Operation::AssertSessionDirty { .. }
                | Operation::AssertSessionNotDirty { .. }
                | Operation::AssertSameLsidOnLastTwoCommands { .. }
                | Operation::AssertDifferentLsidOnLastTwoCommands { .. }
                | Operation::AssertCollectionExists { .. }
                | Operation::AssertCollectionNotExists { .. }
                | Operation::AssertIndexExists { .. }
                | Operation::AssertIndexNotExists { .. }
        )
    }
}
