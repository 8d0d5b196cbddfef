//! The operation registry.
//!
//! Maps every operation name to its decoder and to the full set of argument
//! keys it recognises: the keys the decoder reads explicitly, unioned with
//! the field names of the operation's options structure. The registry is
//! built once and never mutated.

use std::collections::HashMap;

use bson::Document;
use once_cell::sync::Lazy;
use unified_core::{Error, Result};
use unified_driver::*;

use crate::operation::arguments::Arguments;
use crate::operation::bulk;
use crate::operation::Operation;

/// Decoder of one operation's arguments.
pub type Decoder = fn(&Arguments<'_>) -> Result<Operation>;

/// Options type of operations that take no options.
pub struct NoOptions;

impl KnownFields for NoOptions {
    const FIELDS: &'static [&'static str] = &[];
}

/// Registry entry for one operation name.
#[derive(Clone, Copy)]
pub struct OperationEntry {
    pub name: &'static str,
    /// Keys read explicitly by the decoder
    pub keys: &'static [&'static str],
    /// Field names of the options structure
    pub option_fields: &'static [&'static str],
    pub decode: Decoder,
}

impl OperationEntry {
    fn new<O: KnownFields>(name: &'static str, keys: &'static [&'static str], decode: Decoder) -> Self {
        Self {
            name,
            keys,
            option_fields: O::FIELDS,
            decode,
        }
    }

    /// Whether `key` is a recognised argument.
    pub fn is_known(&self, key: &str) -> bool {
        self.keys.contains(&key) || self.option_fields.contains(&key)
    }

    /// Every recognised argument key.
    pub fn known_keys(&self) -> impl Iterator<Item = &'static str> {
        self.keys.iter().chain(self.option_fields.iter()).copied()
    }
}

impl std::fmt::Debug for OperationEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationEntry")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("option_fields", &self.option_fields)
            .finish()
    }
}

fn decode_requests(args: &Arguments<'_>) -> Result<Vec<WriteModel>> {
    let requests: Vec<Document> = args.required("requests")?;
    requests.iter().map(bulk::decode_request).collect()
}

static REGISTRY: Lazy<HashMap<&'static str, OperationEntry>> = Lazy::new(|| {
    let entries = vec![
        // ==================== CRUD ====================
        OperationEntry::new::<FindOptions>("find", &["filter", "session"], |a| {
            Ok(Operation::Find {
                filter: a.optional("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<FindOneOptions>("findOne", &["filter", "session"], |a| {
            Ok(Operation::FindOne {
                filter: a.optional("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<InsertOneOptions>("insertOne", &["document", "session"], |a| {
            Ok(Operation::InsertOne {
                document: a.required("document")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<InsertManyOptions>("insertMany", &["documents", "session"], |a| {
            Ok(Operation::InsertMany {
                documents: a.required("documents")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<UpdateOptions>("updateOne", &["filter", "update", "session"], |a| {
            Ok(Operation::UpdateOne {
                filter: a.required("filter")?,
                update: a.required("update")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<UpdateOptions>("updateMany", &["filter", "update", "session"], |a| {
            Ok(Operation::UpdateMany {
                filter: a.required("filter")?,
                update: a.required("update")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<ReplaceOptions>(
            "replaceOne",
            &["filter", "replacement", "session"],
            |a| {
                Ok(Operation::ReplaceOne {
                    filter: a.required("filter")?,
                    replacement: a.required("replacement")?,
                    session: a.session()?,
                    options: a.options()?,
                })
            },
        ),
        OperationEntry::new::<DeleteOptions>("deleteOne", &["filter", "session"], |a| {
            Ok(Operation::DeleteOne {
                filter: a.required("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<DeleteOptions>("deleteMany", &["filter", "session"], |a| {
            Ok(Operation::DeleteMany {
                filter: a.required("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<FindOneAndDeleteOptions>("findOneAndDelete", &["filter", "session"], |a| {
            Ok(Operation::FindOneAndDelete {
                filter: a.required("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<FindOneAndReplaceOptions>(
            "findOneAndReplace",
            &["filter", "replacement", "session"],
            |a| {
                Ok(Operation::FindOneAndReplace {
                    filter: a.required("filter")?,
                    replacement: a.required("replacement")?,
                    session: a.session()?,
                    options: a.options()?,
                })
            },
        ),
        OperationEntry::new::<FindOneAndUpdateOptions>(
            "findOneAndUpdate",
            &["filter", "update", "session"],
            |a| {
                Ok(Operation::FindOneAndUpdate {
                    filter: a.required("filter")?,
                    update: a.required("update")?,
                    session: a.session()?,
                    options: a.options()?,
                })
            },
        ),
        OperationEntry::new::<BulkWriteOptions>("bulkWrite", &["requests", "session"], |a| {
            Ok(Operation::BulkWrite {
                requests: decode_requests(a)?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        // ==================== Aggregation ====================
        OperationEntry::new::<AggregateOptions>("aggregate", &["pipeline", "session"], |a| {
            Ok(Operation::Aggregate {
                pipeline: a.required("pipeline")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<CountOptions>("countDocuments", &["filter", "session"], |a| {
            Ok(Operation::CountDocuments {
                filter: a.required("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<EstimatedDocumentCountOptions>("estimatedDocumentCount", &[], |a| {
            Ok(Operation::EstimatedDocumentCount {
                options: a.options()?,
            })
        }),
        OperationEntry::new::<DistinctOptions>("distinct", &["fieldName", "filter", "session"], |a| {
            Ok(Operation::Distinct {
                field_name: a.required("fieldName")?,
                filter: a.optional("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        // ==================== Indexes ====================
        OperationEntry::new::<IndexOptions>("createIndex", &["keys", "name", "session"], |a| {
            Ok(Operation::CreateIndex {
                keys: a.required("keys")?,
                name: a.optional("name")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<NoOptions>("listIndexes", &["session"], |a| {
            Ok(Operation::ListIndexes {
                session: a.session()?,
            })
        }),
        OperationEntry::new::<NoOptions>("listIndexNames", &["session"], |a| {
            Ok(Operation::ListIndexNames {
                session: a.session()?,
            })
        }),
        // ==================== Collections and databases ====================
        OperationEntry::new::<CreateCollectionOptions>("createCollection", &["collection", "session"], |a| {
            Ok(Operation::CreateCollection {
                collection: a.required("collection")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<DropCollectionOptions>("dropCollection", &["collection", "session"], |a| {
            Ok(Operation::DropCollection {
                collection: a.required("collection")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<RenameCollectionOptions>("renameCollection", &["to", "session"], |a| {
            Ok(Operation::RenameCollection {
                to: a.required("to")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<ListCollectionsOptions>("listCollections", &["filter", "session"], |a| {
            Ok(Operation::ListCollections {
                filter: a.optional("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<NoOptions>("listCollectionNames", &["filter", "session"], |a| {
            Ok(Operation::ListCollectionNames {
                filter: a.optional("filter")?,
                session: a.session()?,
            })
        }),
        OperationEntry::new::<ListDatabasesOptions>("listDatabases", &["filter", "session"], |a| {
            Ok(Operation::ListDatabases {
                filter: a.optional("filter")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<NoOptions>(
            "runCommand",
            &[
                "command",
                "commandName",
                "readConcern",
                "readPreference",
                "writeConcern",
                "session",
            ],
            |a| {
                Ok(Operation::RunCommand {
                    command: a.required("command")?,
                    command_name: a.optional("commandName")?,
                    read_concern: a.optional("readConcern")?,
                    read_preference: a.optional("readPreference")?,
                    write_concern: a.optional("writeConcern")?,
                    session: a.session()?,
                })
            },
        ),
        // ==================== Sessions ====================
        OperationEntry::new::<TransactionOptions>("startTransaction", &[], |a| {
            Ok(Operation::StartTransaction {
                options: a.options()?,
            })
        }),
        OperationEntry::new::<NoOptions>("commitTransaction", &[], |_| Ok(Operation::CommitTransaction)),
        OperationEntry::new::<NoOptions>("abortTransaction", &[], |_| Ok(Operation::AbortTransaction)),
        OperationEntry::new::<NoOptions>("endSession", &[], |_| Ok(Operation::EndSession)),
        // ==================== Change streams ====================
        OperationEntry::new::<ChangeStreamOptions>("createChangeStream", &["pipeline", "session"], |a| {
            Ok(Operation::CreateChangeStream {
                pipeline: a.required("pipeline")?,
                session: a.session()?,
                options: a.options()?,
            })
        }),
        OperationEntry::new::<NoOptions>("iterateUntilDocumentOrError", &[], |_| {
            Ok(Operation::IterateUntilDocumentOrError)
        }),
        // ==================== Test runner ====================
        OperationEntry::new::<NoOptions>("failPoint", &["failPoint", "client"], |a| {
            Ok(Operation::FailPoint {
                fail_point: a.required("failPoint")?,
                client: a.required("client")?,
            })
        }),
        OperationEntry::new::<NoOptions>("targetedFailPoint", &["failPoint", "session"], |a| {
            Ok(Operation::TargetedFailPoint {
                fail_point: a.required("failPoint")?,
                session: a.required("session")?,
            })
        }),
        OperationEntry::new::<NoOptions>("assertSessionTransactionState", &["session", "state"], |a| {
            Ok(Operation::AssertSessionTransactionState {
                session: a.required("session")?,
                state: a.required("state")?,
            })
        }),
        OperationEntry::new::<NoOptions>("assertSessionPinned", &["session"], |a| {
            Ok(Operation::AssertSessionPinned {
                session: a.required("session")?,
            })
        }),
        OperationEntry::new::<NoOptions>("assertSessionUnpinned", &["session"], |a| {
            Ok(Operation::AssertSessionUnpinned {
                session: a.required("session")?,
            })
        }),
        OperationEntry::new::<NoOptions>("assertSessionDirty", &["session"], |a| {
            Ok(Operation::AssertSessionDirty {
                session: a.required("session")?,
            })
        }),
        OperationEntry::new::<NoOptions>("assertSessionNotDirty", &["session"], |a| {
            Ok(Operation::AssertSessionNotDirty {
                session: a.required("session")?,
            })
        }),
        OperationEntry::new::<NoOptions>("assertSameLsidOnLastTwoCommands", &["client"], |a| {
            Ok(Operation::AssertSameLsidOnLastTwoCommands {
                client: a.required("client")?,
            })
        }),
        OperationEntry::new::<NoOptions>("assertDifferentLsidOnLastTwoCommands", &["client"], |a| {
            Ok(Operation::AssertDifferentLsidOnLastTwoCommands {
                client: a.required("client")?,
            })
        }),
        OperationEntry::new::<NoOptions>(
            "assertCollectionExists",
            &["databaseName", "collectionName"],
            |a| {
                Ok(Operation::AssertCollectionExists {
                    database_name: a.required("databaseName")?,
                    collection_name: a.required("collectionName")?,
                })
            },
        ),
        OperationEntry::new::<NoOptions>(
            "assertCollectionNotExists",
            &["databaseName", "collectionName"],
            |a| {
                Ok(Operation::AssertCollectionNotExists {
                    database_name: a.required("databaseName")?,
                    collection_name: a.required("collectionName")?,
                })
            },
        ),
        OperationEntry::new::<NoOptions>(
            "assertIndexExists",
            &["databaseName", "collectionName", "indexName"],
            |a| {
                Ok(Operation::AssertIndexExists {
                    database_name: a.required("databaseName")?,
                    collection_name: a.required("collectionName")?,
                    index_name: a.required("indexName")?,
                })
            },
        ),
        OperationEntry::new::<NoOptions>(
            "assertIndexNotExists",
            &["databaseName", "collectionName", "indexName"],
            |a| {
                Ok(Operation::AssertIndexNotExists {
                    database_name: a.required("databaseName")?,
                    collection_name: a.required("collectionName")?,
                    index_name: a.required("indexName")?,
                })
            },
        ),
    ];
    entries.into_iter().map(|entry| (entry.name, entry)).collect()
});

/// Look up an operation by name.
pub fn resolve(name: &str) -> Result<&'static OperationEntry> {
    REGISTRY.get(name).ok_or_else(|| Error::UnknownOperation {
        name: name.to_string(),
    })
}

/// Names of every registered operation, sorted.
pub fn operation_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Decode an operation from its name and raw arguments.
///
/// Typed fields are decoded first; then every key of `arguments` must be
/// recognised by the operation.
pub fn decode(name: &str, arguments: Option<&Document>) -> Result<Operation> {
    let entry = resolve(name)?;
    let empty = Document::new();
    let raw = arguments.unwrap_or(&empty);
    let operation = (entry.decode)(&Arguments::new(entry.name, raw))?;
    if let Some(key) = raw.keys().find(|key| !entry.is_known(key)) {
        return Err(Error::UnrecognizedArgument {
            operation: entry.name.to_string(),
            key: key.clone(),
        });
    }
    Ok(operation)
}
