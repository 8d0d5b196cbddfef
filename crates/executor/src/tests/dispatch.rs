//! Tests for running operations and checking their expectations against
//! the in-memory driver.

use std::sync::Arc;

use bson::{doc, Document};
use unified_driver::memory::MemoryDriver;
use unified_driver::Driver;

use crate::{EntityDescription, EntityMap, Error, ExecutionContext, Executor, RawOperation, UnifiedOperation};

struct Harness {
    driver: Arc<MemoryDriver>,
    executor: Executor,
    ctx: ExecutionContext,
}

impl Harness {
    fn new() -> Self {
        let driver = Arc::new(MemoryDriver::default());
        let specs: Vec<EntityDescription> = vec![
            doc! { "client": { "id": "client0", "observeEvents": ["commandStartedEvent"] } },
            doc! { "database": { "id": "database0", "client": "client0", "databaseName": "db" } },
            doc! { "collection": { "id": "collection0", "database": "database0", "collectionName": "coll" } },
            doc! { "session": { "id": "session0", "client": "client0" } },
        ]
        .into_iter()
        .map(|d| bson::from_document(d).unwrap())
        .collect();
        let entities = EntityMap::build(driver.as_ref(), &specs).unwrap();
        Self {
            executor: Executor::new(driver.internal_client()),
            ctx: ExecutionContext::new(entities),
            driver,
        }
    }

    fn run(&mut self, operation: Document) -> crate::Result<()> {
        let raw: RawOperation = bson::from_document(operation).unwrap();
        let op = UnifiedOperation::decode(&raw)?;
        self.executor.execute(&mut self.ctx, &op)
    }
}

#[test]
fn test_insert_then_find() {
    let mut h = Harness::new();
    h.run(doc! {
        "name": "insertOne",
        "object": "collection0",
        "arguments": { "document": { "_id": 1, "x": 11 } },
        "expectResult": { "insertedId": { "$$unsetOrMatches": 1 } },
    })
    .unwrap();
    h.run(doc! {
        "name": "find",
        "object": "collection0",
        "arguments": { "filter": {} },
        "expectResult": [{ "_id": 1, "x": 11 }],
    })
    .unwrap();
    assert_eq!(h.driver.documents("db", "coll"), vec![doc! { "_id": 1, "x": 11 }]);
}

#[test]
fn test_expected_error_on_success_fails() {
    let mut h = Harness::new();
    let err = h
        .run(doc! {
            "name": "insertOne",
            "object": "collection0",
            "arguments": { "document": { "_id": 1 } },
            "expectError": { "errorCode": 11000 },
        })
        .unwrap_err();
    assert!(err.is_test_failure());
    assert!(err.to_string().contains("expected error, got success"));
}

#[test]
fn test_expected_error_matches() {
    let mut h = Harness::new();
    let insert = doc! {
        "name": "insertOne",
        "object": "collection0",
        "arguments": { "document": { "_id": 1 } },
    };
    h.run(insert.clone()).unwrap();

    let mut duplicate = insert.clone();
    duplicate.insert(
        "expectError",
        doc! { "errorCode": 11000, "errorCodeName": "duplicatekey", "isClientError": false },
    );
    h.run(duplicate).unwrap();

    let mut wrong_code = insert;
    wrong_code.insert("expectError", doc! { "errorCode": 91 });
    assert!(matches!(h.run(wrong_code), Err(Error::ErrorMismatch { .. })));
}

#[test]
fn test_unexpected_error_fails_the_test() {
    let mut h = Harness::new();
    let insert = doc! {
        "name": "insertOne",
        "object": "collection0",
        "arguments": { "document": { "_id": 1 } },
    };
    h.run(insert.clone()).unwrap();
    assert!(matches!(h.run(insert.clone()), Err(Error::UnexpectedError { .. })));

    let mut ignored = insert;
    ignored.insert("ignoreResultAndError", true);
    h.run(ignored).unwrap();
}

#[test]
fn test_result_mismatch_reports_path() {
    let mut h = Harness::new();
    let err = h
        .run(doc! {
            "name": "countDocuments",
            "object": "collection0",
            "arguments": { "filter": {} },
            "expectResult": 3,
        })
        .unwrap_err();
    assert!(matches!(err, Error::ResultMismatch { ref path, .. } if path == "$"));
}

#[test]
fn test_unsupported_target() {
    let mut h = Harness::new();
    let err = h
        .run(doc! { "name": "listDatabases", "object": "collection0" })
        .unwrap_err();
    assert_eq!(
        err,
        Error::UnsupportedTarget {
            operation: "listDatabases".into(),
            target: "collection".into()
        }
    );

    let err = h.run(doc! { "name": "endSession", "object": "testRunner" }).unwrap_err();
    assert!(matches!(err, Error::UnsupportedTarget { ref target, .. } if target == "testRunner"));
}

#[test]
fn test_save_result_as_entity() {
    let mut h = Harness::new();
    h.run(doc! {
        "name": "insertOne",
        "object": "collection0",
        "arguments": { "document": { "_id": 1, "x": 1 } },
    })
    .unwrap();
    h.run(doc! {
        "name": "findOne",
        "object": "collection0",
        "arguments": { "filter": { "_id": 1 } },
        "saveResultAsEntity": "found",
    })
    .unwrap();
    h.run(doc! {
        "name": "find",
        "object": "collection0",
        "arguments": { "filter": {} },
        "expectResult": [{ "$$matchesEntity": "found" }],
    })
    .unwrap();

    let err = h
        .run(doc! {
            "name": "dropCollection",
            "object": "database0",
            "arguments": { "collection": "coll" },
            "saveResultAsEntity": "nothing",
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidEntityResult { .. }));
}

#[test]
fn test_fail_point_is_disabled_at_teardown() {
    let mut h = Harness::new();
    h.run(doc! {
        "name": "failPoint",
        "object": "testRunner",
        "arguments": {
            "client": "client0",
            "failPoint": {
                "configureFailPoint": "failCommand",
                "mode": "alwaysOn",
                "data": { "failCommands": ["insert"], "errorCode": 91 },
            },
        },
    })
    .unwrap();
    assert_eq!(h.driver.active_fail_points(), 1);
    h.run(doc! {
        "name": "insertOne",
        "object": "collection0",
        "arguments": { "document": { "_id": 1 } },
        "expectError": { "errorCode": 91 },
    })
    .unwrap();

    h.ctx.teardown();
    assert_eq!(h.ctx.armed_fail_points(), 0);
    assert_eq!(h.driver.active_fail_points(), 0);
}

#[test]
fn test_session_assertions() {
    let mut h = Harness::new();
    h.run(doc! { "name": "startTransaction", "object": "session0" }).unwrap();
    h.run(doc! {
        "name": "assertSessionTransactionState",
        "object": "testRunner",
        "arguments": { "session": "session0", "state": "starting" },
    })
    .unwrap();
    let err = h
        .run(doc! {
            "name": "assertSessionPinned",
            "object": "testRunner",
            "arguments": { "session": "session0" },
        })
        .unwrap_err();
    assert!(matches!(err, Error::AssertionFailed { .. }));
    h.run(doc! { "name": "abortTransaction", "object": "session0" }).unwrap();
    h.run(doc! {
        "name": "assertSessionTransactionState",
        "object": "testRunner",
        "arguments": { "session": "session0", "state": "aborted" },
    })
    .unwrap();
}

#[test]
fn test_collection_and_index_assertions() {
    let mut h = Harness::new();
    h.run(doc! {
        "name": "assertCollectionNotExists",
        "object": "testRunner",
        "arguments": { "databaseName": "db", "collectionName": "coll" },
    })
    .unwrap();
    h.run(doc! {
        "name": "createIndex",
        "object": "collection0",
        "arguments": { "keys": { "x": 1 }, "name": "x_1" },
        "expectResult": "x_1",
    })
    .unwrap();
    h.run(doc! {
        "name": "assertCollectionExists",
        "object": "testRunner",
        "arguments": { "databaseName": "db", "collectionName": "coll" },
    })
    .unwrap();
    h.run(doc! {
        "name": "assertIndexExists",
        "object": "testRunner",
        "arguments": { "databaseName": "db", "collectionName": "coll", "indexName": "x_1" },
    })
    .unwrap();
    h.run(doc! {
        "name": "assertIndexNotExists",
        "object": "testRunner",
        "arguments": { "databaseName": "db", "collectionName": "other", "indexName": "x_1" },
    })
    .unwrap();
}

#[test]
fn test_change_stream_iteration() {
    let mut h = Harness::new();
    h.run(doc! {
        "name": "createChangeStream",
        "object": "collection0",
        "arguments": { "pipeline": [] },
        "saveResultAsEntity": "stream0",
    })
    .unwrap();
    h.run(doc! {
        "name": "insertOne",
        "object": "collection0",
        "arguments": { "document": { "_id": 1 } },
    })
    .unwrap();
    h.run(doc! {
        "name": "iterateUntilDocumentOrError",
        "object": "stream0",
        "expectResult": {
            "operationType": "insert",
            "ns": { "db": "db", "coll": "coll" },
            "fullDocument": { "_id": 1 },
        },
    })
    .unwrap();
}
