//! Entities, sessions, transactions, fail points and teardown

use crate::common::*;
use serde_json::{json, Value};
use unified_runner::{Error, TestOutcome};

fn entities_with_session() -> Value {
    let mut entities = standard_entities();
    entities
        .as_array_mut()
        .unwrap()
        .push(json!({ "session": { "id": "session0", "client": "client0" } }));
    entities
}

fn file(entities: Value, tests: Value) -> Value {
    json!({
        "description": "lifecycle",
        "schemaVersion": "1.3",
        "createEntities": entities,
        "initialData": [{ "collectionName": "coll", "databaseName": "db", "documents": [] }],
        "tests": tests
    })
}

#[test]
fn unresolved_parent_aborts_the_file() {
    let fx = Fixture::new();
    let err = fx
        .run(file(
            json!([
                { "database": { "id": "database0", "client": "client0", "databaseName": "db" } }
            ]),
            json!([{ "description": "never runs", "operations": [] }]),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::UnresolvedParent { ref id } if id == "client0"));
}

#[test]
fn duplicate_entity_id_aborts_the_file() {
    let fx = Fixture::new();
    let err = fx
        .run(file(
            json!([
                { "client": { "id": "client0" } },
                { "client": { "id": "client0" } }
            ]),
            json!([{ "description": "never runs", "operations": [] }]),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateEntityId { .. }));
}

#[test]
fn operation_on_wrong_entity_kind_aborts_the_file() {
    let fx = Fixture::new();
    let err = fx
        .run(file(
            standard_entities(),
            json!([{
                "description": "insert on a client",
                "operations": [{
                    "name": "insertOne",
                    "object": "client0",
                    "arguments": { "document": { "_id": 1 } }
                }]
            }]),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedTarget { .. }), "{}", err);
}

#[test]
fn committed_transaction_is_visible() {
    let fx = Fixture::new();
    let report = fx
        .run(file(
            entities_with_session(),
            json!([{
                "description": "commit",
                "operations": [
                    { "name": "startTransaction", "object": "session0" },
                    {
                        "name": "insertOne",
                        "object": "collection0",
                        "arguments": { "document": { "_id": 1 }, "session": "session0" }
                    },
                    {
                        "name": "assertSessionTransactionState",
                        "object": "testRunner",
                        "arguments": { "session": "session0", "state": "in_progress" }
                    },
                    { "name": "commitTransaction", "object": "session0" },
                    {
                        "name": "assertSessionTransactionState",
                        "object": "testRunner",
                        "arguments": { "session": "session0", "state": "committed" }
                    }
                ],
                "outcome": [{ "collectionName": "coll", "databaseName": "db", "documents": [{ "_id": 1 }] }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}

#[test]
fn aborted_transaction_leaves_no_trace() {
    let fx = Fixture::new();
    let report = fx
        .run(file(
            entities_with_session(),
            json!([{
                "description": "abort",
                "operations": [
                    { "name": "startTransaction", "object": "session0" },
                    {
                        "name": "insertOne",
                        "object": "collection0",
                        "arguments": { "document": { "_id": 1 }, "session": "session0" }
                    },
                    { "name": "abortTransaction", "object": "session0" }
                ],
                "outcome": [{ "collectionName": "coll", "databaseName": "db", "documents": [] }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}

#[test]
fn failing_test_tears_down_its_transaction() {
    let fx = Fixture::new();
    let report = fx
        .run(file(
            entities_with_session(),
            json!([{
                "description": "left open",
                "operations": [
                    { "name": "startTransaction", "object": "session0" },
                    {
                        "name": "insertOne",
                        "object": "collection0",
                        "arguments": { "document": { "_id": 1 }, "session": "session0" }
                    },
                    {
                        "name": "assertSessionTransactionState",
                        "object": "testRunner",
                        "arguments": { "session": "session0", "state": "committed" }
                    }
                ]
            }]),
        ))
        .unwrap();
    assert!(failure_reason(&report, "left open").contains("assertion failed"));
    assert_eq!(fx.driver.open_transactions(), 0);
}

#[test]
fn fail_point_injects_error_and_is_disabled_at_teardown() {
    let fx = Fixture::new();
    let report = fx
        .run(file(
            standard_entities(),
            json!([{
                "description": "fail point",
                "operations": [
                    {
                        "name": "failPoint",
                        "object": "testRunner",
                        "arguments": {
                            "client": "client0",
                            "failPoint": {
                                "configureFailPoint": "failCommand",
                                "mode": "alwaysOn",
                                "data": { "failCommands": ["insert"], "errorCode": 91 }
                            }
                        }
                    },
                    {
                        "name": "insertOne",
                        "object": "collection0",
                        "arguments": { "document": { "_id": 1 } },
                        "expectError": { "isClientError": false, "errorCode": 91 }
                    }
                ],
                "outcome": [{ "collectionName": "coll", "databaseName": "db", "documents": [] }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
    assert_eq!(fx.driver.active_fail_points(), 0);
}

#[test]
fn change_stream_sees_inserts() {
    let fx = Fixture::new();
    let report = fx
        .run(file(
            standard_entities(),
            json!([{
                "description": "watch",
                "operations": [
                    {
                        "name": "createChangeStream",
                        "object": "collection0",
                        "arguments": { "pipeline": [] },
                        "saveResultAsEntity": "changeStream0"
                    },
                    {
                        "name": "insertOne",
                        "object": "collection0",
                        "arguments": { "document": { "_id": 1, "x": 1 } }
                    },
                    {
                        "name": "iterateUntilDocumentOrError",
                        "object": "changeStream0",
                        "expectResult": {
                            "operationType": "insert",
                            "ns": { "db": "db", "coll": "coll" },
                            "fullDocument": { "_id": 1, "x": 1 }
                        }
                    }
                ]
            }]),
        ))
        .unwrap();
    assert_eq!(report.outcome("watch"), Some(&TestOutcome::Passed), "{}", report);
}

#[test]
fn index_assertions() {
    let fx = Fixture::new();
    let report = fx
        .run(file(
            standard_entities(),
            json!([{
                "description": "indexes",
                "operations": [
                    {
                        "name": "assertIndexNotExists",
                        "object": "testRunner",
                        "arguments": { "databaseName": "db", "collectionName": "coll", "indexName": "x_1" }
                    },
                    {
                        "name": "createIndex",
                        "object": "collection0",
                        "arguments": { "keys": { "x": 1 }, "name": "x_1" }
                    },
                    {
                        "name": "assertIndexExists",
                        "object": "testRunner",
                        "arguments": { "databaseName": "db", "collectionName": "coll", "indexName": "x_1" }
                    }
                ]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}
