//! CRUD operations, expected results and errors, outcomes

use crate::common::*;
use serde_json::json;
use unified_runner::{Error, TestOutcome};

#[test]
fn insert_then_outcome_passes() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "insertOne",
                "operations": [{
                    "name": "insertOne",
                    "object": "collection0",
                    "arguments": { "document": { "_id": 1, "x": 11 } },
                    "expectResult": { "insertedId": { "$$unsetOrMatches": 1 } }
                }],
                "outcome": [{
                    "collectionName": "coll",
                    "databaseName": "db",
                    "documents": [{ "_id": 1, "x": 11 }]
                }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
    assert_eq!(report.outcome("insertOne"), Some(&TestOutcome::Passed));
}

#[test]
fn expected_error_on_success_fails_the_test() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "no duplicate",
                "operations": [{
                    "name": "insertOne",
                    "object": "collection0",
                    "arguments": { "document": { "_id": 1 } },
                    "expectError": { "errorCode": 11000 }
                }]
            }]),
        ))
        .unwrap();
    let reason = failure_reason(&report, "no duplicate");
    assert!(reason.contains("expected error, got success"), "{}", reason);
}

#[test]
fn duplicate_key_error_matches_expectation() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1 }]),
            json!([{
                "description": "duplicate",
                "operations": [{
                    "name": "insertOne",
                    "object": "collection0",
                    "arguments": { "document": { "_id": 1 } },
                    "expectError": {
                        "isClientError": false,
                        "errorCode": 11000,
                        "errorCodeName": "DuplicateKey"
                    }
                }],
                "outcome": [{ "collectionName": "coll", "databaseName": "db", "documents": [{ "_id": 1 }] }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}

#[test]
fn wrong_error_code_fails_the_test() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1 }]),
            json!([{
                "description": "wrong code",
                "operations": [{
                    "name": "insertOne",
                    "object": "collection0",
                    "arguments": { "document": { "_id": 1 } },
                    "expectError": { "errorCode": 50 }
                }]
            }]),
        ))
        .unwrap();
    assert!(failure_reason(&report, "wrong code").contains("expected error code 50"));
}

#[test]
fn unexpected_error_fails_the_test_and_stops_it() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1 }]),
            json!([{
                "description": "duplicate without expectation",
                "operations": [
                    {
                        "name": "insertOne",
                        "object": "collection0",
                        "arguments": { "document": { "_id": 1 } }
                    },
                    {
                        "name": "insertOne",
                        "object": "collection0",
                        "arguments": { "document": { "_id": 2 } }
                    }
                ]
            }]),
        ))
        .unwrap();
    assert!(failure_reason(&report, "duplicate without expectation").contains("unexpected error"));
    let docs = fx.driver.documents("db", "coll");
    assert_eq!(docs.len(), 1, "second insert must not run");
}

#[test]
fn ignore_result_and_error_swallows_failures() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1 }]),
            json!([{
                "description": "ignored",
                "operations": [{
                    "name": "insertOne",
                    "object": "collection0",
                    "arguments": { "document": { "_id": 1 } },
                    "ignoreResultAndError": true
                }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}

#[test]
fn result_mismatch_fails_the_test() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1, "x": 1 }, { "_id": 2, "x": 2 }]),
            json!([{
                "description": "count",
                "operations": [{
                    "name": "countDocuments",
                    "object": "collection0",
                    "arguments": { "filter": {} },
                    "expectResult": 3
                }]
            }]),
        ))
        .unwrap();
    assert!(failure_reason(&report, "count").contains("result mismatch"));
}

#[test]
fn outcome_mismatch_fails_the_test() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1, "x": 1 }]),
            json!([{
                "description": "update",
                "operations": [{
                    "name": "updateOne",
                    "object": "collection0",
                    "arguments": { "filter": { "_id": 1 }, "update": { "$set": { "x": 2 } } },
                    "expectResult": { "matchedCount": 1, "modifiedCount": 1, "upsertedCount": 0 }
                }],
                "outcome": [{ "collectionName": "coll", "databaseName": "db", "documents": [{ "_id": 1, "x": 1 }] }]
            }]),
        ))
        .unwrap();
    assert!(failure_reason(&report, "update").contains("outcome mismatch for db.coll"));
}

#[test]
fn outcome_rejects_extra_fields() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1, "x": 1 }]),
            json!([{
                "description": "extra field",
                "operations": [],
                "outcome": [{ "collectionName": "coll", "databaseName": "db", "documents": [{ "_id": 1 }] }]
            }]),
        ))
        .unwrap();
    assert!(failure_reason(&report, "extra field").contains("outcome mismatch"));
}

#[test]
fn bulk_write_shapes_are_equivalent() {
    let tests = json!([
        {
            "description": "unified shape",
            "operations": [{
                "name": "bulkWrite",
                "object": "collection0",
                "arguments": {
                    "requests": [
                        { "insertOne": { "document": { "_id": 2 } } },
                        { "updateOne": { "filter": { "_id": 1 }, "update": { "$inc": { "x": 1 } } } },
                        { "deleteOne": { "filter": { "_id": 2 } } }
                    ]
                }
            }],
            "outcome": [{ "collectionName": "coll", "databaseName": "db", "documents": [{ "_id": 1, "x": 2 }] }]
        },
        {
            "description": "legacy shape",
            "operations": [{
                "name": "bulkWrite",
                "object": "collection0",
                "arguments": {
                    "requests": [
                        { "name": "insertOne", "arguments": { "document": { "_id": 2 } } },
                        { "name": "updateOne", "arguments": { "filter": { "_id": 1 }, "update": { "$inc": { "x": 1 } } } },
                        { "name": "deleteOne", "arguments": { "filter": { "_id": 2 } } }
                    ]
                }
            }],
            "outcome": [{ "collectionName": "coll", "databaseName": "db", "documents": [{ "_id": 1, "x": 2 }] }]
        }
    ]);
    let fx = Fixture::new();
    let report = fx.run(file_with(json!([{ "_id": 1, "x": 1 }]), tests)).unwrap();
    assert_eq!(report.passed(), 2, "{}", report);
}

#[test]
fn ambiguous_bulk_write_request_aborts_the_file() {
    let fx = Fixture::new();
    let err = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "ambiguous",
                "operations": [{
                    "name": "bulkWrite",
                    "object": "collection0",
                    "arguments": {
                        "requests": [{
                            "insertOne": { "document": { "_id": 1 } },
                            "deleteOne": { "filter": { "_id": 1 } }
                        }]
                    }
                }]
            }]),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::AmbiguousWriteModel { .. }), "{}", err);
}

#[test]
fn unknown_operation_aborts_the_file() {
    let fx = Fixture::new();
    let err = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "unknown",
                "operations": [{ "name": "frobnicate", "object": "collection0" }]
            }]),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownOperation { ref name } if name == "frobnicate"));
}

#[test]
fn unrecognized_argument_aborts_the_file() {
    let fx = Fixture::new();
    let err = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "typo",
                "operations": [{
                    "name": "insertOne",
                    "object": "collection0",
                    "arguments": { "document": { "_id": 1 }, "documnet": {} }
                }]
            }]),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::UnrecognizedArgument { ref key, .. } if key == "documnet"));
    assert!(fx.driver.documents("db", "coll").is_empty(), "nothing runs before decoding fails");
}

#[test]
fn saved_result_can_be_matched_later() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1, "x": 1 }]),
            json!([{
                "description": "save and match",
                "operations": [
                    {
                        "name": "findOne",
                        "object": "collection0",
                        "arguments": { "filter": { "_id": 1 } },
                        "saveResultAsEntity": "original"
                    },
                    {
                        "name": "find",
                        "object": "collection0",
                        "arguments": { "filter": {} },
                        "expectResult": [{ "$$matchesEntity": "original" }]
                    }
                ]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}

#[test]
fn empty_initial_data_creates_the_collection() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "created",
                "operations": [{
                    "name": "assertCollectionExists",
                    "object": "testRunner",
                    "arguments": { "databaseName": "db", "collectionName": "coll" }
                }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}

#[test]
fn each_test_starts_from_initial_data() {
    let insert = json!({
        "name": "insertOne",
        "object": "collection0",
        "arguments": { "document": { "_id": 2 } }
    });
    let outcome = json!([{ "collectionName": "coll", "databaseName": "db", "documents": [{ "_id": 1 }, { "_id": 2 }] }]);
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([{ "_id": 1 }]),
            json!([
                { "description": "first", "operations": [insert.clone()], "outcome": outcome.clone() },
                { "description": "second", "operations": [insert], "outcome": outcome }
            ]),
        ))
        .unwrap();
    assert_eq!(report.passed(), 2, "{}", report);
}
