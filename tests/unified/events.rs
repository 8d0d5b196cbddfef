//! expectEvents verification

use crate::common::*;
use serde_json::json;
use unified_runner::{Error, TestOutcome};

fn insert_and_find() -> serde_json::Value {
    json!([
        {
            "name": "insertOne",
            "object": "collection0",
            "arguments": { "document": { "_id": 1 } }
        },
        {
            "name": "find",
            "object": "collection0",
            "arguments": { "filter": { "_id": 1 } },
            "expectResult": [{ "_id": 1 }]
        }
    ])
}

#[test]
fn observed_events_match_in_order() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "events",
                "operations": insert_and_find(),
                "expectEvents": [{
                    "client": "client0",
                    "events": [
                        {
                            "commandStartedEvent": {
                                "command": { "insert": "coll", "documents": [{ "_id": 1 }] },
                                "commandName": "insert",
                                "databaseName": "db"
                            }
                        },
                        {
                            "commandStartedEvent": {
                                "command": { "find": "coll", "filter": { "_id": 1 } },
                                "commandName": "find"
                            }
                        }
                    ]
                }]
            }]),
        ))
        .unwrap();
    assert_eq!(report.outcome("events"), Some(&TestOutcome::Passed), "{}", report);
}

#[test]
fn missing_event_fails_the_test() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "too few",
                "operations": insert_and_find(),
                "expectEvents": [{
                    "client": "client0",
                    "events": [{ "commandStartedEvent": { "commandName": "insert" } }]
                }]
            }]),
        ))
        .unwrap();
    let reason = failure_reason(&report, "too few");
    assert!(reason.contains("events for client client0 do not match"), "{}", reason);
}

#[test]
fn extra_events_can_be_ignored() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "prefix",
                "operations": insert_and_find(),
                "expectEvents": [{
                    "client": "client0",
                    "ignoreExtraEvents": true,
                    "events": [{ "commandStartedEvent": { "commandName": "insert" } }]
                }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}

#[test]
fn wrong_command_fails_the_test() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "order",
                "operations": insert_and_find(),
                "expectEvents": [{
                    "client": "client0",
                    "events": [
                        { "commandStartedEvent": { "commandName": "find" } },
                        { "commandStartedEvent": { "commandName": "insert" } }
                    ]
                }]
            }]),
        ))
        .unwrap();
    assert!(failure_reason(&report, "order").contains("expected command find, got insert"));
}

#[test]
fn non_command_event_types_are_not_verified() {
    let fx = Fixture::new();
    let report = fx
        .run(file_with(
            json!([]),
            json!([{
                "description": "cmap",
                "operations": [],
                "expectEvents": [{
                    "client": "client0",
                    "eventType": "cmap",
                    "events": [
                        { "poolCreatedEvent": {} },
                        { "connectionCheckedOutEvent": {} }
                    ]
                }]
            }]),
        ))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}

#[test]
fn unknown_command_event_aborts_the_file() {
    let fx = Fixture::new();
    let err = fx
        .run(file_with(
            json!([{ "_id": 1 }]),
            json!([{
                "description": "bad event",
                "operations": [{
                    "name": "insertOne",
                    "object": "collection0",
                    "arguments": { "document": { "_id": 2 } }
                }],
                "expectEvents": [{ "client": "client0", "events": [{ "poolCreatedEvent": {} }] }]
            }]),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTestFile { .. }), "{}", err);
    assert_eq!(fx.driver.documents("db", "coll").len(), 0, "nothing is seeded or run");
}

#[test]
fn session_lsid_operator_in_events() {
    let fx = Fixture::new();
    let mut entities = standard_entities();
    entities
        .as_array_mut()
        .unwrap()
        .push(json!({ "session": { "id": "session0", "client": "client0" } }));
    let report = fx
        .run(json!({
            "description": "lsid",
            "schemaVersion": "1.0",
            "createEntities": entities,
            "tests": [{
                "description": "explicit session",
                "operations": [{
                    "name": "insertOne",
                    "object": "collection0",
                    "arguments": { "document": { "_id": 1 }, "session": "session0" }
                }],
                "expectEvents": [{
                    "client": "client0",
                    "events": [{
                        "commandStartedEvent": {
                            "command": { "insert": "coll", "lsid": { "$$sessionLsid": "session0" } }
                        }
                    }]
                }]
            }]
        }))
        .unwrap();
    assert!(report.is_success(), "{}", report);
}
