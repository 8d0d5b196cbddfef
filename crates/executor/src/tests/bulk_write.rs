//! Tests for `bulkWrite` request decoding in both request shapes.

use bson::doc;
use unified_driver::{UpdateModification, WriteModel};

use crate::operation::bulk::decode_request;
use crate::registry;
use crate::{Error, Operation};

#[test]
fn test_legacy_and_unified_shapes_are_equivalent() {
    let pairs = [
        (
            doc! { "name": "insertOne", "arguments": { "document": { "_id": 1 } } },
            doc! { "insertOne": { "document": { "_id": 1 } } },
        ),
        (
            doc! { "name": "deleteMany", "arguments": { "filter": { "x": 1 }, "hint": "x_1" } },
            doc! { "deleteMany": { "filter": { "x": 1 }, "hint": "x_1" } },
        ),
        (
            doc! { "name": "replaceOne", "arguments": { "filter": {}, "replacement": { "y": 2 }, "upsert": true } },
            doc! { "replaceOne": { "filter": {}, "replacement": { "y": 2 }, "upsert": true } },
        ),
        (
            doc! { "name": "updateOne", "arguments": { "filter": {}, "update": { "$inc": { "x": 1 } } } },
            doc! { "updateOne": { "filter": {}, "update": { "$inc": { "x": 1 } } } },
        ),
    ];
    for (legacy, unified) in pairs {
        assert_eq!(decode_request(&legacy).unwrap(), decode_request(&unified).unwrap());
    }
}

#[test]
fn test_update_accepts_pipeline() {
    let model = decode_request(&doc! {
        "updateMany": { "filter": {}, "update": [{ "$set": { "x": 1 } }] }
    })
    .unwrap();
    match model {
        WriteModel::UpdateMany { update, .. } => {
            assert_eq!(update, UpdateModification::Pipeline(vec![doc! { "$set": { "x": 1 } }]));
        }
        other => panic!("Expected UpdateMany, got {:?}", other),
    }
}

#[test]
fn test_ambiguous_request() {
    let err = decode_request(&doc! {
        "deleteOne": { "filter": {} },
        "insertOne": { "document": {} },
    })
    .unwrap_err();
    assert_eq!(
        err,
        Error::AmbiguousWriteModel {
            keys: vec!["insertOne".into(), "deleteOne".into()]
        }
    );
}

#[test]
fn test_request_without_model() {
    assert_eq!(decode_request(&doc! {}).unwrap_err(), Error::NoWriteModelMatched);
    assert_eq!(
        decode_request(&doc! { "upsertOne": { "filter": {} } }).unwrap_err(),
        Error::NoWriteModelMatched
    );
}

#[test]
fn test_extra_key_beside_model() {
    let err = decode_request(&doc! { "insertOne": { "document": {} }, "ordered": true }).unwrap_err();
    assert_eq!(
        err,
        Error::UnsupportedArgument {
            operation: "bulkWrite".into(),
            key: "ordered".into()
        }
    );

    let err = decode_request(&doc! { "name": "insertOne", "arguments": { "document": {} }, "x": 1 }).unwrap_err();
    assert!(matches!(err, Error::UnsupportedArgument { ref key, .. } if key == "x"));
}

#[test]
fn test_unknown_model_argument() {
    let err = decode_request(&doc! { "insertOne": { "document": {}, "upsert": true } }).unwrap_err();
    assert_eq!(
        err,
        Error::UnsupportedArgument {
            operation: "insertOne".into(),
            key: "upsert".into()
        }
    );

    let err = decode_request(&doc! {
        "name": "deleteOne",
        "arguments": { "filter": {}, "arrayFilters": [] }
    })
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedArgument { ref operation, .. } if operation == "deleteOne"));
}

#[test]
fn test_non_document_model_value() {
    let err = decode_request(&doc! { "insertOne": 1 }).unwrap_err();
    assert_eq!(err, Error::NoWriteModelMatched);
}

#[test]
fn test_bulk_write_operation_decodes_requests() {
    let args = doc! {
        "requests": [
            { "insertOne": { "document": { "_id": 1 } } },
            { "name": "deleteOne", "arguments": { "filter": { "_id": 1 } } },
        ],
        "ordered": false,
    };
    match registry::decode("bulkWrite", Some(&args)).unwrap() {
        Operation::BulkWrite { requests, options, .. } => {
            assert_eq!(requests.len(), 2);
            assert_eq!(requests[1].name(), "deleteOne");
            assert_eq!(options.ordered, Some(false));
        }
        other => panic!("Expected BulkWrite, got {:?}", other),
    }
}

#[test]
fn test_bulk_write_propagates_request_errors() {
    let args = doc! { "requests": [{ "insertOne": { "document": {} }, "deleteOne": { "filter": {} } }] };
    assert!(matches!(
        registry::decode("bulkWrite", Some(&args)),
        Err(Error::AmbiguousWriteModel { .. })
    ));
}
