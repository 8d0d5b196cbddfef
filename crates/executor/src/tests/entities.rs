//! Tests for entity map construction and lookup.

use bson::{doc, Bson, Document};
use unified_core::EntityKind;
use unified_driver::memory::MemoryDriver;

use crate::{Entity, EntityDescription, EntityMap, Error};

fn descriptions(entries: Vec<Document>) -> Vec<EntityDescription> {
    entries
        .into_iter()
        .map(|d| bson::from_document(d).unwrap())
        .collect()
}

fn standard() -> Vec<EntityDescription> {
    descriptions(vec![
        doc! { "client": { "id": "client0", "observeEvents": ["commandStartedEvent"] } },
        doc! { "database": { "id": "database0", "client": "client0", "databaseName": "db" } },
        doc! { "collection": { "id": "collection0", "database": "database0", "collectionName": "coll" } },
        doc! { "session": { "id": "session0", "client": "client0" } },
        doc! { "bucket": { "id": "bucket0", "database": "database0" } },
    ])
}

#[test]
fn test_build_in_order() {
    let driver = MemoryDriver::default();
    let map = EntityMap::build(&driver, &standard()).unwrap();
    assert_eq!(map.len(), 5);
    assert_eq!(
        map.ids().collect::<Vec<_>>(),
        vec!["client0", "database0", "collection0", "session0", "bucket0"]
    );
    let coll = map.collection("collection0").unwrap();
    assert_eq!(coll.name(), "coll");
    assert_eq!(coll.database_name(), "db");
    assert_eq!(map.entity("bucket0").unwrap().kind(), EntityKind::Bucket);
}

#[test]
fn test_child_before_parent_is_unresolved() {
    let driver = MemoryDriver::default();
    let specs = descriptions(vec![
        doc! { "client": { "id": "client0" } },
        doc! { "collection": { "id": "collection0", "database": "database0", "collectionName": "coll" } },
        doc! { "database": { "id": "database0", "client": "client0", "databaseName": "db" } },
    ]);
    let err = EntityMap::build(&driver, &specs).unwrap_err();
    assert_eq!(err, Error::UnresolvedParent { id: "database0".into() });
}

#[test]
fn test_duplicate_id() {
    let driver = MemoryDriver::default();
    let specs = descriptions(vec![
        doc! { "client": { "id": "client0" } },
        doc! { "client": { "id": "client0" } },
    ]);
    let err = EntityMap::build(&driver, &specs).unwrap_err();
    assert_eq!(err, Error::DuplicateEntityId { id: "client0".into() });
}

#[test]
fn test_parent_of_wrong_kind() {
    let driver = MemoryDriver::default();
    let specs = descriptions(vec![
        doc! { "client": { "id": "client0" } },
        doc! { "collection": { "id": "collection0", "database": "client0", "collectionName": "coll" } },
    ]);
    let err = EntityMap::build(&driver, &specs).unwrap_err();
    assert_eq!(
        err,
        Error::WrongEntityKind {
            id: "client0".into(),
            expected: EntityKind::Database,
            actual: EntityKind::Client,
        }
    );
}

#[test]
fn test_unknown_description_field_is_rejected() {
    let result = bson::from_document::<EntityDescription>(doc! {
        "client": { "id": "client0", "observeEvent": ["commandStartedEvent"] }
    });
    assert!(result.is_err());

    let result = bson::from_document::<EntityDescription>(doc! {
        "collection": { "id": "c", "database": "d", "collectionName": "x", "collectionOptions": { "readConcern": { "level": "local" } } }
    });
    assert!(result.is_ok());
}

#[test]
fn test_options_alias() {
    let description = bson::from_document::<EntityDescription>(doc! {
        "database": { "id": "d", "client": "c", "databaseName": "db", "options": { "writeConcern": { "w": 1 } } }
    })
    .unwrap();
    match description {
        EntityDescription::Database(d) => {
            assert_eq!(d.database_options.write_concern, Some(doc! { "w": 1 }));
        }
        other => panic!("Expected database description, got {:?}", other),
    }
}

#[test]
fn test_lookup_errors() {
    let driver = MemoryDriver::default();
    let map = EntityMap::build(&driver, &standard()).unwrap();
    assert_eq!(
        map.session("missing").err(),
        Some(Error::UnknownEntity { id: "missing".into() })
    );
    assert!(matches!(
        map.session("client0").err(),
        Some(Error::WrongEntityKind { expected: EntityKind::Session, .. })
    ));
}

#[test]
fn test_store_and_close() {
    let driver = MemoryDriver::default();
    let mut map = EntityMap::build(&driver, &standard()).unwrap();
    map.store("saved", Entity::Value(Bson::Int32(7))).unwrap();
    assert_eq!(map.value("saved").unwrap(), &Bson::Int32(7));
    assert_eq!(
        map.store("saved", Entity::Value(Bson::Null)).unwrap_err(),
        Error::DuplicateEntityId { id: "saved".into() }
    );

    map.close();
    assert!(map.is_empty());
    assert!(!map.contains("session0"));
}
