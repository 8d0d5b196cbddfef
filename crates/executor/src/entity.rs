//! Entities and the per-test entity map.
//!
//! Entities are built from a file's `createEntities` list before every test,
//! in list order. A child names its parent by id, so the parent has to come
//! first. Operation results saved with `saveResultAsEntity` join the map
//! while the test runs. At teardown sessions are ended and the map is
//! emptied.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use serde::Deserialize;
use tracing::debug;
use unified_core::{EntityKind, Error, Result};
use unified_driver::{
    BucketHandle, ChangeStreamHandle, ClientHandle, ClientOptions, CollectionHandle, CollectionOptions,
    DatabaseHandle, DatabaseOptions, Driver, SessionHandle, SessionOptions,
};

// =============================================================================
// Descriptions
// =============================================================================

/// One entry of `createEntities`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityDescription {
    Client(ClientDescription),
    Database(DatabaseDescription),
    Collection(CollectionDescription),
    Session(SessionDescription),
    Bucket(BucketDescription),
}

impl EntityDescription {
    pub fn id(&self) -> &str {
        match self {
            EntityDescription::Client(d) => &d.id,
            EntityDescription::Database(d) => &d.id,
            EntityDescription::Collection(d) => &d.id,
            EntityDescription::Session(d) => &d.id,
            EntityDescription::Bucket(d) => &d.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityDescription::Client(_) => EntityKind::Client,
            EntityDescription::Database(_) => EntityKind::Database,
            EntityDescription::Collection(_) => EntityKind::Collection,
            EntityDescription::Session(_) => EntityKind::Session,
            EntityDescription::Bucket(_) => EntityKind::Bucket,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientDescription {
    pub id: String,
    #[serde(default)]
    pub uri_options: Document,
    #[serde(default)]
    pub use_multiple_mongoses: Option<bool>,
    #[serde(default)]
    pub observe_events: Vec<String>,
    #[serde(default)]
    pub ignore_command_monitoring_events: Vec<String>,
    #[serde(default)]
    pub observe_sensitive_commands: Option<bool>,
    #[serde(default)]
    pub server_api: Option<Document>,
}

impl ClientDescription {
    fn options(&self) -> ClientOptions {
        ClientOptions {
            uri_options: self.uri_options.clone(),
            use_multiple_mongoses: self.use_multiple_mongoses,
            observe_events: self.observe_events.clone(),
            ignore_command_monitoring_events: self.ignore_command_monitoring_events.clone(),
            observe_sensitive_commands: self.observe_sensitive_commands.unwrap_or(false),
            server_api: self.server_api.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseDescription {
    pub id: String,
    pub client: String,
    pub database_name: String,
    #[serde(default, alias = "options")]
    pub database_options: DatabaseOptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CollectionDescription {
    pub id: String,
    pub database: String,
    pub collection_name: String,
    #[serde(default, alias = "options")]
    pub collection_options: CollectionOptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionDescription {
    pub id: String,
    pub client: String,
    #[serde(default, alias = "options")]
    pub session_options: SessionOptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BucketDescription {
    pub id: String,
    pub database: String,
    #[serde(default)]
    pub bucket_options: Document,
}

// =============================================================================
// Entity
// =============================================================================

/// A live entity.
#[derive(Clone)]
pub enum Entity {
    Client(Arc<dyn ClientHandle>),
    Database(Arc<dyn DatabaseHandle>),
    Collection(Arc<dyn CollectionHandle>),
    Session(Arc<dyn SessionHandle>),
    Bucket(Arc<dyn BucketHandle>),
    ChangeStream(Arc<dyn ChangeStreamHandle>),
    Value(Bson),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Client(_) => EntityKind::Client,
            Entity::Database(_) => EntityKind::Database,
            Entity::Collection(_) => EntityKind::Collection,
            Entity::Session(_) => EntityKind::Session,
            Entity::Bucket(_) => EntityKind::Bucket,
            Entity::ChangeStream(_) => EntityKind::ChangeStream,
            Entity::Value(_) => EntityKind::Value,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Database(db) => write!(f, "Database({})", db.name()),
            Entity::Collection(coll) => write!(f, "Collection({}.{})", coll.database_name(), coll.name()),
            Entity::Session(session) => write!(f, "Session({})", session.lsid()),
            Entity::Value(value) => write!(f, "Value({})", value),
            other => write!(f, "{}", other.kind()),
        }
    }
}

// =============================================================================
// EntityMap
// =============================================================================

/// Entities of one test, keyed by id.
#[derive(Debug, Default)]
pub struct EntityMap {
    entities: HashMap<String, Entity>,
    /// Ids in creation order
    order: Vec<String>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every described entity in order.
    ///
    /// On failure every session created so far is ended before the error is
    /// returned.
    pub fn build(driver: &dyn Driver, descriptions: &[EntityDescription]) -> Result<Self> {
        let mut map = Self::new();
        for description in descriptions {
            if let Err(e) = map.create(driver, description) {
                map.close();
                return Err(e);
            }
        }
        Ok(map)
    }

    fn create(&mut self, driver: &dyn Driver, description: &EntityDescription) -> Result<()> {
        let id = description.id();
        if self.entities.contains_key(id) {
            return Err(Error::DuplicateEntityId { id: id.to_string() });
        }
        let entity = match description {
            EntityDescription::Client(d) => Entity::Client(driver.create_client(&d.options())?),
            EntityDescription::Database(d) => {
                let client = self.parent_client(&d.client)?;
                Entity::Database(client.database(&d.database_name, &d.database_options))
            }
            EntityDescription::Collection(d) => {
                let database = self.parent_database(&d.database)?;
                Entity::Collection(database.collection(&d.collection_name, &d.collection_options))
            }
            EntityDescription::Session(d) => {
                let client = self.parent_client(&d.client)?;
                Entity::Session(client.start_session(&d.session_options)?)
            }
            EntityDescription::Bucket(d) => {
                let database = self.parent_database(&d.database)?;
                Entity::Bucket(database.bucket(&d.bucket_options))
            }
        };
        debug!(target: "unified::entity", id, kind = %entity.kind(), "created entity");
        self.insert(id.to_string(), entity);
        Ok(())
    }

    fn parent(&self, id: &str, expected: EntityKind) -> Result<&Entity> {
        let entity = self
            .entities
            .get(id)
            .ok_or_else(|| Error::UnresolvedParent { id: id.to_string() })?;
        if entity.kind() != expected {
            return Err(Error::WrongEntityKind {
                id: id.to_string(),
                expected,
                actual: entity.kind(),
            });
        }
        Ok(entity)
    }

    fn parent_client(&self, id: &str) -> Result<Arc<dyn ClientHandle>> {
        match self.parent(id, EntityKind::Client)? {
            Entity::Client(client) => Ok(Arc::clone(client)),
            _ => Err(Error::UnresolvedParent { id: id.to_string() }),
        }
    }

    fn parent_database(&self, id: &str) -> Result<Arc<dyn DatabaseHandle>> {
        match self.parent(id, EntityKind::Database)? {
            Entity::Database(database) => Ok(Arc::clone(database)),
            _ => Err(Error::UnresolvedParent { id: id.to_string() }),
        }
    }

    fn insert(&mut self, id: String, entity: Entity) {
        self.order.push(id.clone());
        self.entities.insert(id, entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Look up an entity of any kind.
    pub fn entity(&self, id: &str) -> Result<&Entity> {
        self.entities
            .get(id)
            .ok_or_else(|| Error::UnknownEntity { id: id.to_string() })
    }

    /// Look up an entity, requiring a kind.
    pub fn get(&self, id: &str, kind: EntityKind) -> Result<&Entity> {
        let entity = self.entity(id)?;
        if entity.kind() != kind {
            return Err(Error::WrongEntityKind {
                id: id.to_string(),
                expected: kind,
                actual: entity.kind(),
            });
        }
        Ok(entity)
    }

    pub fn client(&self, id: &str) -> Result<Arc<dyn ClientHandle>> {
        match self.get(id, EntityKind::Client)? {
            Entity::Client(client) => Ok(Arc::clone(client)),
            _ => Err(Error::UnknownEntity { id: id.to_string() }),
        }
    }

    pub fn database(&self, id: &str) -> Result<Arc<dyn DatabaseHandle>> {
        match self.get(id, EntityKind::Database)? {
            Entity::Database(database) => Ok(Arc::clone(database)),
            _ => Err(Error::UnknownEntity { id: id.to_string() }),
        }
    }

    pub fn collection(&self, id: &str) -> Result<Arc<dyn CollectionHandle>> {
        match self.get(id, EntityKind::Collection)? {
            Entity::Collection(collection) => Ok(Arc::clone(collection)),
            _ => Err(Error::UnknownEntity { id: id.to_string() }),
        }
    }

    pub fn session(&self, id: &str) -> Result<Arc<dyn SessionHandle>> {
        match self.get(id, EntityKind::Session)? {
            Entity::Session(session) => Ok(Arc::clone(session)),
            _ => Err(Error::UnknownEntity { id: id.to_string() }),
        }
    }

    /// Resolve an operation's optional `session` argument.
    pub fn optional_session(&self, id: Option<&str>) -> Result<Option<Arc<dyn SessionHandle>>> {
        id.map(|id| self.session(id)).transpose()
    }

    pub fn change_stream(&self, id: &str) -> Result<Arc<dyn ChangeStreamHandle>> {
        match self.get(id, EntityKind::ChangeStream)? {
            Entity::ChangeStream(stream) => Ok(Arc::clone(stream)),
            _ => Err(Error::UnknownEntity { id: id.to_string() }),
        }
    }

    /// A saved plain value.
    pub fn value(&self, id: &str) -> Result<&Bson> {
        match self.get(id, EntityKind::Value)? {
            Entity::Value(value) => Ok(value),
            _ => Err(Error::UnknownEntity { id: id.to_string() }),
        }
    }

    /// Store an operation result under a new id.
    pub fn store(&mut self, id: &str, entity: Entity) -> Result<()> {
        if self.entities.contains_key(id) {
            return Err(Error::DuplicateEntityId { id: id.to_string() });
        }
        debug!(target: "unified::entity", id, kind = %entity.kind(), "saved result as entity");
        self.insert(id.to_string(), entity);
        Ok(())
    }

    /// End every session in reverse creation order and empty the map.
    pub fn close(&mut self) {
        for id in self.order.iter().rev() {
            if let Some(Entity::Session(session)) = self.entities.get(id) {
                debug!(target: "unified::entity", id = id.as_str(), "ending session");
                session.end();
            }
        }
        self.entities.clear();
        self.order.clear();
    }
}

impl Drop for EntityMap {
    fn drop(&mut self) {
        self.close();
    }
}
