//! In-memory deployment implementing every driver capability.
//!
//! A [`MemoryDriver`] simulates one deployment (standalone, replica set,
//! sharded cluster or load balancer) entirely in process. All clients of a
//! driver share the same server state, so data written through one client
//! is visible to the others, just as with a real deployment.
//!
//! Supported behaviour:
//! - equality and comparison filters, `$and`/`$or`/`$nor`
//! - `$set`/`$unset`/`$inc` and pipeline updates, upserts
//! - sort, skip, limit and top-level projections
//! - unique indexes (always `_id_`) with `DuplicateKey` errors
//! - transactions that snapshot server state on their first operation and
//!   restore it on abort
//! - `failCommand` fail points, optionally targeted at one address
//! - command monitoring per client
//! - change streams over an in-process change log
//!
//! Only one transaction should be open at a time: aborting restores the
//! snapshot wholesale, discarding concurrent writes made outside it.

mod change_stream;
mod client;
mod collection;
mod database;
mod query;
mod server;
mod session;

use std::sync::Arc;

use bson::Document;
use parking_lot::Mutex;
use tracing::debug;
use unified_core::{ServerVersion, TopologyKind};

use crate::options::ClientOptions;
use crate::{ClientHandle, Driver, DriverResult};

pub use change_stream::MemoryChangeStream;
pub use client::MemoryClient;
pub use collection::MemoryCollection;
pub use database::{MemoryBucket, MemoryDatabase};
pub use session::MemorySession;

use server::ServerState;

/// Shape of the simulated deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentConfig {
    pub server_version: ServerVersion,
    pub topology: TopologyKind,
    /// Server addresses; the first one acts as primary (or default mongos)
    pub hosts: Vec<String>,
    /// Reply of `getParameter`
    pub server_parameters: Document,
    pub auth_enabled: bool,
    pub serverless: bool,
}

impl DeploymentConfig {
    /// A deployment with the usual host list for its topology.
    pub fn new(server_version: ServerVersion, topology: TopologyKind) -> Self {
        let hosts = match topology {
            TopologyKind::Single | TopologyKind::LoadBalanced => vec!["localhost:27017"],
            TopologyKind::ReplicaSet => vec!["localhost:27017", "localhost:27018", "localhost:27019"],
            TopologyKind::Sharded => vec!["localhost:27017", "localhost:27018"],
        };
        Self {
            server_version,
            topology,
            hosts: hosts.into_iter().map(String::from).collect(),
            server_parameters: Document::new(),
            auth_enabled: false,
            serverless: false,
        }
    }

    pub fn with_server_parameters(mut self, parameters: Document) -> Self {
        self.server_parameters = parameters;
        self
    }

    pub fn with_auth(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// Address commands go to unless a session is pinned elsewhere.
    pub(crate) fn primary(&self) -> &str {
        self.hosts.first().map(String::as_str).unwrap_or("localhost:27017")
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self::new(ServerVersion::new(7, 0, 0), TopologyKind::ReplicaSet)
    }
}

/// Shared state of one simulated deployment.
pub(crate) struct Deployment {
    pub(crate) config: DeploymentConfig,
    pub(crate) state: Mutex<ServerState>,
}

/// A driver whose clients all talk to one in-memory deployment.
pub struct MemoryDriver {
    deployment: Arc<Deployment>,
    internal: MemoryClient,
}

impl MemoryDriver {
    pub fn new(config: DeploymentConfig) -> Self {
        debug!(
            target: "unified::memory",
            version = %config.server_version,
            topology = %config.topology,
            "starting in-memory deployment"
        );
        let deployment = Arc::new(Deployment {
            config,
            state: Mutex::new(ServerState::default()),
        });
        let internal = MemoryClient::internal(Arc::clone(&deployment));
        Self {
            deployment,
            internal,
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.deployment.config
    }

    /// Current contents of a collection, in insertion order.
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        let ns = server::Namespace::new(database, collection);
        self.deployment.state.lock().documents(&ns)
    }

    /// Number of fail points still armed.
    pub fn active_fail_points(&self) -> usize {
        self.deployment.state.lock().fail_points.len()
    }

    /// Number of transactions the server still holds open.
    pub fn open_transactions(&self) -> usize {
        self.deployment.state.lock().transactions.len()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new(DeploymentConfig::default())
    }
}

impl Driver for MemoryDriver {
    fn internal_client(&self) -> Arc<dyn ClientHandle> {
        Arc::new(self.internal.clone())
    }

    fn create_client(&self, options: &ClientOptions) -> DriverResult<Arc<dyn ClientHandle>> {
        Ok(Arc::new(MemoryClient::new(
            Arc::clone(&self.deployment),
            options.clone(),
        )))
    }
}
