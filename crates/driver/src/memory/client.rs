//! Clients and the command pipeline every operation goes through.

use std::sync::Arc;

use bson::{doc, Bson, Document};
use parking_lot::Mutex;
use tracing::debug;
use unified_core::{DriverError, ServerVersion, TopologyKind};

use super::change_stream::{self, Scope};
use super::database::MemoryDatabase;
use super::query;
use super::server::ServerState;
use super::session::{MemorySession, TxnPhase};
use super::Deployment;
use crate::events::CommandEvent;
use crate::options::{
    ChangeStreamOptions, ClientOptions, DatabaseOptions, ListDatabasesOptions, SessionOptions,
};
use crate::{ChangeStreamHandle, ClientHandle, DatabaseHandle, DriverResult, SessionHandle};

/// Commands whose events are only captured with `observeSensitiveCommands`.
const SENSITIVE_COMMANDS: &[&str] = &[
    "authenticate",
    "saslStart",
    "saslContinue",
    "getnonce",
    "createUser",
    "updateUser",
    "copydbgetnonce",
    "copydbsaslstart",
    "copydb",
];

pub(crate) struct ClientInner {
    pub(crate) deployment: Arc<Deployment>,
    options: ClientOptions,
    /// The internal client observes nothing
    monitored: bool,
    events: Mutex<Vec<CommandEvent>>,
}

impl ClientInner {
    fn observes(&self, event: &CommandEvent) -> bool {
        let name = event.command_name();
        self.monitored
            && name != "configureFailPoint"
            && self.options.observe_events.iter().any(|e| e == event.event_type())
            && !self.options.ignore_command_monitoring_events.iter().any(|c| c == name)
            && (self.options.observe_sensitive_commands || !SENSITIVE_COMMANDS.contains(&name))
    }
}

/// A client of an in-memory deployment. Cheap to clone.
#[derive(Clone)]
pub struct MemoryClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl MemoryClient {
    pub(crate) fn new(deployment: Arc<Deployment>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                deployment,
                options,
                monitored: true,
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn internal(deployment: Arc<Deployment>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                deployment,
                options: ClientOptions::default(),
                monitored: false,
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn deployment(&self) -> &Arc<Deployment> {
        &self.inner.deployment
    }

    pub(crate) fn is_same_client(&self, other: &MemoryClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolve a session argument to a session of this client.
    pub(crate) fn session<'a>(
        &self,
        session: Option<&'a dyn SessionHandle>,
    ) -> DriverResult<Option<&'a MemorySession>> {
        let Some(session) = session else {
            return Ok(None);
        };
        let session = session
            .as_any()
            .downcast_ref::<MemorySession>()
            .ok_or_else(|| DriverError::client("session was not created by the in-memory driver"))?;
        if !self.is_same_client(session.memory_client()) {
            return Err(DriverError::client(
                "the session provided was not created by this client",
            ));
        }
        Ok(Some(session))
    }

    fn record(&self, event: CommandEvent) {
        if self.inner.observes(&event) {
            self.inner.events.lock().push(event);
        }
    }

    /// Run a command on behalf of an operation.
    ///
    /// Attaches session and transaction fields, then hands over to
    /// [`dispatch`](Self::dispatch). The first command of a transaction
    /// snapshots server state.
    pub(crate) fn execute<T>(
        &self,
        database: &str,
        mut command: Document,
        session: Option<&MemorySession>,
        op: impl FnOnce(&mut ServerState, &Document) -> DriverResult<(T, Document)>,
    ) -> DriverResult<T> {
        let phase = match session {
            Some(s) => s.prepare(&mut command)?,
            None => TxnPhase::None,
        };
        let address = session.and_then(|s| s.pinned_address());
        self.dispatch(database, command, session, address.as_deref(), |state, command| {
            if let (TxnPhase::First { txn_number }, Some(s)) = (phase, session) {
                state.begin_transaction(s.uuid(), txn_number);
            }
            op(state, command)
        })
    }

    /// Run a fully formed command: emit monitoring events, apply fail
    /// points, and run `op` under the server lock.
    pub(crate) fn dispatch<T>(
        &self,
        database: &str,
        mut command: Document,
        session: Option<&MemorySession>,
        address: Option<&str>,
        op: impl FnOnce(&mut ServerState, &Document) -> DriverResult<(T, Document)>,
    ) -> DriverResult<T> {
        let name = command.keys().next().cloned().unwrap_or_default();
        command.insert("$db", database);
        let address = address
            .unwrap_or_else(|| self.inner.deployment.config.primary())
            .to_string();
        let in_transaction = command.contains_key("autocommit");

        self.record(CommandEvent::Started {
            command_name: name.clone(),
            database_name: database.to_string(),
            command: command.clone(),
        });

        let outcome = {
            let mut state = self.inner.deployment.state.lock();
            match state.trigger_fail_point(&name, &address, in_transaction) {
                Some(error) => Err(error),
                None => op(&mut state, &command),
            }
        };

        match outcome {
            Ok((value, mut reply)) => {
                if !reply.contains_key("ok") {
                    reply.insert("ok", 1.0);
                }
                self.record(CommandEvent::Succeeded {
                    command_name: name,
                    database_name: database.to_string(),
                    reply,
                });
                Ok(value)
            }
            Err(error) => {
                debug!(target: "unified::memory", command = %name, %address, %error, "command failed");
                if error.is_network_error() {
                    if let Some(session) = session {
                        session.mark_dirty();
                    }
                }
                self.record(CommandEvent::Failed {
                    command_name: name,
                    database_name: database.to_string(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }
}

/// A cursor reply carrying every result in the first batch.
pub(crate) fn cursor_reply(ns: &str, batch: &[Document]) -> Document {
    let batch: Vec<Bson> = batch.iter().cloned().map(Bson::Document).collect();
    doc! { "cursor": { "id": 0_i64, "ns": ns, "firstBatch": batch } }
}

impl ClientHandle for MemoryClient {
    fn database(&self, name: &str, options: &DatabaseOptions) -> Arc<dyn DatabaseHandle> {
        Arc::new(MemoryDatabase::new(self.clone(), name, options.clone()))
    }

    fn start_session(&self, options: &SessionOptions) -> DriverResult<Arc<dyn SessionHandle>> {
        if options.snapshot == Some(true) && options.causal_consistency == Some(true) {
            return Err(DriverError::client(
                "causalConsistency and snapshot options are mutually exclusive",
            ));
        }
        Ok(Arc::new(MemorySession::new(self.clone(), options.clone())))
    }

    fn run_command(
        &self,
        database: &str,
        command: Document,
        address: Option<&str>,
    ) -> DriverResult<Document> {
        let config = &self.inner.deployment.config;
        self.dispatch(database, command, None, address, |state, command| {
            let reply = state.run_command(config, database, command, address)?;
            Ok((reply.clone(), reply))
        })
    }

    fn kill_all_sessions(&self, address: Option<&str>) -> DriverResult<()> {
        self.run_command("admin", doc! { "killAllSessions": [] }, address)
            .map(|_| ())
    }

    fn server_version(&self) -> DriverResult<ServerVersion> {
        Ok(self.inner.deployment.config.server_version)
    }

    fn topology(&self) -> TopologyKind {
        self.inner.deployment.config.topology
    }

    fn hosts(&self) -> Vec<String> {
        self.inner.deployment.config.hosts.clone()
    }

    fn auth_enabled(&self) -> bool {
        self.inner.deployment.config.auth_enabled
    }

    fn serverless(&self) -> bool {
        self.inner.deployment.config.serverless
    }

    fn list_databases(
        &self,
        filter: Option<Document>,
        options: &ListDatabasesOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Vec<Document>> {
        let session = self.session(session)?;
        let filter = filter.unwrap_or_default();
        let name_only = options.name_only.unwrap_or(false);
        let mut command = doc! { "listDatabases": 1 };
        if !filter.is_empty() {
            command.insert("filter", filter.clone());
        }
        if name_only {
            command.insert("nameOnly", true);
        }
        if let Some(authorized) = options.authorized_databases {
            command.insert("authorizedDatabases", authorized);
        }
        if let Some(comment) = &options.comment {
            command.insert("comment", comment.clone());
        }
        self.execute("admin", command, session, |state, _| {
            let mut databases = Vec::new();
            for spec in state.list_databases() {
                if query::matches(&spec, &filter)? {
                    databases.push(if name_only {
                        doc! { "name": spec.get("name").cloned().unwrap_or(Bson::Null) }
                    } else {
                        spec
                    });
                }
            }
            let listed: Vec<Bson> = databases.iter().cloned().map(Bson::Document).collect();
            Ok((databases, doc! { "databases": listed }))
        })
    }

    fn watch(
        &self,
        pipeline: Vec<Document>,
        options: &ChangeStreamOptions,
        session: Option<&dyn SessionHandle>,
    ) -> DriverResult<Arc<dyn ChangeStreamHandle>> {
        let session = self.session(session)?;
        change_stream::open(self, Scope::Cluster, pipeline, options, session)
    }

    fn observed_events(&self) -> Vec<CommandEvent> {
        self.inner.events.lock().clone()
    }
}
