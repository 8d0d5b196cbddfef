//! Logical sessions and the client side of transactions.

use std::any::Any;
use std::sync::Arc;

use bson::spec::BinarySubtype;
use bson::{doc, Binary, Document};
use parking_lot::Mutex;
use tracing::debug;
use unified_core::{DriverError, TopologyKind, TransactionState};
use uuid::Uuid;

use super::client::MemoryClient;
use crate::options::{SessionOptions, TransactionOptions};
use crate::{ClientHandle, DriverResult, SessionHandle};

/// Where a command stands relative to the session's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxnPhase {
    None,
    First { txn_number: i64 },
    Continue,
}

#[derive(Debug, Default)]
struct SessionState {
    transaction: TransactionState,
    txn_number: i64,
    transaction_options: TransactionOptions,
    pinned: Option<String>,
    dirty: bool,
    ended: bool,
}

/// A session of a [`MemoryClient`].
pub struct MemorySession {
    client: MemoryClient,
    id: Uuid,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

impl MemorySession {
    pub(crate) fn new(client: MemoryClient, options: SessionOptions) -> Self {
        Self {
            client,
            id: Uuid::new_v4(),
            options,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub(crate) fn uuid(&self) -> Uuid {
        self.id
    }

    pub(crate) fn memory_client(&self) -> &MemoryClient {
        &self.client
    }

    pub(crate) fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    fn pins_to_mongos(&self) -> bool {
        matches!(
            self.client.deployment().config.topology,
            TopologyKind::Sharded | TopologyKind::LoadBalanced
        )
    }

    /// Attach `lsid` and transaction fields to an outgoing command and
    /// advance the transaction state.
    pub(crate) fn prepare(&self, command: &mut Document) -> DriverResult<TxnPhase> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(DriverError::client("Cannot use a session that has ended"));
        }
        command.insert("lsid", self.lsid());
        match state.transaction {
            TransactionState::Starting => {
                state.transaction = TransactionState::InProgress;
                command.insert("txnNumber", state.txn_number);
                command.insert("startTransaction", true);
                command.insert("autocommit", false);
                if let Some(read_concern) = &state.transaction_options.read_concern {
                    command.insert("readConcern", read_concern.clone());
                }
                if self.pins_to_mongos() {
                    state.pinned = Some(self.client.deployment().config.primary().to_string());
                }
                Ok(TxnPhase::First {
                    txn_number: state.txn_number,
                })
            }
            TransactionState::InProgress => {
                command.insert("txnNumber", state.txn_number);
                command.insert("autocommit", false);
                Ok(TxnPhase::Continue)
            }
            _ => {
                state.pinned = None;
                Ok(TxnPhase::None)
            }
        }
    }

    /// Send `commitTransaction` or `abortTransaction`.
    fn end_transaction(&self, command_name: &str, txn_number: i64, retry: bool) -> DriverResult<()> {
        let mut command = doc! {
            command_name: 1,
            "lsid": self.lsid(),
            "txnNumber": txn_number,
            "autocommit": false,
        };
        let write_concern = self.state.lock().transaction_options.write_concern.clone();
        match write_concern {
            Some(write_concern) => {
                command.insert("writeConcern", write_concern);
            }
            None if retry => {
                command.insert("writeConcern", doc! { "w": "majority", "wtimeout": 10000 });
            }
            None => {}
        }
        let address = self.pinned_address();
        let id = self.id;
        let commit = command_name == "commitTransaction";
        self.client
            .dispatch("admin", command, Some(self), address.as_deref(), |state, _| {
                if commit {
                    state.commit_transaction(&id, txn_number, retry)?;
                } else {
                    state.abort_transaction(&id, txn_number)?;
                }
                Ok(((), Document::new()))
            })
    }
}

impl SessionHandle for MemorySession {
    fn lsid(&self) -> Document {
        doc! {
            "id": Binary {
                subtype: BinarySubtype::Uuid,
                bytes: self.id.as_bytes().to_vec(),
            }
        }
    }

    fn client(&self) -> Arc<dyn ClientHandle> {
        Arc::new(self.client.clone())
    }

    fn start_transaction(&self, options: &TransactionOptions) -> DriverResult<()> {
        if self.client.deployment().config.topology == TopologyKind::Single {
            return Err(DriverError::client(
                "Transactions are not supported by standalone deployments",
            ));
        }
        let mut state = self.state.lock();
        if state.ended {
            return Err(DriverError::client("Cannot use a session that has ended"));
        }
        if matches!(
            state.transaction,
            TransactionState::Starting | TransactionState::InProgress
        ) {
            return Err(DriverError::client("Transaction already in progress"));
        }
        let defaults = self.options.default_transaction_options.clone().unwrap_or_default();
        state.transaction_options = TransactionOptions {
            max_commit_time_ms: options.max_commit_time_ms.or(defaults.max_commit_time_ms),
            read_concern: options.read_concern.clone().or(defaults.read_concern),
            read_preference: options.read_preference.clone().or(defaults.read_preference),
            write_concern: options.write_concern.clone().or(defaults.write_concern),
        };
        state.txn_number += 1;
        state.transaction = TransactionState::Starting;
        state.pinned = None;
        Ok(())
    }

    fn commit_transaction(&self) -> DriverResult<()> {
        let (txn_number, retry) = {
            let mut state = self.state.lock();
            match state.transaction {
                TransactionState::None => {
                    return Err(DriverError::client("No transaction started"));
                }
                TransactionState::Aborted => {
                    return Err(DriverError::client(
                        "Cannot call commitTransaction after calling abortTransaction",
                    ));
                }
                TransactionState::Starting => {
                    state.transaction = TransactionState::Committed;
                    return Ok(());
                }
                TransactionState::InProgress => (state.txn_number, false),
                TransactionState::Committed => (state.txn_number, true),
            }
        };
        self.end_transaction("commitTransaction", txn_number, retry)?;
        self.state.lock().transaction = TransactionState::Committed;
        Ok(())
    }

    fn abort_transaction(&self) -> DriverResult<()> {
        let txn_number = {
            let mut state = self.state.lock();
            match state.transaction {
                TransactionState::None => {
                    return Err(DriverError::client("No transaction started"));
                }
                TransactionState::Committed => {
                    return Err(DriverError::client(
                        "Cannot call abortTransaction after calling commitTransaction",
                    ));
                }
                TransactionState::Aborted => {
                    return Err(DriverError::client("Cannot call abortTransaction twice"));
                }
                TransactionState::Starting => {
                    state.transaction = TransactionState::Aborted;
                    return Ok(());
                }
                TransactionState::InProgress => state.txn_number,
            }
        };
        // Errors from abortTransaction are swallowed
        if let Err(error) = self.end_transaction("abortTransaction", txn_number, false) {
            debug!(target: "unified::memory", %error, "ignoring abortTransaction failure");
        }
        let mut state = self.state.lock();
        state.transaction = TransactionState::Aborted;
        state.pinned = None;
        Ok(())
    }

    fn end(&self) {
        let in_progress = {
            let state = self.state.lock();
            !state.ended && state.transaction == TransactionState::InProgress
        };
        if in_progress {
            let _ = self.abort_transaction();
        }
        let mut state = self.state.lock();
        state.ended = true;
        state.pinned = None;
    }

    fn transaction_state(&self) -> TransactionState {
        self.state.lock().transaction
    }

    fn pinned_address(&self) -> Option<String> {
        self.state.lock().pinned.clone()
    }

    fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
