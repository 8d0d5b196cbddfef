//! Handlers for operations run by the runner itself (`object: testRunner`).
//!
//! Assertions that do not hold fail with [`Error::AssertionFailed`]. Driver
//! errors raised while configuring fail points or listing collections are
//! reported like any other operation's driver error.

use std::sync::Arc;

use bson::{Bson, Document};
use unified_core::{DriverErrorKind, Error, TransactionState};
use unified_driver::{
    ClientHandle, CollectionOptions, CommandEvent, DatabaseOptions, DriverResult, SessionHandle,
};

use super::{unsupported, Outcome};
use crate::entity::EntityMap;
use crate::executor::ExecutionContext;
use crate::operation::Operation;
use crate::output::Output;
use crate::unified::TEST_RUNNER;

/// Server error code for a missing namespace.
const NAMESPACE_NOT_FOUND: i32 = 26;

/// Run a test-runner operation.
pub fn execute(ctx: &mut ExecutionContext, internal: &dyn ClientHandle, op: Operation) -> Outcome {
    match op {
        Operation::FailPoint { fail_point, client } => {
            let client = ctx.entities.client(&client)?;
            configure_fail_point(ctx, client, fail_point, None)
        }
        Operation::TargetedFailPoint { fail_point, session } => {
            targeted_fail_point(ctx, fail_point, &session)
        }
        Operation::AssertSessionTransactionState { session, state } => {
            assert_session_transaction_state(&ctx.entities, &session, state)
        }
        Operation::AssertSessionPinned { session } => assert_session_pinned(&ctx.entities, &session, true),
        Operation::AssertSessionUnpinned { session } => {
            assert_session_pinned(&ctx.entities, &session, false)
        }
        Operation::AssertSessionDirty { session } => assert_session_dirty(&ctx.entities, &session, true),
        Operation::AssertSessionNotDirty { session } => {
            assert_session_dirty(&ctx.entities, &session, false)
        }
        Operation::AssertSameLsidOnLastTwoCommands { client } => {
            assert_lsid_on_last_two_commands(&ctx.entities, &client, true)
        }
        Operation::AssertDifferentLsidOnLastTwoCommands { client } => {
            assert_lsid_on_last_two_commands(&ctx.entities, &client, false)
        }
        Operation::AssertCollectionExists {
            database_name,
            collection_name,
        } => assert_collection_exists(internal, &database_name, &collection_name, true),
        Operation::AssertCollectionNotExists {
            database_name,
            collection_name,
        } => assert_collection_exists(internal, &database_name, &collection_name, false),
        Operation::AssertIndexExists {
            database_name,
            collection_name,
            index_name,
        } => assert_index_exists(internal, &database_name, &collection_name, &index_name, true),
        Operation::AssertIndexNotExists {
            database_name,
            collection_name,
            index_name,
        } => assert_index_exists(internal, &database_name, &collection_name, &index_name, false),
        other => Err(unsupported(&other, TEST_RUNNER)),
    }
}

fn check(holds: bool, reason: impl FnOnce() -> String) -> Outcome {
    if holds {
        Ok(Ok(Output::Unit))
    } else {
        Err(Error::assertion(reason()))
    }
}

fn session(entities: &EntityMap, id: &str) -> crate::Result<Arc<dyn SessionHandle>> {
    entities.session(id)
}

// =============================================================================
// Fail points
// =============================================================================

fn configure_fail_point(
    ctx: &mut ExecutionContext,
    client: Arc<dyn ClientHandle>,
    fail_point: Document,
    address: Option<String>,
) -> Outcome {
    let name = fail_point
        .get_str("configureFailPoint")
        .map_err(|_| Error::InvalidArguments {
            operation: "failPoint".to_string(),
            reason: "failPoint must name the fail point in 'configureFailPoint'".to_string(),
        })?
        .to_string();
    if let Err(e) = client.run_command("admin", fail_point, address.as_deref()) {
        return Ok(Err(e));
    }
    ctx.register_fail_point(client, name, address);
    Ok(Ok(Output::Unit))
}

/// Handle targetedFailPoint operation.
pub fn targeted_fail_point(ctx: &mut ExecutionContext, fail_point: Document, session_id: &str) -> Outcome {
    let session = session(&ctx.entities, session_id)?;
    let address = session.pinned_address().ok_or_else(|| {
        Error::assertion(format!("session {} is not pinned to a server", session_id))
    })?;
    configure_fail_point(ctx, session.client(), fail_point, Some(address))
}

// =============================================================================
// Session assertions
// =============================================================================

/// Handle assertSessionTransactionState operation.
pub fn assert_session_transaction_state(entities: &EntityMap, id: &str, expected: TransactionState) -> Outcome {
    let actual = session(entities, id)?.transaction_state();
    check(actual == expected, || {
        format!("session {} is in transaction state {}, expected {}", id, actual, expected)
    })
}

/// Handle assertSessionPinned and assertSessionUnpinned operations.
pub fn assert_session_pinned(entities: &EntityMap, id: &str, pinned: bool) -> Outcome {
    let address = session(entities, id)?.pinned_address();
    check(address.is_some() == pinned, || match address {
        Some(address) => format!("session {} is pinned to {}", id, address),
        None => format!("session {} is not pinned", id),
    })
}

/// Handle assertSessionDirty and assertSessionNotDirty operations.
pub fn assert_session_dirty(entities: &EntityMap, id: &str, dirty: bool) -> Outcome {
    let actual = session(entities, id)?.is_dirty();
    check(actual == dirty, || {
        if actual {
            format!("session {} is dirty", id)
        } else {
            format!("session {} is not dirty", id)
        }
    })
}

/// Handle assertSameLsidOnLastTwoCommands and
/// assertDifferentLsidOnLastTwoCommands operations.
pub fn assert_lsid_on_last_two_commands(entities: &EntityMap, client_id: &str, same: bool) -> Outcome {
    let events = entities.client(client_id)?.observed_events();
    let lsids: Vec<Option<&Bson>> = events
        .iter()
        .filter_map(|event| match event {
            CommandEvent::Started { command, .. } => Some(command.get("lsid")),
            _ => None,
        })
        .collect();
    let [.., first, second] = lsids.as_slice() else {
        return Err(Error::assertion(format!(
            "client {} observed fewer than two commandStartedEvents",
            client_id
        )));
    };
    let (Some(first), Some(second)) = (first, second) else {
        return Err(Error::assertion(format!(
            "one of the last two commands of client {} has no lsid",
            client_id
        )));
    };
    check((first == second) == same, || {
        if same {
            format!("lsids differ: {} and {}", first, second)
        } else {
            format!("both commands used lsid {}", first)
        }
    })
}

// =============================================================================
// Collection and index assertions
// =============================================================================

/// Handle assertCollectionExists and assertCollectionNotExists operations.
pub fn assert_collection_exists(
    internal: &dyn ClientHandle,
    database: &str,
    collection: &str,
    exists: bool,
) -> Outcome {
    let names = match internal
        .database(database, &DatabaseOptions::default())
        .list_collection_names(None, None)
    {
        Ok(names) => names,
        Err(e) => return Ok(Err(e)),
    };
    let found = names.iter().any(|name| name == collection);
    check(found == exists, || {
        if found {
            format!("collection {}.{} exists", database, collection)
        } else {
            format!("collection {}.{} does not exist", database, collection)
        }
    })
}

fn index_names(internal: &dyn ClientHandle, database: &str, collection: &str) -> DriverResult<Vec<String>> {
    let result = internal
        .database(database, &DatabaseOptions::default())
        .collection(collection, &CollectionOptions::default())
        .list_index_names(None);
    match result {
        Err(e) if matches!(e.kind, DriverErrorKind::Server { code: NAMESPACE_NOT_FOUND, .. }) => Ok(Vec::new()),
        other => other,
    }
}

/// Handle assertIndexExists and assertIndexNotExists operations.
pub fn assert_index_exists(
    internal: &dyn ClientHandle,
    database: &str,
    collection: &str,
    index: &str,
    exists: bool,
) -> Outcome {
    let names = match index_names(internal, database, collection) {
        Ok(names) => names,
        Err(e) => return Ok(Err(e)),
    };
    let found = names.iter().any(|name| name == index);
    check(found == exists, || {
        if found {
            format!("index {} exists on {}.{}", index, database, collection)
        } else {
            format!("index {} does not exist on {}.{}", index, database, collection)
        }
    })
}
