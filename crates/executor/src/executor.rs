//! The Executor - runs decoded operations and checks their expectations.
//!
//! The Executor is stateless: everything a test accumulates (entities, armed
//! fail points) lives in the [`ExecutionContext`] the caller passes in.

use std::sync::Arc;

use bson::{doc, Bson};
use tracing::{debug, warn};
use unified_core::{DriverError, Error, Result};
use unified_driver::ClientHandle;

use crate::entity::{Entity, EntityMap};
use crate::handlers::{self, unsupported, Outcome};
use crate::matcher;
use crate::operation::Operation;
use crate::output::Output;
use crate::unified::{ExpectedError, Expectation, ObjectRef, UnifiedOperation};

/// A fail point configured during a test, disabled at teardown.
struct ArmedFailPoint {
    client: Arc<dyn ClientHandle>,
    name: String,
    address: Option<String>,
}

/// Per-test state operations run against.
pub struct ExecutionContext {
    pub entities: EntityMap,
    fail_points: Vec<ArmedFailPoint>,
}

impl ExecutionContext {
    pub fn new(entities: EntityMap) -> Self {
        Self {
            entities,
            fail_points: Vec::new(),
        }
    }

    pub(crate) fn register_fail_point(&mut self, client: Arc<dyn ClientHandle>, name: String, address: Option<String>) {
        self.fail_points.push(ArmedFailPoint { client, name, address });
    }

    /// Number of fail points not yet disabled.
    pub fn armed_fail_points(&self) -> usize {
        self.fail_points.len()
    }

    /// Turn off every fail point configured so far. Errors are logged.
    pub fn disable_fail_points(&mut self) {
        for fail_point in self.fail_points.drain(..) {
            let command = doc! { "configureFailPoint": fail_point.name.as_str(), "mode": "off" };
            if let Err(e) = fail_point
                .client
                .run_command("admin", command, fail_point.address.as_deref())
            {
                warn!(
                    target: "unified::executor",
                    name = fail_point.name.as_str(),
                    error = %e,
                    "failed to disable fail point"
                );
            }
        }
    }

    /// Disable fail points and end every session.
    pub fn teardown(&mut self) {
        self.disable_fail_points();
        self.entities.close();
    }
}

/// Runs operations against a test's entities.
///
/// Holds only the privileged internal client, used by collection and index
/// assertions.
///
/// # Example
///
/// ```ignore
/// let executor = Executor::new(driver.internal_client());
/// let mut ctx = ExecutionContext::new(EntityMap::build(&driver, &descriptions)?);
/// for raw in &test.operations {
///     executor.execute(&mut ctx, &UnifiedOperation::decode(raw)?)?;
/// }
/// ctx.teardown();
/// ```
pub struct Executor {
    internal: Arc<dyn ClientHandle>,
}

impl Executor {
    pub fn new(internal: Arc<dyn ClientHandle>) -> Self {
        Self { internal }
    }

    /// Run one operation and check it against its expectation.
    pub fn execute(&self, ctx: &mut ExecutionContext, op: &UnifiedOperation) -> Result<()> {
        debug!(target: "unified::executor", operation = op.name.as_str(), object = %op.object, "running operation");
        let outcome = self.dispatch(ctx, &op.object, op.operation.clone())?;

        match (&op.expectation, outcome) {
            (Expectation::Ignore, _) => Ok(()),
            (Expectation::Error(_), Ok(_)) => Err(Error::ExpectedErrorNotRaised {
                operation: op.name.clone(),
            }),
            (Expectation::Error(expected), Err(actual)) => check_error(&op.name, expected, actual, &ctx.entities),
            (_, Err(error)) => Err(Error::UnexpectedError {
                operation: op.name.clone(),
                error,
            }),
            (Expectation::None, Ok(_)) => Ok(()),
            (Expectation::Result { result, save_as }, Ok(output)) => {
                if let Some(expected) = result {
                    check_result(&op.name, expected, &output, &ctx.entities)?;
                }
                if let Some(id) = save_as {
                    let entity = output.into_entity().ok_or_else(|| Error::InvalidEntityResult {
                        operation: op.name.clone(),
                        id: id.clone(),
                    })?;
                    ctx.entities.store(id, entity)?;
                }
                Ok(())
            }
        }
    }

    fn dispatch(&self, ctx: &mut ExecutionContext, object: &ObjectRef, operation: Operation) -> Outcome {
        let id = match object {
            ObjectRef::TestRunner => {
                return handlers::test_runner::execute(ctx, self.internal.as_ref(), operation);
            }
            ObjectRef::Entity(id) => id,
        };
        if operation.is_test_runner_operation() {
            return Err(unsupported(&operation, ctx.entities.entity(id)?.kind()));
        }
        let entities = &ctx.entities;
        match entities.entity(id)?.clone() {
            Entity::Collection(coll) => handlers::collection::execute(coll.as_ref(), entities, operation),
            Entity::Database(db) => handlers::database::execute(db.as_ref(), entities, operation),
            Entity::Client(client) => handlers::client::execute(client.as_ref(), entities, operation),
            Entity::Session(session) => handlers::session::execute(session.as_ref(), operation),
            Entity::ChangeStream(stream) => handlers::change_stream::execute(stream.as_ref(), operation),
            other => Err(unsupported(&operation, other.kind())),
        }
    }
}

fn check_result(operation: &str, expected: &Bson, output: &Output, entities: &EntityMap) -> Result<()> {
    let Some(actual) = output.to_bson() else {
        return Err(Error::ResultMismatch {
            operation: operation.to_string(),
            path: "$".to_string(),
            reason: "operation produced no result".to_string(),
        });
    };
    matcher::match_root(expected, &actual, entities).map_err(|m| Error::ResultMismatch {
        operation: operation.to_string(),
        path: m.path,
        reason: m.reason,
    })
}

/// Check a raised error against every property of the expected error.
fn check_error(operation: &str, expected: &ExpectedError, actual: DriverError, entities: &EntityMap) -> Result<()> {
    let fail = |reason: String, actual: &DriverError| Error::ErrorMismatch {
        operation: operation.to_string(),
        reason,
        actual: actual.clone(),
    };

    if let Some(client) = expected.is_client_error {
        let is_client = actual.is_client_error() || actual.is_network_error();
        if is_client != client {
            let reason = if client {
                "expected a client error".to_string()
            } else {
                "expected a server error".to_string()
            };
            return Err(fail(reason, &actual));
        }
    }
    if let Some(substring) = &expected.error_contains {
        if !actual.message.to_lowercase().contains(&substring.to_lowercase()) {
            return Err(fail(format!("message does not contain '{}'", substring), &actual));
        }
    }
    if let Some(code) = expected.error_code {
        if actual.code() != Some(code) {
            return Err(fail(format!("expected error code {}", code), &actual));
        }
    }
    if let Some(name) = &expected.error_code_name {
        let matches = actual
            .code_name()
            .map_or(false, |actual| actual.eq_ignore_ascii_case(name));
        if !matches {
            return Err(fail(format!("expected error code name {}", name), &actual));
        }
    }
    for label in expected.error_labels_contain.iter().flatten() {
        if !actual.has_label(label) {
            return Err(fail(format!("missing error label {}", label), &actual));
        }
    }
    for label in expected.error_labels_omit.iter().flatten() {
        if actual.has_label(label) {
            return Err(fail(format!("unexpected error label {}", label), &actual));
        }
    }
    if let Some(expected_result) = &expected.expect_result {
        let Some(partial) = &actual.partial_result else {
            return Err(fail("error carries no partial result".to_string(), &actual));
        };
        if let Err(m) = matcher::match_root(expected_result, partial, entities) {
            return Err(fail(format!("partial result mismatch at {}", m), &actual));
        }
    }
    Ok(())
}
