//! Session operation handlers.

use unified_core::EntityKind;
use unified_driver::{SessionHandle, TransactionOptions};

use super::{finish, unsupported, Outcome};
use crate::operation::Operation;
use crate::output::Output;

/// Run an operation against a session entity.
pub fn execute(session: &dyn SessionHandle, op: Operation) -> Outcome {
    match op {
        Operation::StartTransaction { options } => start_transaction(session, options),
        Operation::CommitTransaction => commit_transaction(session),
        Operation::AbortTransaction => abort_transaction(session),
        Operation::EndSession => end_session(session),
        other => Err(unsupported(&other, EntityKind::Session)),
    }
}

/// Handle startTransaction operation.
pub fn start_transaction(session: &dyn SessionHandle, options: TransactionOptions) -> Outcome {
    finish(session.start_transaction(&options), |()| Ok(Output::Unit))
}

/// Handle commitTransaction operation.
pub fn commit_transaction(session: &dyn SessionHandle) -> Outcome {
    finish(session.commit_transaction(), |()| Ok(Output::Unit))
}

/// Handle abortTransaction operation.
pub fn abort_transaction(session: &dyn SessionHandle) -> Outcome {
    finish(session.abort_transaction(), |()| Ok(Output::Unit))
}

/// Handle endSession operation.
pub fn end_session(session: &dyn SessionHandle) -> Outcome {
    session.end();
    Ok(Ok(Output::Unit))
}
