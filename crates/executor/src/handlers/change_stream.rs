//! Change stream operation handlers.

use unified_core::EntityKind;
use unified_driver::ChangeStreamHandle;

use super::{finish, unsupported, Outcome};
use crate::operation::Operation;
use crate::output::Output;

/// Run an operation against a saved change stream.
pub fn execute(stream: &dyn ChangeStreamHandle, op: Operation) -> Outcome {
    match op {
        Operation::IterateUntilDocumentOrError => iterate_until_document_or_error(stream),
        other => Err(unsupported(&other, EntityKind::ChangeStream)),
    }
}

/// Handle iterateUntilDocumentOrError operation.
pub fn iterate_until_document_or_error(stream: &dyn ChangeStreamHandle) -> Outcome {
    finish(stream.next_document(), |event| Ok(Output::Value(event.into())))
}
