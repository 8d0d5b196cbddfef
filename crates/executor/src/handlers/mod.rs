//! Operation handlers organized by target entity.
//!
//! | Module | Target | Operations |
//! |--------|--------|-----------|
//! | `collection` | collection | 22 |
//! | `database` | database | 7 |
//! | `client` | client | 2 |
//! | `session` | session | 4 |
//! | `change_stream` | saved change stream | 1 |
//! | `test_runner` | `testRunner` | 13 |
//!
//! Every handler returns an [`Outcome`]: the outer `Result` carries errors in
//! the test itself (unknown entities, unsupported targets), the inner
//! [`DriverResult`] what the driver did.

use unified_core::{Error, Result};
use unified_driver::DriverResult;

use crate::operation::Operation;
use crate::output::Output;

pub mod change_stream;
pub mod client;
pub mod collection;
pub mod database;
pub mod session;
pub mod test_runner;

/// Result of running one operation.
pub type Outcome = Result<DriverResult<Output>>;

/// Convert a successful driver result into an output.
pub(crate) fn finish<T>(result: DriverResult<T>, convert: impl FnOnce(T) -> Result<Output>) -> Outcome {
    match result {
        Ok(value) => convert(value).map(Ok),
        Err(e) => Ok(Err(e)),
    }
}

/// The operation cannot run against `target`.
pub(crate) fn unsupported(operation: &Operation, target: impl ToString) -> Error {
    Error::UnsupportedTarget {
        operation: operation.name().to_string(),
        target: target.to_string(),
    }
}
