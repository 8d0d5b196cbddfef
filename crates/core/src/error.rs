//! Error types for the unified test runner
//!
//! Everything that can go wrong while loading or running a test file is an
//! [`Error`]. Variants fall into three groups:
//!
//! | Group | Effect | Examples |
//! |-------|--------|----------|
//! | Spec errors | abort the current file | `UnknownOperation`, `UnrecognizedArgument`, `DuplicateEntityId` |
//! | Test failures | fail the current test only | `ExpectedErrorNotRaised`, `ResultMismatch` |
//! | Infrastructure | abort the current file | `Driver`, `Io`, `Config` |
//!
//! Errors raised by the driver while an operation runs are not `Error`s until
//! they are compared against the operation's expectation; they travel as
//! [`DriverError`].

use std::fmt;
use std::io;

use bson::Bson;
use thiserror::Error;

use crate::types::EntityKind;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while loading, decoding or running unified tests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // ==================== Decoding ====================
    /// Operation name has no registry entry
    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },

    /// Argument key not recognized by the operation
    #[error("unrecognized argument '{key}' for operation {operation}")]
    UnrecognizedArgument { operation: String, key: String },

    /// Argument key not supported by a bulk write model
    #[error("unsupported argument for bulkWrite {operation}: {key}")]
    UnsupportedArgument { operation: String, key: String },

    /// More than one write model key in a single bulk write request
    #[error("ambiguous write model, found keys: {}", .keys.join(", "))]
    AmbiguousWriteModel { keys: Vec<String> },

    /// No write model key in a bulk write request
    #[error("no write model matched the bulk write request")]
    NoWriteModelMatched,

    /// Legacy bulk write request names an unknown model
    #[error("unknown write model: {name}")]
    UnknownWriteModel { name: String },

    /// Arguments failed structural decoding
    #[error("invalid arguments for operation {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    /// More than one kind of expectation on one operation
    #[error("operation {operation} declares more than one of expectError, expectResult/saveResultAsEntity, ignoreResultAndError")]
    ConflictingExpectations { operation: String },

    /// Schema version string could not be parsed
    #[error("invalid schema version: {raw}")]
    InvalidSchemaVersion { raw: String },

    /// Schema version outside the supported range
    #[error("test file \"{file}\" has unsupported schema version {version}")]
    UnsupportedSchemaVersion { file: String, version: String },

    /// Test file is malformed
    #[error("invalid test file: {reason}")]
    InvalidTestFile { reason: String },

    // ==================== Entities ====================
    /// Parent entity not yet constructed
    #[error("unresolved parent entity: {id}")]
    UnresolvedParent { id: String },

    /// Entity id already in use
    #[error("duplicate entity id: {id}")]
    DuplicateEntityId { id: String },

    /// Entity id not in the map
    #[error("unknown entity: {id}")]
    UnknownEntity { id: String },

    /// Entity exists but has the wrong kind
    #[error("entity {id} is a {actual}, expected a {expected}")]
    WrongEntityKind {
        id: String,
        expected: EntityKind,
        actual: EntityKind,
    },

    /// Operation cannot run against this kind of object
    #[error("operation {operation} is not supported on a {target}")]
    UnsupportedTarget { operation: String, target: String },

    /// Operation result cannot be stored as an entity
    #[error("result of operation {operation} cannot be saved as entity {id}")]
    InvalidEntityResult { operation: String, id: String },

    // ==================== Test failures ====================
    /// An error was expected but the operation succeeded
    #[error("{operation}: expected error, got success")]
    ExpectedErrorNotRaised { operation: String },

    /// The operation failed without declaring an expected error
    #[error("{operation}: unexpected error: {error}")]
    UnexpectedError {
        operation: String,
        error: DriverError,
    },

    /// The raised error does not satisfy the expected error
    #[error("{operation}: error mismatch: {reason} (actual error: {actual})")]
    ErrorMismatch {
        operation: String,
        reason: String,
        actual: DriverError,
    },

    /// The operation result does not match the expected result
    #[error("{operation}: result mismatch at {path}: {reason}")]
    ResultMismatch {
        operation: String,
        path: String,
        reason: String,
    },

    /// Observed command events do not match the expected events
    #[error("events for client {client} do not match: {reason}")]
    EventMismatch { client: String, reason: String },

    /// Final collection contents do not match the declared outcome
    #[error("outcome mismatch for {namespace}: {reason}")]
    OutcomeMismatch { namespace: String, reason: String },

    /// A test-runner assertion operation failed
    #[error("assertion failed: {reason}")]
    AssertionFailed { reason: String },

    // ==================== Infrastructure ====================
    /// Driver error outside of an operation under test
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Serialization error
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// I/O error
    #[error("I/O error: {reason}")]
    Io { reason: String },

    /// Configuration error
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl Error {
    /// Whether this error fails a single test rather than the whole file.
    pub fn is_test_failure(&self) -> bool {
        matches!(
            self,
            Error::ExpectedErrorNotRaised { .. }
                | Error::UnexpectedError { .. }
                | Error::ErrorMismatch { .. }
                | Error::ResultMismatch { .. }
                | Error::EventMismatch { .. }
                | Error::OutcomeMismatch { .. }
                | Error::AssertionFailed { .. }
        )
    }

    /// Shorthand for [`Error::InvalidTestFile`].
    pub fn invalid_test_file(reason: impl Into<String>) -> Self {
        Error::InvalidTestFile {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::AssertionFailed`].
    pub fn assertion(reason: impl Into<String>) -> Self {
        Error::AssertionFailed {
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io {
            reason: e.to_string(),
        }
    }
}

impl From<bson::ser::Error> for Error {
    fn from(e: bson::ser::Error) -> Self {
        Error::Serialization {
            reason: e.to_string(),
        }
    }
}

// =============================================================================
// DriverError
// =============================================================================

/// Where a driver error originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Raised by the driver itself (validation, unsupported feature)
    Client,
    /// Connection-level failure
    Network,
    /// Server-generated error response
    Server { code: i32, code_name: String },
}

/// An error raised by the driver while executing an operation.
///
/// Carries everything an expected-error assertion can inspect: origin,
/// message, server code and code name, error labels, and the partial result
/// of operations that can fail after partially succeeding.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    pub labels: Vec<String>,
    pub partial_result: Option<Bson>,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DriverErrorKind::Client => write!(f, "client error: {}", self.message)?,
            DriverErrorKind::Network => write!(f, "network error: {}", self.message)?,
            DriverErrorKind::Server { code, code_name } => {
                write!(f, "server error {} ({}): {}", code, code_name, self.message)?
            }
        }
        if !self.labels.is_empty() {
            write!(f, " [labels: {}]", self.labels.join(", "))?;
        }
        Ok(())
    }
}

impl DriverError {
    /// A client-side error.
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Client,
            message: message.into(),
            labels: Vec::new(),
            partial_result: None,
        }
    }

    /// A network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Network,
            message: message.into(),
            labels: Vec::new(),
            partial_result: None,
        }
    }

    /// A server error with the given code and code name.
    pub fn server(code: i32, code_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Server {
                code,
                code_name: code_name.into(),
            },
            message: message.into(),
            labels: Vec::new(),
            partial_result: None,
        }
    }

    /// Attach error labels.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Attach a partial result.
    pub fn with_partial_result(mut self, result: Bson) -> Self {
        self.partial_result = Some(result);
        self
    }

    /// Whether the error did not come from a server response.
    pub fn is_client_error(&self) -> bool {
        !matches!(self.kind, DriverErrorKind::Server { .. })
    }

    /// Whether the error is a network error.
    pub fn is_network_error(&self) -> bool {
        matches!(self.kind, DriverErrorKind::Network)
    }

    /// Server error code, if any.
    pub fn code(&self) -> Option<i32> {
        match &self.kind {
            DriverErrorKind::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Server error code name, if any.
    pub fn code_name(&self) -> Option<&str> {
        match &self.kind {
            DriverErrorKind::Server { code_name, .. } => Some(code_name),
            _ => None,
        }
    }

    /// Whether the error carries the given label.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_classified() {
        let err = Error::ExpectedErrorNotRaised {
            operation: "insertOne".to_string(),
        };
        assert!(err.is_test_failure());
        assert!(err.to_string().contains("expected error, got success"));

        let err = Error::UnknownOperation {
            name: "frobnicate".to_string(),
        };
        assert!(!err.is_test_failure());
    }

    #[test]
    fn test_wrong_entity_kind_display() {
        let err = Error::WrongEntityKind {
            id: "session0".to_string(),
            expected: EntityKind::Collection,
            actual: EntityKind::Session,
        };
        let msg = err.to_string();
        assert!(msg.contains("session0"));
        assert!(msg.contains("collection"));
        assert!(msg.contains("session"));
    }

    #[test]
    fn test_driver_error_origin() {
        let err = DriverError::server(11000, "DuplicateKey", "E11000 duplicate key error");
        assert!(!err.is_client_error());
        assert_eq!(err.code(), Some(11000));
        assert_eq!(err.code_name(), Some("DuplicateKey"));

        let err = DriverError::network("connection closed");
        assert!(err.is_client_error());
        assert!(err.is_network_error());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_driver_error_labels() {
        let err = DriverError::server(112, "WriteConflict", "write conflict")
            .with_labels(vec!["TransientTransactionError".to_string()]);
        assert!(err.has_label("TransientTransactionError"));
        assert!(!err.has_label("RetryableWriteError"));
        assert!(err.to_string().contains("TransientTransactionError"));
    }
}
