//! Core types for the unified test runner
//!
//! This crate defines the foundational types shared by every other crate:
//! - Error: the runner's error taxonomy, plus `DriverError` for failures
//!   raised by the system under test
//! - SchemaVersion / ServerVersion: dotted version triples
//! - RunOnRequirement / Deployment: requirement gating
//! - EntityKind, TopologyKind, TransactionState: shared enums
//! - document helpers: numeric-aware equality, ordering, `$type` aliases

#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod requirement;
pub mod types;
pub mod version;

pub use error::{DriverError, DriverErrorKind, Error, Result};
pub use requirement::{any_satisfied, Deployment, RunOnRequirement, ServerlessRequirement, UnmetRequirement};
pub use types::{EntityKind, TopologyKind, TransactionState};
pub use version::{SchemaVersion, ServerVersion};

// Re-export the document model so downstream crates agree on one version
pub use bson;
pub use bson::{doc, Bson, Document};
