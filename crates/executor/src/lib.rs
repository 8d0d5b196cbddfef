//! # Unified Executor
//!
//! Decodes and runs the operations of unified-format tests.
//!
//! This crate provides:
//! - [`registry`]: every operation name mapped to its decoder and the argument
//!   keys it recognises
//! - [`Operation`]: the typed form of one operation
//! - [`UnifiedOperation`]: an operation plus its target object and expectation
//! - [`EntityMap`]: the named client/database/collection/session/bucket
//!   handles of one test
//! - [`Executor`]: dispatch against entities and expectation checking
//! - [`matcher`]: expected-vs-actual matching with the `$$` operators
//!
//! ## Quick Start
//!
//! ```text
//! use unified_executor::{EntityMap, ExecutionContext, Executor, UnifiedOperation};
//!
//! let entities = EntityMap::build(&driver, &file.create_entities)?;
//! let mut ctx = ExecutionContext::new(entities);
//! let executor = Executor::new(driver.internal_client());
//!
//! for raw in &test.operations {
//!     let op = UnifiedOperation::decode(raw)?;
//!     executor.execute(&mut ctx, &op)?;
//! }
//! ctx.teardown();
//! ```
//!
//! ## Error Handling
//!
//! Decoding never guesses: an unknown operation name, an argument key the
//! operation does not recognise, or an ambiguous bulk write request is an
//! error in the test file, not a skipped field.

#![warn(clippy::all)]

pub mod entity;
pub mod events;
mod executor;
mod handlers;
pub mod matcher;
pub mod operation;
mod output;
pub mod registry;
pub mod unified;

// Test modules
#[cfg(test)]
mod tests;

// =============================================================================
// Public API
// =============================================================================

pub use entity::{Entity, EntityDescription, EntityMap};
pub use events::ExpectedEventsForClient;
pub use executor::{ExecutionContext, Executor};
pub use operation::Operation;
pub use output::Output;
pub use unified::{Expectation, ExpectedError, ObjectRef, RawOperation, UnifiedOperation};

pub use unified_core::{Error, Result};
