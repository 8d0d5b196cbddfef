//! Unified test runner - interpreter for data-driven driver tests
//!
//! Unified-format test files describe operations against named entities
//! (clients, databases, collections, sessions, buckets) together with the
//! results, errors, command events and final collection contents they must
//! produce. This crate loads such files and runs them against any
//! implementation of the [`unified_driver`] traits.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use unified_runner::{RunnerConfig, TestRunner};
//! use unified_driver::memory::MemoryDriver;
//!
//! let runner = TestRunner::new(Arc::new(MemoryDriver::default()), RunnerConfig::default())?;
//! let report = runner.run_path("tests/crud/insertOne.json".as_ref())?;
//! assert!(report.is_success(), "{}", report);
//! ```
//!
//! # Architecture
//!
//! - [`unified_core`]: errors, versions, requirements
//! - [`unified_driver`]: the driver capability traits and an in-memory backend
//! - [`unified_executor`]: operation decoding, entities, matching, dispatch
//! - this crate: the test file model, orchestration, reports, configuration

pub mod config;
pub mod logging;
pub mod report;
pub mod runner;
pub mod test_file;

pub use config::{RunnerConfig, CONFIG_FILE_NAME};
pub use report::{FileReport, TestOutcome, TestReport};
pub use runner::{TestRunner, MAX_SCHEMA_VERSION, MIN_SCHEMA_VERSION};
pub use test_file::{CollectionData, UnifiedTest, UnifiedTestFile};

pub use unified_core::{Error, Result};
