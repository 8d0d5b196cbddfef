//! Common test utilities for unified runner tests

use std::sync::Arc;

use serde_json::{json, Value};
use unified_driver::memory::{DeploymentConfig, MemoryDriver};
use unified_runner::{FileReport, Result, RunnerConfig, TestRunner, UnifiedTestFile};

/// A runner over a fresh in-memory deployment, keeping the driver around
/// for inspecting server state.
pub struct Fixture {
    pub driver: Arc<MemoryDriver>,
    pub runner: TestRunner,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(DeploymentConfig::default(), RunnerConfig::default())
    }

    pub fn with(deployment: DeploymentConfig, mut config: RunnerConfig) -> Self {
        config.log_filter = "unified=debug".to_string();
        let driver = Arc::new(MemoryDriver::new(deployment));
        let runner = TestRunner::new(driver.clone(), config).unwrap();
        Self { driver, runner }
    }

    /// Parse and run a file given as JSON.
    pub fn run(&self, file: Value) -> Result<FileReport> {
        let file = UnifiedTestFile::from_json_str(&file.to_string())?;
        self.runner.run_file(&file)
    }
}

/// The usual client/database/collection entities: `client0` observing
/// command started events, `database0` on `db`, `collection0` on `db.coll`.
pub fn standard_entities() -> Value {
    json!([
        { "client": { "id": "client0", "observeEvents": ["commandStartedEvent"] } },
        { "database": { "id": "database0", "client": "client0", "databaseName": "db" } },
        { "collection": { "id": "collection0", "database": "database0", "collectionName": "coll" } }
    ])
}

/// A schema 1.0 file over [`standard_entities`] with `db.coll` seeded from
/// `documents`.
pub fn file_with(documents: Value, tests: Value) -> Value {
    json!({
        "description": "fixture",
        "schemaVersion": "1.0",
        "createEntities": standard_entities(),
        "initialData": [
            { "collectionName": "coll", "databaseName": "db", "documents": documents }
        ],
        "tests": tests
    })
}

/// Reason of the named test's failure, panicking if it did not fail.
#[allow(dead_code)]
pub fn failure_reason(report: &FileReport, test: &str) -> String {
    match report.outcome(test) {
        Some(unified_runner::TestOutcome::Failed { reason }) => reason.clone(),
        other => panic!("expected {} to fail, got {:?}", test, other),
    }
}
