//! Test orchestration
//!
//! A [`TestRunner`] runs unified test files one test at a time:
//!
//! ```text
//! CheckSchemaVersion -> CheckFileRequirements -> per test:
//!   CheckSkipReason -> CheckConfigSkipList -> CheckTestRequirements
//!   -> SeedInitialData -> BuildEntities -> RunOperationsInOrder
//!   -> VerifyEvents -> VerifyOutcome -> Teardown
//! ```
//!
//! Errors in the test file itself (unknown operations, bad arguments,
//! unresolvable entities) abort the whole file. Test failures (unexpected
//! errors, mismatched results, events or outcome) only fail their test.

use std::path::Path;
use std::sync::Arc;

use bson::{doc, Bson, Document};
use tracing::{debug, info, warn};
use unified_core::{any_satisfied, Deployment, Error, Result, SchemaVersion, TopologyKind};
use unified_driver::{
    ClientHandle, CollectionOptions, CreateCollectionOptions, DatabaseOptions, Driver,
    DropCollectionOptions, FindOptions, InsertManyOptions,
};
use unified_executor::{events, matcher, EntityMap, ExecutionContext, Executor, UnifiedOperation};

use crate::config::RunnerConfig;
use crate::logging;
use crate::report::{FileReport, TestOutcome, TestReport};
use crate::test_file::{CollectionData, UnifiedTest, UnifiedTestFile};

/// Oldest schema version this runner understands.
pub const MIN_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Newest schema version this runner understands.
pub const MAX_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 5, 0);

fn majority() -> Document {
    doc! { "w": "majority" }
}

/// Runs unified test files against one deployment.
pub struct TestRunner {
    driver: Arc<dyn Driver>,
    internal: Arc<dyn ClientHandle>,
    executor: Executor,
    deployment: Deployment,
    config: RunnerConfig,
}

impl TestRunner {
    /// Install logging with the configured filter, connect the internal
    /// client, discover the deployment and kill any sessions left over from
    /// a previous run.
    pub fn new(driver: Arc<dyn Driver>, config: RunnerConfig) -> Result<Self> {
        logging::init_tracing(&config.log_filter);
        let internal = driver.internal_client();
        let deployment = discover_deployment(internal.as_ref())?;
        info!(
            target: "unified::runner",
            version = %deployment.server_version,
            topology = %deployment.topology,
            auth = deployment.auth_enabled,
            "connected to deployment"
        );

        let runner = Self {
            executor: Executor::new(Arc::clone(&internal)),
            driver,
            internal,
            deployment,
            config,
        };
        runner.kill_all_sessions();
        Ok(runner)
    }

    /// The deployment requirements are checked against.
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Load and run one test file. Files on the configured skip list, by
    /// file stem or description, are skipped without running.
    pub fn run_path(&self, path: &Path) -> Result<FileReport> {
        let file = UnifiedTestFile::from_path(path)?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if self.config.skips_file(stem) {
            info!(target: "unified::runner", file = stem, "file skipped by configuration");
            return Ok(FileReport::skipped(file.description, "skipped by configuration"));
        }
        self.run_file(&file)
    }

    /// Run every test of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema version is unsupported or the file is
    /// malformed in a way only discovered while running it. Failing tests
    /// are reported in the [`FileReport`], not as errors.
    pub fn run_file(&self, file: &UnifiedTestFile) -> Result<FileReport> {
        if file.schema_version < MIN_SCHEMA_VERSION || file.schema_version > MAX_SCHEMA_VERSION {
            return Err(Error::UnsupportedSchemaVersion {
                file: file.description.clone(),
                version: file.schema_version.to_string(),
            });
        }

        if self.config.skips_file(&file.description) {
            info!(target: "unified::runner", file = file.description.as_str(), "file skipped by configuration");
            return Ok(FileReport::skipped(&file.description, "skipped by configuration"));
        }

        if let Some(requirements) = &file.run_on_requirements {
            if !any_satisfied(requirements, &self.deployment) {
                info!(
                    target: "unified::runner",
                    file = file.description.as_str(),
                    "file skipped: no runOnRequirements met"
                );
                return Ok(FileReport::skipped(&file.description, "no runOnRequirements met"));
            }
        }

        let mut report = FileReport::new(&file.description);
        for test in &file.tests {
            let outcome = self.run_test(file, test)?;
            match &outcome {
                TestOutcome::Passed => {
                    debug!(target: "unified::runner", test = test.description.as_str(), "test passed")
                }
                TestOutcome::Skipped { reason } => {
                    info!(target: "unified::runner", test = test.description.as_str(), reason = reason.as_str(), "test skipped")
                }
                TestOutcome::Failed { reason } => {
                    warn!(target: "unified::runner", test = test.description.as_str(), reason = reason.as_str(), "test failed")
                }
            }
            report.tests.push(TestReport {
                description: test.description.clone(),
                outcome,
            });
        }
        Ok(report)
    }

    fn run_test(&self, file: &UnifiedTestFile, test: &UnifiedTest) -> Result<TestOutcome> {
        if let Some(reason) = &test.skip_reason {
            return Ok(TestOutcome::Skipped { reason: reason.clone() });
        }
        if self.config.skips_test(&test.description) {
            return Ok(TestOutcome::Skipped {
                reason: "skipped by configuration".to_string(),
            });
        }
        if let Some(requirements) = &test.run_on_requirements {
            if !any_satisfied(requirements, &self.deployment) {
                return Ok(TestOutcome::Skipped {
                    reason: "no runOnRequirements met".to_string(),
                });
            }
        }

        debug!(target: "unified::runner", test = test.description.as_str(), "running test");
        let operations = test
            .operations
            .iter()
            .map(UnifiedOperation::decode)
            .collect::<Result<Vec<_>>>()?;
        for expected in test.expect_events.iter().flatten() {
            expected.command_events()?;
        }

        if let Some(initial_data) = &file.initial_data {
            self.seed(initial_data)?;
        }

        let descriptions = file.create_entities.as_deref().unwrap_or_default();
        let entities = EntityMap::build(self.driver.as_ref(), descriptions)?;
        let mut ctx = ExecutionContext::new(entities);

        let result = self.run_operations(&mut ctx, &operations, test);

        ctx.teardown();
        if result.is_err() && self.config.kill_sessions_on_failure {
            self.kill_all_sessions();
        }

        match result {
            Ok(()) => Ok(TestOutcome::Passed),
            Err(e) if e.is_test_failure() => Ok(TestOutcome::Failed { reason: e.to_string() }),
            Err(e) => Err(e),
        }
    }

    fn run_operations(&self, ctx: &mut ExecutionContext, operations: &[UnifiedOperation], test: &UnifiedTest) -> Result<()> {
        for operation in operations {
            self.executor.execute(ctx, operation)?;
        }
        for expected in test.expect_events.iter().flatten() {
            events::verify(expected, &ctx.entities)?;
        }
        for expected in test.outcome.iter().flatten() {
            self.verify_outcome(expected, &ctx.entities)?;
        }
        Ok(())
    }

    // =========================================================================
    // Setup and verification through the internal client
    // =========================================================================

    /// Replace each listed collection with the given documents.
    fn seed(&self, initial_data: &[CollectionData]) -> Result<()> {
        for data in initial_data {
            debug!(target: "unified::runner", namespace = %data.namespace(), count = data.documents.len(), "seeding collection");
            let db = self.internal.database(&data.database_name, &DatabaseOptions::default());
            let drop_options = DropCollectionOptions {
                write_concern: Some(majority()),
            };
            db.drop_collection(&data.collection_name, &drop_options, None)?;

            if data.documents.is_empty() {
                let create_options = CreateCollectionOptions {
                    write_concern: Some(majority()),
                    ..Default::default()
                };
                db.create_collection(&data.collection_name, &create_options, None)?;
            } else {
                let insert_options = InsertManyOptions {
                    write_concern: Some(majority()),
                    ..Default::default()
                };
                db.collection(&data.collection_name, &CollectionOptions::default())
                    .insert_many(data.documents.clone(), &insert_options, None)?;
            }
        }
        Ok(())
    }

    /// Compare a collection's contents, in natural order, with no extra
    /// fields allowed.
    fn verify_outcome(&self, expected: &CollectionData, entities: &EntityMap) -> Result<()> {
        let actual = self
            .internal
            .database(&expected.database_name, &DatabaseOptions::default())
            .collection(&expected.collection_name, &CollectionOptions::default())
            .find(None, &FindOptions::default(), None)?;

        let expected_docs = Bson::Array(expected.documents.iter().cloned().map(Bson::Document).collect());
        let actual_docs = Bson::Array(actual.into_iter().map(Bson::Document).collect());
        matcher::match_exact(&expected_docs, &actual_docs, entities).map_err(|m| Error::OutcomeMismatch {
            namespace: expected.namespace(),
            reason: m.to_string(),
        })
    }

    /// Kill every server-side session. Errors are logged.
    pub fn kill_all_sessions(&self) {
        let targets: Vec<Option<String>> = match self.deployment.topology {
            TopologyKind::Single => return,
            TopologyKind::ReplicaSet => vec![self.primary_address()],
            TopologyKind::Sharded => self.internal.hosts().into_iter().map(Some).collect(),
            TopologyKind::LoadBalanced => vec![None],
        };
        for address in targets {
            if let Err(e) = self.internal.kill_all_sessions(address.as_deref()) {
                warn!(
                    target: "unified::runner",
                    address = address.as_deref().unwrap_or("default"),
                    error = %e,
                    "killAllSessions failed"
                );
            }
        }
    }

    /// Primary of a replica set as reported by `hello`.
    fn primary_address(&self) -> Option<String> {
        match self.internal.run_command("admin", doc! { "hello": 1 }, None) {
            Ok(reply) => reply.get_str("primary").ok().map(String::from),
            Err(e) => {
                warn!(target: "unified::runner", error = %e, "hello failed");
                None
            }
        }
    }
}

/// Read version, topology, parameters and flags of the deployment.
fn discover_deployment(internal: &dyn ClientHandle) -> Result<Deployment> {
    let mut deployment = Deployment::new(internal.server_version()?, internal.topology());
    match internal.run_command("admin", doc! { "getParameter": "*" }, None) {
        Ok(mut parameters) => {
            parameters.remove("ok");
            deployment.server_parameters = parameters;
        }
        Err(e) => {
            warn!(target: "unified::runner", error = %e, "getParameter failed, assuming no server parameters")
        }
    }
    deployment.auth_enabled = internal.auth_enabled();
    deployment.serverless = internal.serverless();
    Ok(deployment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use unified_core::ServerVersion;
    use unified_driver::memory::{DeploymentConfig, MemoryDriver};

    fn runner(config: DeploymentConfig) -> TestRunner {
        TestRunner::new(Arc::new(MemoryDriver::new(config)), RunnerConfig::default()).unwrap()
    }

    #[test]
    fn schema_bounds() {
        assert!(MIN_SCHEMA_VERSION < MAX_SCHEMA_VERSION);
        assert_eq!(MAX_SCHEMA_VERSION.to_string(), "1.5.0");
    }

    #[test]
    fn discovers_deployment() {
        let config = DeploymentConfig::new(ServerVersion::new(6, 0, 3), TopologyKind::Sharded)
            .with_server_parameters(doc! { "enableTestCommands": true })
            .with_auth(true);
        let runner = runner(config);
        let deployment = runner.deployment();
        assert_eq!(deployment.server_version, ServerVersion::new(6, 0, 3));
        assert_eq!(deployment.topology, TopologyKind::Sharded);
        assert_eq!(deployment.server_parameters, doc! { "enableTestCommands": true });
        assert!(deployment.auth_enabled);
        assert!(!deployment.serverless);
    }

    #[test]
    fn kill_all_sessions_tolerates_every_topology() {
        for topology in [
            TopologyKind::Single,
            TopologyKind::ReplicaSet,
            TopologyKind::Sharded,
            TopologyKind::LoadBalanced,
        ] {
            let runner = runner(DeploymentConfig::new(ServerVersion::new(7, 0, 0), topology));
            runner.kill_all_sessions();
        }
    }

    #[test]
    fn new_installs_logging() {
        let config = RunnerConfig {
            log_filter: "unified=trace".into(),
            ..RunnerConfig::default()
        };
        TestRunner::new(Arc::new(MemoryDriver::default()), config).unwrap();
        assert!(!logging::init_tracing("unified=info"), "a subscriber is already installed");
    }

    #[test]
    fn replica_set_primary_comes_from_hello() {
        let runner = runner(DeploymentConfig::default());
        assert_eq!(runner.primary_address().as_deref(), Some("localhost:27017"));
    }
}
