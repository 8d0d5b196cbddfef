//! runOnRequirements, skipReason and the configured skip lists

use crate::common::*;
use bson::doc;
use serde_json::json;
use tempfile::TempDir;
use unified_core::{ServerVersion, TopologyKind};
use unified_driver::memory::DeploymentConfig;
use unified_runner::{RunnerConfig, TestOutcome};

fn noop(description: &str) -> serde_json::Value {
    json!({ "description": description, "operations": [] })
}

#[test]
fn unmet_file_requirements_skip_the_file() {
    let fx = Fixture::new();
    let report = fx
        .run(json!({
            "description": "future",
            "schemaVersion": "1.0",
            "runOnRequirements": [{ "minServerVersion": "99.0" }],
            "tests": [noop("never runs")]
        }))
        .unwrap();
    assert_eq!(report.skipped.as_deref(), Some("no runOnRequirements met"));
    assert!(report.tests.is_empty());
}

#[test]
fn any_met_requirement_is_enough() {
    let fx = Fixture::new();
    let report = fx
        .run(json!({
            "description": "either",
            "schemaVersion": "1.0",
            "runOnRequirements": [
                { "topologies": ["single"] },
                { "topologies": ["replicaset"], "maxServerVersion": "7.0" }
            ],
            "tests": [noop("runs")]
        }))
        .unwrap();
    assert!(report.skipped.is_none());
    assert_eq!(report.outcome("runs"), Some(&TestOutcome::Passed));
}

#[test]
fn unmet_test_requirements_skip_only_that_test() {
    let fx = Fixture::with(
        DeploymentConfig::new(ServerVersion::new(4, 4, 1), TopologyKind::Sharded),
        RunnerConfig::default(),
    );
    let report = fx
        .run(json!({
            "description": "mixed",
            "schemaVersion": "1.0",
            "tests": [
                {
                    "description": "needs 5.0",
                    "runOnRequirements": [{ "minServerVersion": "5.0" }],
                    "operations": []
                },
                {
                    "description": "sharded only",
                    "runOnRequirements": [{ "topologies": ["sharded-replicaset"] }],
                    "operations": []
                },
                {
                    "description": "up to 4.4",
                    "runOnRequirements": [{ "maxServerVersion": "4.4" }],
                    "operations": []
                }
            ]
        }))
        .unwrap();
    assert!(report.outcome("needs 5.0").unwrap().is_skipped());
    assert_eq!(report.outcome("sharded only"), Some(&TestOutcome::Passed));
    assert_eq!(report.outcome("up to 4.4"), Some(&TestOutcome::Passed));
}

#[test]
fn server_parameters_and_auth_requirements() {
    let deployment = DeploymentConfig::default()
        .with_server_parameters(doc! { "enableTestCommands": true })
        .with_auth(true);
    let fx = Fixture::with(deployment, RunnerConfig::default());
    let report = fx
        .run(json!({
            "description": "parameters",
            "schemaVersion": "1.2",
            "tests": [
                {
                    "description": "test commands",
                    "runOnRequirements": [{ "serverParameters": { "enableTestCommands": true } }],
                    "operations": []
                },
                {
                    "description": "no auth",
                    "runOnRequirements": [{ "auth": false }],
                    "operations": []
                },
                {
                    "description": "not serverless",
                    "runOnRequirements": [{ "serverless": "forbid" }],
                    "operations": []
                }
            ]
        }))
        .unwrap();
    assert_eq!(report.outcome("test commands"), Some(&TestOutcome::Passed));
    assert!(report.outcome("no auth").unwrap().is_skipped());
    assert_eq!(report.outcome("not serverless"), Some(&TestOutcome::Passed));
}

#[test]
fn skip_reason_skips_the_test() {
    let fx = Fixture::new();
    let report = fx
        .run(json!({
            "description": "skips",
            "schemaVersion": "1.0",
            "tests": [{
                "description": "broken",
                "skipReason": "DRIVERS-0000 not implemented",
                "operations": [{ "name": "frobnicate", "object": "testRunner" }]
            }]
        }))
        .unwrap();
    assert_eq!(
        report.outcome("broken"),
        Some(&TestOutcome::Skipped {
            reason: "DRIVERS-0000 not implemented".into()
        })
    );
}

#[test]
fn configured_skip_lists() {
    let config = RunnerConfig {
        skip_files: vec!["skipped file".into()],
        skip_tests: vec!["skipped test".into()],
        ..RunnerConfig::default()
    };
    let fx = Fixture::with(DeploymentConfig::default(), config);

    let report = fx
        .run(json!({
            "description": "kept file",
            "schemaVersion": "1.0",
            "tests": [noop("skipped test"), noop("kept test")]
        }))
        .unwrap();
    assert!(report.outcome("skipped test").unwrap().is_skipped());
    assert_eq!(report.outcome("kept test"), Some(&TestOutcome::Passed));

    let report = fx
        .run(json!({
            "description": "skipped file",
            "schemaVersion": "1.0",
            "tests": [noop("anything")]
        }))
        .unwrap();
    assert_eq!(report.skipped.as_deref(), Some("skipped by configuration"));
}

#[test]
fn run_path_skips_by_file_stem() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("change-streams.json");
    std::fs::write(
        &path,
        json!({
            "description": "change streams",
            "schemaVersion": "1.0",
            "tests": [noop("anything")]
        })
        .to_string(),
    )
    .unwrap();

    let fx = Fixture::new();
    assert_eq!(fx.runner.run_path(&path).unwrap().passed(), 1);

    let config = RunnerConfig {
        skip_files: vec!["change-streams".into()],
        ..RunnerConfig::default()
    };
    let fx = Fixture::with(DeploymentConfig::default(), config);
    let report = fx.runner.run_path(&path).unwrap();
    assert_eq!(report.description, "change streams");
    assert!(report.skipped.is_some());
}
