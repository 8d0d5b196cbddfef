//! Schema version gating

use crate::common::*;
use proptest::prelude::*;
use serde_json::{json, Value};
use unified_runner::Error;

fn file(version: &str) -> Value {
    json!({
        "description": "versioned",
        "schemaVersion": version,
        "tests": [{ "description": "noop", "operations": [] }]
    })
}

#[test]
fn bounds_are_accepted() {
    let fx = Fixture::new();
    for version in ["1", "1.0", "1.0.0", "1.5", "1.5.0"] {
        let report = fx.run(file(version)).unwrap();
        assert_eq!(report.passed(), 1, "schema {}", version);
    }
}

#[test]
fn newer_schema_is_a_hard_error() {
    let fx = Fixture::new();
    for version in ["1.5.1", "1.6", "2.0"] {
        let err = fx.run(file(version)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSchemaVersion { .. }), "schema {}: {}", version, err);
    }
}

#[test]
fn older_schema_is_a_hard_error() {
    let fx = Fixture::new();
    let err = fx.run(file("0.9")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchemaVersion { .. }));
    assert!(err.to_string().contains("\"versioned\""));
}

#[test]
fn malformed_schema_is_an_invalid_file() {
    let fx = Fixture::new();
    for version in ["", "1.a", "1.0.0.0", "v1"] {
        let err = fx.run(file(version)).unwrap_err();
        assert!(matches!(err, Error::InvalidTestFile { .. }), "schema {:?}: {}", version, err);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_supported_version_runs(minor in 0u32..5, patch in 0u32..100) {
        let fx = Fixture::new();
        let report = fx.run(file(&format!("1.{}.{}", minor, patch))).unwrap();
        prop_assert_eq!(report.passed(), 1);
    }

    #[test]
    fn any_later_major_is_rejected(major in 2u32..50, minor in 0u32..10) {
        let fx = Fixture::new();
        let result = fx.run(file(&format!("{}.{}", major, minor)));
        let is_unsupported = matches!(result, Err(Error::UnsupportedSchemaVersion { .. }));
        prop_assert!(is_unsupported);
    }
}
