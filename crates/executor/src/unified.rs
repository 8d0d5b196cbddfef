//! One entry of a test's `operations` list.
//!
//! A [`RawOperation`] is the operation as written in the test file. Decoding
//! it produces a [`UnifiedOperation`]: the target object, the typed
//! [`Operation`] and exactly one [`Expectation`].

use bson::{Bson, Document};
use serde::{Deserialize, Deserializer};
use unified_core::{Error, Result};

use crate::operation::Operation;
use crate::registry;

/// Sentinel object name for operations run by the runner itself.
pub const TEST_RUNNER: &str = "testRunner";

/// An operation as it appears in a test file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawOperation {
    pub name: String,
    pub object: String,
    #[serde(default)]
    pub arguments: Option<Document>,
    #[serde(default)]
    pub expect_error: Option<ExpectedError>,
    /// `Some(Bson::Null)` when the file says `expectResult: null`
    #[serde(default, deserialize_with = "present")]
    pub expect_result: Option<Bson>,
    #[serde(default)]
    pub save_result_as_entity: Option<String>,
    #[serde(default)]
    pub ignore_result_and_error: Option<bool>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Bson>, D::Error>
where
    D: Deserializer<'de>,
{
    Bson::deserialize(deserializer).map(Some)
}

/// What an operation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectRef {
    TestRunner,
    Entity(String),
}

impl ObjectRef {
    pub fn parse(object: &str) -> Self {
        if object == TEST_RUNNER {
            ObjectRef::TestRunner
        } else {
            ObjectRef::Entity(object.to_string())
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectRef::TestRunner => f.write_str(TEST_RUNNER),
            ObjectRef::Entity(id) => f.write_str(id),
        }
    }
}

/// Properties of an error an operation must raise.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectedError {
    pub is_error: Option<bool>,
    pub is_client_error: Option<bool>,
    /// Case-insensitive substring of the error message
    pub error_contains: Option<String>,
    pub error_code: Option<i32>,
    /// Compared case-insensitively
    pub error_code_name: Option<String>,
    pub error_labels_contain: Option<Vec<String>>,
    pub error_labels_omit: Option<Vec<String>>,
    /// Matched against the error's partial result
    pub expect_result: Option<Bson>,
}

impl ExpectedError {
    fn is_empty(&self) -> bool {
        *self == ExpectedError::default()
    }
}

/// How an operation's outcome is checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Result unchecked; an error fails the test
    None,
    /// The operation must fail
    Error(ExpectedError),
    /// The operation must succeed
    Result {
        result: Option<Bson>,
        save_as: Option<String>,
    },
    /// Neither result nor error is checked
    Ignore,
}

/// A fully decoded operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedOperation {
    pub name: String,
    pub object: ObjectRef,
    pub operation: Operation,
    pub expectation: Expectation,
}

impl UnifiedOperation {
    /// Decode the operation, its arguments and its expectation.
    pub fn decode(raw: &RawOperation) -> Result<Self> {
        let operation = registry::decode(&raw.name, raw.arguments.as_ref())?;
        let expectation = decode_expectation(raw)?;
        Ok(Self {
            name: raw.name.clone(),
            object: ObjectRef::parse(&raw.object),
            operation,
            expectation,
        })
    }
}

fn decode_expectation(raw: &RawOperation) -> Result<Expectation> {
    let wants_result = raw.expect_result.is_some() || raw.save_result_as_entity.is_some();
    let ignore = raw.ignore_result_and_error.unwrap_or(false);
    let declared = [raw.expect_error.is_some(), wants_result, ignore]
        .iter()
        .filter(|set| **set)
        .count();
    if declared > 1 {
        return Err(Error::ConflictingExpectations {
            operation: raw.name.clone(),
        });
    }

    if let Some(expected) = &raw.expect_error {
        if expected.is_empty() {
            return Err(Error::invalid_test_file(format!(
                "{}: expectError must assert at least one property",
                raw.name
            )));
        }
        return Ok(Expectation::Error(expected.clone()));
    }
    if wants_result {
        return Ok(Expectation::Result {
            result: raw.expect_result.clone(),
            save_as: raw.save_result_as_entity.clone(),
        });
    }
    if ignore {
        return Ok(Expectation::Ignore);
    }
    Ok(Expectation::None)
}
