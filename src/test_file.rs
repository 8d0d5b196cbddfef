//! Unified test file model
//!
//! Test files are extended JSON. They are parsed with `serde_json`,
//! converted to BSON so `$oid`, `$numberLong` and friends keep their types,
//! then decoded through serde. Every level rejects keys it does not know.

use std::path::Path;

use bson::{Bson, Document};
use serde::Deserialize;
use unified_core::{Error, Result, RunOnRequirement, SchemaVersion};
use unified_executor::{EntityDescription, ExpectedEventsForClient, RawOperation};

/// One unified-format test file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UnifiedTestFile {
    pub description: String,
    pub schema_version: SchemaVersion,
    #[serde(default)]
    pub run_on_requirements: Option<Vec<RunOnRequirement>>,
    #[serde(default)]
    pub create_entities: Option<Vec<EntityDescription>>,
    #[serde(default)]
    pub initial_data: Option<Vec<CollectionData>>,
    pub tests: Vec<UnifiedTest>,
    /// YAML anchor definitions carried over by converters; ignored.
    #[serde(default, rename = "_yamlAnchors")]
    pub yaml_anchors: Option<Document>,
}

/// One test of a file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UnifiedTest {
    pub description: String,
    #[serde(default)]
    pub run_on_requirements: Option<Vec<RunOnRequirement>>,
    #[serde(default)]
    pub skip_reason: Option<String>,
    pub operations: Vec<RawOperation>,
    #[serde(default)]
    pub expect_events: Option<Vec<ExpectedEventsForClient>>,
    #[serde(default)]
    pub outcome: Option<Vec<CollectionData>>,
}

/// Contents of one collection, used for `initialData` and `outcome`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CollectionData {
    pub collection_name: String,
    pub database_name: String,
    pub documents: Vec<Document>,
}

impl CollectionData {
    /// `database.collection`
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database_name, self.collection_name)
    }
}

impl UnifiedTestFile {
    /// Parse a test file from extended JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::invalid_test_file(format!("malformed JSON: {}", e)))?;
        let bson = Bson::try_from(value)
            .map_err(|e| Error::invalid_test_file(format!("malformed extended JSON: {}", e)))?;
        let Bson::Document(document) = bson else {
            return Err(Error::invalid_test_file("test file must be a JSON object"));
        };
        Self::from_document(document)
    }

    /// Decode a test file already converted to BSON.
    pub fn from_document(document: Document) -> Result<Self> {
        bson::from_document(document).map_err(|e| Error::invalid_test_file(e.to_string()))
    }

    /// Read and parse a test file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::Io {
            reason: format!("failed to read test file '{}': {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }
}
