//! Runner configuration via `unified-runner.toml`
//!
//! Lets a driver project skip files and tests it does not support yet
//! without editing the shared test files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use unified_core::{Error, Result};

/// Config file name looked up by harnesses.
pub const CONFIG_FILE_NAME: &str = "unified-runner.toml";

/// Runner configuration loaded from `unified-runner.toml`.
///
/// # Example
///
/// ```toml
/// skip_files = ["poc-change-streams"]
/// skip_tests = ["InsertOne fails after NoWritesPerformed error"]
/// log_filter = "unified=debug"
/// kill_sessions_on_failure = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// File descriptions (or file stems) to skip entirely.
    #[serde(default)]
    pub skip_files: Vec<String>,
    /// Test descriptions to skip.
    #[serde(default)]
    pub skip_tests: Vec<String>,
    /// `tracing` filter directive used when no `RUST_LOG` is set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Issue `killAllSessions` after a failed test.
    #[serde(default = "default_true")]
    pub kill_sessions_on_failure: bool,
}

fn default_log_filter() -> String {
    "unified=info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            skip_files: Vec::new(),
            skip_tests: Vec::new(),
            log_filter: default_log_filter(),
            kill_sessions_on_failure: true,
        }
    }
}

impl RunnerConfig {
    /// Whether a file is on the skip list.
    pub fn skips_file(&self, description: &str) -> bool {
        self.skip_files.iter().any(|s| s == description)
    }

    /// Whether a test is on the skip list.
    pub fn skips_test(&self, description: &str) -> bool {
        self.skip_tests.iter().any(|s| s == description)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Unified test runner configuration
#
# Files to skip, by description or file stem
skip_files = []

# Tests to skip, by description
skip_tests = []

# Log filter used when RUST_LOG is not set (default: "unified=info")
log_filter = "unified=info"

# Kill every server session after a failed test (default: true)
kill_sessions_on_failure = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        toml::from_str(&content).map_err(|e| Error::Config {
            reason: format!("Failed to parse config file '{}': {}", path.display(), e),
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| Error::Config {
                reason: format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ),
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content).map_err(|e| Error::Config {
            reason: format!("Failed to write config file '{}': {}", path.display(), e),
        })
    }
}
