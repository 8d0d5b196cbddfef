//! Dotted version triples.
//!
//! [`SchemaVersion`] gates which test files the runner accepts;
//! [`ServerVersion`] is compared against `runOnRequirements`.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::Error;

/// Parse up to three dotted numeric components, filling missing ones.
fn parse_components(raw: &str, fill: u32) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut values = [fill; 3];
    for (slot, part) in values.iter_mut().zip(parts.iter()) {
        *slot = part.parse().ok()?;
    }
    Some((values[0], values[1], values[2]))
}

// =============================================================================
// SchemaVersion
// =============================================================================

/// Version of the unified test format a file complies with.
///
/// Ordered lexicographically by `(major, minor, patch)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    /// Build a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor, patch) = parse_components(s, 0).ok_or_else(|| Error::InvalidSchemaVersion {
            raw: s.to_string(),
        })?;
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// =============================================================================
// ServerVersion
// =============================================================================

/// Version reported by (or required of) a server.
///
/// Any pre-release suffix (`"7.0.0-rc1"`) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    /// Build a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version, defaulting missing components to 0.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        Self::parse_with_fill(raw, 0)
    }

    /// Parse an inclusive upper bound: missing components become 99, so
    /// `"4.4"` admits every 4.4.x release.
    pub fn parse_upper_bound(raw: &str) -> Result<Self, Error> {
        Self::parse_with_fill(raw, 99)
    }

    fn parse_with_fill(raw: &str, fill: u32) -> Result<Self, Error> {
        let release = raw.split('-').next().unwrap_or(raw);
        let (major, minor, patch) =
            parse_components(release, fill).ok_or_else(|| Error::InvalidTestFile {
                reason: format!("invalid server version: {}", raw),
            })?;
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl<'de> Deserialize<'de> for ServerVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ServerVersion::parse(&raw).map_err(de::Error::custom)
    }
}

/// Deserialize an optional `maxServerVersion`.
pub fn deserialize_upper_bound<'de, D>(deserializer: D) -> Result<Option<ServerVersion>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|r| ServerVersion::parse_upper_bound(&r).map_err(de::Error::custom))
        .transpose()
}
