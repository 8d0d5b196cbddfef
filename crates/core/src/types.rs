//! Shared enums: entity kinds, deployment topologies and session
//! transaction states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of an entity in the entity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Client,
    Database,
    Collection,
    Session,
    Bucket,
    /// Saved result of `createChangeStream`
    ChangeStream,
    /// Saved plain result value
    Value,
}

impl EntityKind {
    /// Name as used in test files.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Database => "database",
            EntityKind::Collection => "collection",
            EntityKind::Session => "session",
            EntityKind::Bucket => "bucket",
            EntityKind::ChangeStream => "changeStream",
            EntityKind::Value => "value",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment topology as seen by the runner.
///
/// `sharded-replicaset` is accepted as an alias of `sharded` in requirement
/// lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyKind {
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "replicaset")]
    ReplicaSet,
    #[serde(rename = "sharded", alias = "sharded-replicaset")]
    Sharded,
    #[serde(rename = "load-balanced")]
    LoadBalanced,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopologyKind::Single => "single",
            TopologyKind::ReplicaSet => "replicaset",
            TopologyKind::Sharded => "sharded",
            TopologyKind::LoadBalanced => "load-balanced",
        };
        f.write_str(name)
    }
}

/// Transaction state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    #[default]
    None,
    Starting,
    InProgress,
    Committed,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::None => "none",
            TransactionState::Starting => "starting",
            TransactionState::InProgress => "in_progress",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_names_round_trip() {
        let kinds: Vec<TopologyKind> =
            serde_json::from_str(r#"["single", "replicaset", "sharded", "load-balanced"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![
                TopologyKind::Single,
                TopologyKind::ReplicaSet,
                TopologyKind::Sharded,
                TopologyKind::LoadBalanced
            ]
        );
    }

    #[test]
    fn sharded_replicaset_is_sharded() {
        let kind: TopologyKind = serde_json::from_str(r#""sharded-replicaset""#).unwrap();
        assert_eq!(kind, TopologyKind::Sharded);
    }

    #[test]
    fn transaction_state_names() {
        let state: TransactionState = serde_json::from_str(r#""in_progress""#).unwrap();
        assert_eq!(state, TransactionState::InProgress);
        assert_eq!(state.to_string(), "in_progress");
    }
}
