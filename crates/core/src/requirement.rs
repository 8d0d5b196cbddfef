//! Deployment requirements (`runOnRequirements`).
//!
//! A [`RunOnRequirement`] is met iff every field it specifies matches the
//! observed [`Deployment`]. A list of requirements is met iff at least one
//! of its members is met.

use std::fmt;

use bson::Document;
use serde::Deserialize;

use crate::document::values_equal;
use crate::types::TopologyKind;
use crate::version::{deserialize_upper_bound, ServerVersion};

/// What the runner observed about the deployment it is connected to.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub server_version: ServerVersion,
    pub topology: TopologyKind,
    pub server_parameters: Document,
    pub auth_enabled: bool,
    pub serverless: bool,
}

impl Deployment {
    /// A deployment with no server parameters, auth or serverless.
    pub fn new(server_version: ServerVersion, topology: TopologyKind) -> Self {
        Self {
            server_version,
            topology,
            server_parameters: Document::new(),
            auth_enabled: false,
            serverless: false,
        }
    }
}

/// Serverless constraint of a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerlessRequirement {
    Require,
    Forbid,
    Allow,
}

/// One version/topology requirement.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunOnRequirement {
    #[serde(default)]
    pub min_server_version: Option<ServerVersion>,
    #[serde(default, deserialize_with = "deserialize_upper_bound")]
    pub max_server_version: Option<ServerVersion>,
    #[serde(default)]
    pub topologies: Option<Vec<TopologyKind>>,
    #[serde(default)]
    pub server_parameters: Option<Document>,
    #[serde(default)]
    pub auth: Option<bool>,
    #[serde(default)]
    pub serverless: Option<ServerlessRequirement>,
}

/// The first field of a requirement that the deployment fails.
#[derive(Debug, Clone, PartialEq)]
pub enum UnmetRequirement {
    MinServerVersion {
        required: ServerVersion,
        actual: ServerVersion,
    },
    MaxServerVersion {
        required: ServerVersion,
        actual: ServerVersion,
    },
    Topology {
        allowed: Vec<TopologyKind>,
        actual: TopologyKind,
    },
    ServerParameter {
        name: String,
    },
    Auth {
        required: bool,
    },
    Serverless {
        required: ServerlessRequirement,
    },
}

impl fmt::Display for UnmetRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmetRequirement::MinServerVersion { required, actual } => {
                write!(f, "server version {} < minimum {}", actual, required)
            }
            UnmetRequirement::MaxServerVersion { required, actual } => {
                write!(f, "server version {} > maximum {}", actual, required)
            }
            UnmetRequirement::Topology { allowed, actual } => {
                let names: Vec<String> = allowed.iter().map(|t| t.to_string()).collect();
                write!(f, "topology {} not in [{}]", actual, names.join(", "))
            }
            UnmetRequirement::ServerParameter { name } => {
                write!(f, "server parameter {} does not match", name)
            }
            UnmetRequirement::Auth { required } => write!(f, "auth required = {}", required),
            UnmetRequirement::Serverless { required } => {
                write!(f, "serverless requirement {:?} not met", required)
            }
        }
    }
}

impl RunOnRequirement {
    /// Returns the first unmet field, or `None` if the requirement holds.
    pub fn unmet(&self, deployment: &Deployment) -> Option<UnmetRequirement> {
        let actual = deployment.server_version;
        if let Some(min) = self.min_server_version {
            if actual < min {
                return Some(UnmetRequirement::MinServerVersion {
                    required: min,
                    actual,
                });
            }
        }
        if let Some(max) = self.max_server_version {
            if actual > max {
                return Some(UnmetRequirement::MaxServerVersion {
                    required: max,
                    actual,
                });
            }
        }
        if let Some(topologies) = &self.topologies {
            if !topologies.contains(&deployment.topology) {
                return Some(UnmetRequirement::Topology {
                    allowed: topologies.clone(),
                    actual: deployment.topology,
                });
            }
        }
        if let Some(parameters) = &self.server_parameters {
            for (name, expected) in parameters {
                let matches = deployment
                    .server_parameters
                    .get(name)
                    .map_or(false, |actual| values_equal(expected, actual));
                if !matches {
                    return Some(UnmetRequirement::ServerParameter { name: name.clone() });
                }
            }
        }
        if let Some(auth) = self.auth {
            if auth != deployment.auth_enabled {
                return Some(UnmetRequirement::Auth { required: auth });
            }
        }
        if let Some(serverless) = self.serverless {
            let met = match serverless {
                ServerlessRequirement::Require => deployment.serverless,
                ServerlessRequirement::Forbid => !deployment.serverless,
                ServerlessRequirement::Allow => true,
            };
            if !met {
                return Some(UnmetRequirement::Serverless {
                    required: serverless,
                });
            }
        }
        None
    }

    /// Whether the requirement holds for the deployment.
    pub fn is_met(&self, deployment: &Deployment) -> bool {
        self.unmet(deployment).is_none()
    }
}

/// Whether at least one requirement in the list holds.
pub fn any_satisfied(requirements: &[RunOnRequirement], deployment: &Deployment) -> bool {
    requirements.iter().any(|r| r.is_met(deployment))
}
