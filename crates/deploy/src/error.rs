//! Error taxonomy for ecosystem provisioning.

use alloy_core::primitives::Address;

use crate::Component;

/// Result alias used across the provisioning pipeline.
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

/// Errors raised while provisioning the ecosystem.
///
/// The pipeline is fail-fast: the first error of any kind aborts the remaining steps.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Invalid environment, found {0}")]
    Configuration(String),

    #[error("Failed to link library {library} into {artifact}: {reason}")]
    Link {
        artifact: String,
        library: String,
        reason: String,
    },

    #[error("Deployment of {artifact} failed: {reason}")]
    Deployment { artifact: String, reason: String },

    #[error("Call {method} on {contract} is not authorized: {reason}")]
    Authorization {
        contract: Address,
        method: String,
        reason: String,
    },

    #[error("Call {method} on {contract} reverted: {reason}")]
    RemoteExecution {
        contract: Address,
        method: String,
        reason: String,
    },

    #[error("{step} requires the {missing} address, which is not recorded yet")]
    MissingDependency { step: String, missing: Component },

    #[error("{fact} is already recorded as {existing}, refusing to overwrite")]
    StateConflict { fact: String, existing: String },

    #[error("Artifact error ({artifact}): {message}")]
    Artifact { artifact: String, message: String },

    #[error("Transport error: {0}")]
    Transport(#[source] anyhow::Error),

    #[error("State store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Invalid deployment plan: {0}")]
    Plan(String),
}

impl ProvisionError {
    /// Short, stable label for the error kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Link { .. } => "link",
            Self::Deployment { .. } => "deployment",
            Self::Authorization { .. } => "authorization",
            Self::RemoteExecution { .. } => "remote-execution",
            Self::MissingDependency { .. } => "missing-dependency",
            Self::StateConflict { .. } => "state-conflict",
            Self::Artifact { .. } => "artifact",
            Self::Transport(_) => "transport",
            Self::Store(_) => "store",
            Self::Plan(_) => "plan",
        }
    }
}
