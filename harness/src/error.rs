use thiserror::Error;

use crate::cluster::ClusterError;

/// Errors that end a scenario run early. Failed puts and gets are not among
/// them: those are outcomes and end up in the report.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("wait '{0}' was cancelled")]
    Cancelled(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown scenario '{0}' (expected persistence:delete|replace|mult_time or performance:gets|delete)")]
    UnknownScenario(String),
}
