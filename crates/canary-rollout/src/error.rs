//! Rollout engine error types.

use thiserror::Error;

use canary_core::SelectorError;
use canary_state::StateError;

/// Errors that can occur while reconciling a desired state.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("invalid desired state {key}: {reason}")]
    InvalidDesiredState { key: String, reason: String },

    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("invalid rollout policy: {0}")]
    InvalidPolicy(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("{operation} on {key} gave up after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        key: String,
        attempts: u32,
    },

    #[error("workload {0} vanished while retrying")]
    Vanished(String),

    #[error("workload {0} exists but is not a managed canary")]
    NotManaged(String),

    #[error("canary {key} belongs to desired state {owner}")]
    OwnedElsewhere { key: String, owner: String },

    #[error("workload {0} has no containers")]
    NoContainers(String),

    #[error("change feed closed")]
    FeedClosed,
}

pub type RolloutResult<T> = Result<T, RolloutError>;
