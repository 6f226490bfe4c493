/// Error taxonomy for chain construction and workflow transitions
///
/// Domain failures are typed so callers can tell a user-facing rejection
/// (`InvalidTransition`, `Forbidden`) from a system fault (`Storage`).
/// Infrastructure code keeps returning `anyhow::Result` and is folded into
/// `Storage` at the workflow boundary.

use thiserror::Error;

/// Result alias used by the workflow, directory and storage layers
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Request, requester or designated approver cannot be resolved
    #[error("not found: {0}")]
    NotFound(String),

    /// Even the fallback recipe produced zero approvers
    #[error("no approvers could be resolved for '{requester}' (category '{category}')")]
    ChainResolutionFailure { requester: String, category: String },

    /// Decision/escalation on a non-pending step, a terminal request,
    /// or by an actor who is not authorized for the current step
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Override attempted by a non-privileged actor
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Another writer committed first; retry against the refreshed state
    #[error("request {request_id} was modified concurrently (expected version {expected_version})")]
    ConcurrentModification {
        request_id: String,
        expected_version: u64,
    },

    /// A transition produced a chain that breaks a structural invariant.
    /// Nothing is persisted when this is returned.
    #[error("chain invariant violated: {0}")]
    InvariantViolation(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl WorkflowError {
    /// True for errors that are a rejection of the caller's action rather than a fault
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition(_) | Self::Forbidden(_) | Self::NotFound(_)
        )
    }
}

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.into())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.into())
    }
}
