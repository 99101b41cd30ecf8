//! Engine error model.
//!
//! Store failures pass through unchanged as [`TrackerError::Store`]; the
//! remaining variants are the typed conditions callers present to users.

use synctrack_state::StateError;
use synctrack_types::job::{ConnectionId, JobId};
use synctrack_types::state::MalformedState;

/// Categorized engine error.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The requested job does not exist.
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// A safe state write was refused because a sync is in flight.
    #[error("a sync is running for connection {connection_id} (job {job_id})")]
    SyncIsRunning {
        connection_id: ConnectionId,
        job_id: JobId,
    },

    /// A wire state value failed validation. Nothing was written.
    #[error(transparent)]
    MalformedState(#[from] MalformedState),

    /// A request was rejected before reaching the store.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StateError),
}

impl TrackerError {
    /// Whether this error reports a conflict with a running sync.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::SyncIsRunning { .. })
    }

    /// Whether this error reports an absent record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::JobNotFound(_) | Self::Store(StateError::JobNotFound(_))
        )
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TrackerError>;
