//! Store error types.

use synctrack_types::job::{ConnectionId, JobId};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by [`JobStore`](crate::JobStore) and
/// [`StateStore`](crate::StateStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying database driver failure.
    #[error("store backend error: {0}")]
    Backend(#[source] BoxError),

    /// Driver failure annotated with the operation that hit it.
    #[error("{context}: {source}")]
    BackendContext {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// A stored JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A write referenced a job that does not exist.
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// A write referenced an attempt that does not exist.
    #[error("attempt {attempt_number} of job {job_id} not found")]
    AttemptNotFound { job_id: JobId, attempt_number: i32 },

    /// The attempt already has a terminal status.
    #[error("attempt {attempt_number} of job {job_id} is already completed")]
    AttemptAlreadyCompleted { job_id: JobId, attempt_number: i32 },

    /// An attempt can only be completed with a terminal status.
    #[error("attempt {attempt_number} of job {job_id} cannot be completed as {status}")]
    NonTerminalCompletion {
        job_id: JobId,
        attempt_number: i32,
        status: &'static str,
    },

    /// Stored state rows for a connection do not form a valid checkpoint.
    #[error("inconsistent state for connection {connection_id}: {reason}")]
    InconsistentState {
        connection_id: ConnectionId,
        reason: String,
    },

    /// A stored row holds a value this version cannot interpret.
    #[error("invalid stored value in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
}

impl StateError {
    /// Wrap a driver error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Wrap a driver error with the failing operation.
    pub fn backend_context<E>(context: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::BackendContext {
            context,
            source: Box::new(err),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
