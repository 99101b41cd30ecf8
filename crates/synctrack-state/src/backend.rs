//! Store contracts consumed by the engine.
//!
//! [`JobStore`] owns job, attempt, and attempt-stats records.
//! [`StateStore`] owns one checkpoint per connection. Model types live in
//! [`synctrack_types`].

use std::collections::HashMap;

use synctrack_types::job::{AttemptStatus, ConnectionId, Job, JobConfig, JobId, JobQuery, JobStatus};
use synctrack_types::state::StateWrapper;
use synctrack_types::stats::{AttemptStats, JobAttemptPair, StreamSyncStats};

use crate::error;

/// Storage contract for jobs, attempts, and their per-stream stats.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn JobStore>`.
pub trait JobStore: Send + Sync {
    /// Read one job with its attempts in ascending attempt order.
    ///
    /// Returns `Ok(None)` when no job has that id.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_job(&self, job_id: JobId) -> error::Result<Option<Job>>;

    /// List jobs matching `query`, newest first, honouring its page window.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_jobs(&self, query: &JobQuery) -> error::Result<Vec<Job>>;

    /// Count jobs matching `query`, ignoring its page window.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn count_jobs(&self, query: &JobQuery) -> error::Result<u64>;

    /// Non-terminal replication jobs for a connection, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_running_jobs_for_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> error::Result<Vec<Job>>;

    /// Bulk-read per-stream stats of every attempt of the given jobs.
    ///
    /// Attempts that reported nothing are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_attempt_stats(
        &self,
        job_ids: &[JobId],
    ) -> error::Result<HashMap<JobAttemptPair, AttemptStats>>;

    /// Create a pending job, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn create_job(&self, scope: &ConnectionId, config: &JobConfig) -> error::Result<JobId>;

    /// Start the next attempt of a job, returning its number, and mark the
    /// job running.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::JobNotFound`](crate::error::StateError::JobNotFound)
    /// for an unknown job, or another [`StateError`](crate::error::StateError)
    /// on storage failure.
    fn create_attempt(&self, job_id: JobId) -> error::Result<i32>;

    /// Set the terminal status of an attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_attempt(
        &self,
        job_id: JobId,
        attempt_number: i32,
        status: AttemptStatus,
    ) -> error::Result<()>;

    /// Update the status of a job.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::JobNotFound`](crate::error::StateError::JobNotFound)
    /// for an unknown job, or another [`StateError`](crate::error::StateError)
    /// on storage failure.
    fn set_job_status(&self, job_id: JobId, status: JobStatus) -> error::Result<()>;

    /// Upsert per-stream stats for one attempt. A later write for the same
    /// (attempt, stream) replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn write_attempt_stats(
        &self,
        job_id: JobId,
        attempt_number: i32,
        streams: &[StreamSyncStats],
    ) -> error::Result<()>;
}

/// Storage contract for connection checkpoints.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateStore>`.
pub trait StateStore: Send + Sync {
    /// Read the checkpoint of a connection.
    ///
    /// Returns `Ok(None)` when no checkpoint has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure or
    /// when stored rows are inconsistent.
    fn get_current_state(&self, connection_id: &ConnectionId)
        -> error::Result<Option<StateWrapper>>;

    /// Replace the checkpoint of a connection wholesale, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn update_or_create_state(
        &self,
        connection_id: &ConnectionId,
        state: &StateWrapper,
    ) -> error::Result<()>;

    /// Remove any checkpoint of a connection.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn erase_state(&self, connection_id: &ConnectionId) -> error::Result<()>;
}
