//! Connection checkpoint reads and writes.
//!
//! Any checkpoint type may replace any other; writes overwrite wholesale.
//! Writing `not_set` erases the stored checkpoint.
//!
//! [`StateTracker::create_or_update_state_safe`] refuses to write while a
//! replication job is in flight. The check and the write are two separate
//! store calls, so a sync starting between them is not detected.

use std::sync::Arc;

use synctrack_state::StateStore;
use synctrack_types::job::ConnectionId;
use synctrack_types::state::{ConnectionCheckpoint, ConnectionState, MalformedState};

use crate::errors::{Result, TrackerError};
use crate::history::JobHistory;

/// Reads and writes connection checkpoints over a [`StateStore`].
pub struct StateTracker {
    store: Arc<dyn StateStore>,
    history: JobHistory,
}

impl StateTracker {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, history: JobHistory) -> Self {
        Self { store, history }
    }

    /// Current checkpoint of a connection in wire form.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] on store failure.
    pub fn get_state(&self, connection_id: &ConnectionId) -> Result<ConnectionState> {
        let stored = self.store.get_current_state(connection_id)?;
        Ok(ConnectionCheckpoint::from(stored).into_wire(connection_id.clone()))
    }

    /// Overwrite the checkpoint of a connection, returning the stored result.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::MalformedState`] if `new_state` fails
    /// validation, or [`TrackerError::Store`] on store failure.
    pub fn create_or_update_state(
        &self,
        connection_id: &ConnectionId,
        new_state: ConnectionState,
    ) -> Result<ConnectionState> {
        let checkpoint = validate(connection_id, new_state)?;
        self.write(connection_id, checkpoint)
    }

    /// Like [`create_or_update_state`](Self::create_or_update_state), but
    /// rejected while a sync is running for the connection.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::SyncIsRunning`] without writing when a
    /// replication job is in flight, plus the errors of
    /// [`create_or_update_state`](Self::create_or_update_state).
    pub fn create_or_update_state_safe(
        &self,
        connection_id: &ConnectionId,
        new_state: ConnectionState,
    ) -> Result<ConnectionState> {
        let checkpoint = validate(connection_id, new_state)?;

        if let Some(job) = self.history.get_latest_running_sync_job(connection_id)? {
            tracing::warn!(
                connection_id = connection_id.as_str(),
                job_id = job.id,
                config_type = job.config_type().as_str(),
                "Rejected state update while a sync is running"
            );
            return Err(TrackerError::SyncIsRunning {
                connection_id: connection_id.clone(),
                job_id: job.id,
            });
        }

        self.write(connection_id, checkpoint)
    }

    fn write(
        &self,
        connection_id: &ConnectionId,
        checkpoint: ConnectionCheckpoint,
    ) -> Result<ConnectionState> {
        let state_type = checkpoint.state_type();
        match checkpoint.into_wrapper() {
            Some(wrapper) => self.store.update_or_create_state(connection_id, &wrapper)?,
            None => self.store.erase_state(connection_id)?,
        }
        tracing::info!(
            connection_id = connection_id.as_str(),
            state_type = ?state_type,
            "Connection state written"
        );
        self.get_state(connection_id)
    }
}

/// Validate a wire value addressed to `connection_id`.
fn validate(
    connection_id: &ConnectionId,
    new_state: ConnectionState,
) -> std::result::Result<ConnectionCheckpoint, MalformedState> {
    if &new_state.connection_id != connection_id {
        return Err(MalformedState {
            reason: format!(
                "state addressed to connection {} was sent to connection {connection_id}",
                new_state.connection_id
            ),
        });
    }
    ConnectionCheckpoint::try_from(new_state)
}
