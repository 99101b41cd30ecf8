//! Persistence for synctrack.
//!
//! Provides the [`JobStore`] and [`StateStore`] contracts and a
//! [`SqliteStore`] implementing both: job and attempt records, per-attempt
//! per-stream stats, and one checkpoint per connection.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::{JobStore, StateStore};
pub use error::StateError;
pub use sqlite::SqliteStore;

/// Common imports for store consumers.
pub mod prelude {
    pub use crate::backend::{JobStore, StateStore};
    pub use crate::error::StateError;
    pub use crate::sqlite::SqliteStore;
    pub use synctrack_types::catalog::{
        ConfiguredCatalog, ConfiguredStream, StreamDescriptor, SyncMode,
    };
    pub use synctrack_types::job::{
        AttemptStatus, ConfigType, ConnectionId, Job, JobConfig, JobId, JobQuery, JobStatus,
    };
    pub use synctrack_types::state::{GlobalState, StateWrapper, StreamState};
    pub use synctrack_types::stats::{AttemptStats, JobAttemptPair, StreamSyncStats, SyncStats};
}
