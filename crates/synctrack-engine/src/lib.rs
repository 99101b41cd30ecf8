//! Engine crate for synctrack: what happened, and what is happening right
//! now, to a connection's streams.
//!
//! - [`aggregate`] folds per-attempt per-stream stats into job and stream totals.
//! - [`progress`] shapes the live view of a running job per trigger type.
//! - [`history`] lists jobs with their hydrated stats.
//! - [`tracker`] reads and writes connection checkpoints.

pub mod aggregate;
pub mod config;
pub mod errors;
pub mod history;
pub mod progress;
pub mod tracker;

// Re-export public API for convenience
pub use aggregate::{aggregate, aggregate_job, AggregatedStats};
pub use errors::TrackerError;
pub use history::JobHistory;
pub use progress::build_progress;
pub use tracker::StateTracker;
