//! Record and byte counters reported per attempt and per stream.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::catalog::StreamDescriptor;
use crate::job::JobId;

/// Emitted/committed/rejected counters.
///
/// The same shape is used for a single stream in a single attempt, for a
/// stream aggregated over a job, and for job-level totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncStats {
    pub records_emitted: u64,
    pub bytes_emitted: u64,
    pub records_committed: u64,
    pub bytes_committed: u64,
    #[serde(default)]
    pub records_rejected: u64,
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, rhs: Self) {
        self.records_emitted = self.records_emitted.saturating_add(rhs.records_emitted);
        self.bytes_emitted = self.bytes_emitted.saturating_add(rhs.bytes_emitted);
        self.records_committed = self.records_committed.saturating_add(rhs.records_committed);
        self.bytes_committed = self.bytes_committed.saturating_add(rhs.bytes_committed);
        self.records_rejected = self.records_rejected.saturating_add(rhs.records_rejected);
    }
}

impl Add for SyncStats {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sum for SyncStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a SyncStats> for SyncStats {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Counters for one stream, plus how the stream was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSyncStats {
    pub stream: StreamDescriptor,
    pub stats: SyncStats,
    /// The stream re-read historical data during this attempt.
    #[serde(default)]
    pub was_backfilled: bool,
    /// The stream resumed from a checkpoint written by a prior attempt.
    #[serde(default)]
    pub was_resumed: bool,
}

impl StreamSyncStats {
    #[must_use]
    pub fn new(stream: StreamDescriptor, stats: SyncStats) -> Self {
        Self {
            stream,
            stats,
            was_backfilled: false,
            was_resumed: false,
        }
    }
}

/// Stats of one attempt: the per-stream rows and their sum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptStats {
    pub combined: SyncStats,
    pub streams: Vec<StreamSyncStats>,
}

impl AttemptStats {
    /// Build from stream rows, computing `combined`.
    #[must_use]
    pub fn from_streams(streams: Vec<StreamSyncStats>) -> Self {
        let combined = streams.iter().map(|s| &s.stats).sum();
        Self { combined, streams }
    }
}

/// Key of an attempt across jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobAttemptPair {
    pub job_id: JobId,
    pub attempt_number: i32,
}

impl JobAttemptPair {
    #[must_use]
    pub fn new(job_id: JobId, attempt_number: i32) -> Self {
        Self {
            job_id,
            attempt_number,
        }
    }
}
