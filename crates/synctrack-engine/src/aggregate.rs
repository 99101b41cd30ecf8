//! Folds per-attempt per-stream stats into stream and job totals.
//!
//! A stream configured as full refresh restarts on every attempt, so its
//! total is the row of the latest attempt that reported it. Every other
//! stream (including streams absent from the catalog) resumes from the
//! previous checkpoint, so its rows are summed across attempts. Streams that
//! never reported are omitted.

use std::collections::HashMap;

use serde::Serialize;
use synctrack_types::catalog::{ConfiguredCatalog, StreamDescriptor, SyncMode};
use synctrack_types::job::Job;
use synctrack_types::stats::{AttemptStats, JobAttemptPair, StreamSyncStats, SyncStats};

/// Result of [`aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedStats {
    /// Element-wise sum of `streams`.
    pub job: SyncStats,
    /// One entry per stream that reported in any attempt, in order of first
    /// appearance.
    pub streams: Vec<StreamSyncStats>,
}

impl AggregatedStats {
    /// Total of `stream`, if it reported in any attempt.
    #[must_use]
    pub fn stream(&self, stream: &StreamDescriptor) -> Option<&StreamSyncStats> {
        self.streams.iter().find(|s| &s.stream == stream)
    }
}

/// Aggregate the stats of a job's attempts.
///
/// `attempts` yields `(attempt_number, stats)` pairs in any order; they are
/// folded in ascending attempt order. `catalog` supplies each stream's sync
/// mode. Without a catalog every stream accumulates.
pub fn aggregate<'a, I>(catalog: Option<&ConfiguredCatalog>, attempts: I) -> AggregatedStats
where
    I: IntoIterator<Item = (i32, &'a AttemptStats)>,
{
    let mut ordered: Vec<(i32, &AttemptStats)> = attempts.into_iter().collect();
    ordered.sort_by_key(|(attempt_number, _)| *attempt_number);

    let modes = catalog.map(ConfiguredCatalog::sync_modes).unwrap_or_default();
    let mut positions: HashMap<&StreamDescriptor, usize> = HashMap::new();
    let mut streams: Vec<StreamSyncStats> = Vec::new();

    for (_, attempt) in ordered {
        for row in &attempt.streams {
            let Some(&pos) = positions.get(&row.stream) else {
                positions.insert(&row.stream, streams.len());
                streams.push(row.clone());
                continue;
            };
            let replaces = modes
                .get(&row.stream)
                .copied()
                .is_some_and(SyncMode::replaces_prior_attempts);
            merge(&mut streams[pos], row, replaces);
        }
    }

    let job = streams.iter().map(|s| &s.stats).sum();
    AggregatedStats { job, streams }
}

fn merge(total: &mut StreamSyncStats, row: &StreamSyncStats, replaces: bool) {
    if replaces {
        total.clone_from(row);
    } else {
        total.stats += row.stats;
        total.was_backfilled |= row.was_backfilled;
        total.was_resumed |= row.was_resumed;
    }
}

/// Aggregate `job` from bulk-loaded attempt stats.
///
/// Only attempts recorded on the job contribute; attempts without a stats
/// entry reported nothing.
#[must_use]
pub fn aggregate_job(job: &Job, stats: &HashMap<JobAttemptPair, AttemptStats>) -> AggregatedStats {
    let attempts = job.attempts.iter().filter_map(|attempt| {
        stats
            .get(&JobAttemptPair::new(job.id, attempt.attempt_number))
            .map(|s| (attempt.attempt_number, s))
    });
    let aggregated = aggregate(job.config.catalog(), attempts);

    tracing::debug!(
        job_id = job.id,
        attempts = job.attempts.len(),
        streams = aggregated.streams.len(),
        records_committed = aggregated.job.records_committed,
        "Aggregated attempt stats"
    );
    aggregated
}
