//! Live progress of a connection's running job.
//!
//! The stream list is shaped by the job's trigger type:
//!
//! | config type | streams | tag | stats |
//! |---|---|---|---|
//! | `sync` | every catalog stream, catalog order | `sync` | totals, zero-filled |
//! | `refresh` | untouched streams, then refreshed streams | `sync` / `refresh` | totals, zero-filled |
//! | `reset_connection`, `clear` | reset list only, list order | the job's type | none |
//!
//! Job-level counters are only reported for `sync` and `refresh`.

use std::collections::HashMap;

use synctrack_types::catalog::StreamDescriptor;
use synctrack_types::job::{ConfigType, ConnectionId, Job, JobConfig};
use synctrack_types::progress::{ConnectionSyncProgress, StreamSyncProgressItem};
use synctrack_types::stats::{AttemptStats, JobAttemptPair, SyncStats};

use crate::aggregate::{aggregate_job, AggregatedStats};

/// Build the progress view of `connection_id`.
///
/// `running` is the connection's running job, if any; `stats` holds its
/// bulk-loaded attempt stats. Without a running job the view is idle.
#[must_use]
pub fn build_progress(
    connection_id: &ConnectionId,
    running: Option<&Job>,
    stats: &HashMap<JobAttemptPair, AttemptStats>,
) -> ConnectionSyncProgress {
    let Some(job) = running else {
        return ConnectionSyncProgress::idle(connection_id.clone());
    };
    let aggregated = aggregate_job(job, stats);
    shape_progress(connection_id, job, &aggregated)
}

/// Shape already-aggregated totals of `job` into a progress view.
#[must_use]
pub fn shape_progress(
    connection_id: &ConnectionId,
    job: &Job,
    aggregated: &AggregatedStats,
) -> ConnectionSyncProgress {
    let totals: HashMap<&StreamDescriptor, SyncStats> = aggregated
        .streams
        .iter()
        .map(|s| (&s.stream, s.stats))
        .collect();
    let zero_filled = |stream: &StreamDescriptor, config_type: ConfigType| {
        let stats = totals.get(stream).copied().unwrap_or_default();
        StreamSyncProgressItem::with_stats(stream, config_type, stats)
    };

    let mut view = ConnectionSyncProgress {
        job_id: Some(job.id),
        config_type: Some(job.config_type()),
        ..ConnectionSyncProgress::idle(connection_id.clone())
    };

    match &job.config {
        JobConfig::Sync { catalog } => {
            view.streams = catalog
                .descriptors()
                .map(|s| zero_filled(s, ConfigType::Sync))
                .collect();
            set_job_totals(&mut view, job, aggregated.job);
        }
        JobConfig::Refresh {
            catalog,
            streams_to_refresh,
        } => {
            let (refreshed, untouched): (Vec<_>, Vec<_>) = catalog
                .descriptors()
                .partition(|s| streams_to_refresh.contains(s));
            view.streams = untouched
                .into_iter()
                .map(|s| zero_filled(s, ConfigType::Sync))
                .chain(
                    refreshed
                        .into_iter()
                        .map(|s| zero_filled(s, ConfigType::Refresh)),
                )
                .collect();
            set_job_totals(&mut view, job, aggregated.job);
        }
        JobConfig::ResetConnection {
            streams_to_reset, ..
        }
        | JobConfig::Clear {
            streams_to_reset, ..
        } => {
            let config_type = job.config_type();
            view.sync_started_at = Some(job.created_at);
            view.streams = streams_to_reset
                .iter()
                .map(|s| StreamSyncProgressItem::bare(s, config_type))
                .collect();
        }
        JobConfig::CheckConnection | JobConfig::DiscoverSchema => {}
    }

    tracing::debug!(
        connection_id = connection_id.as_str(),
        job_id = job.id,
        config_type = job.config_type().as_str(),
        streams = view.streams.len(),
        "Built sync progress"
    );
    view
}

fn set_job_totals(view: &mut ConnectionSyncProgress, job: &Job, totals: SyncStats) {
    view.sync_started_at = Some(job.created_at);
    view.records_emitted = Some(totals.records_emitted);
    view.bytes_emitted = Some(totals.bytes_emitted);
    view.records_committed = Some(totals.records_committed);
    view.bytes_committed = Some(totals.bytes_committed);
    view.records_rejected = Some(totals.records_rejected);
}
