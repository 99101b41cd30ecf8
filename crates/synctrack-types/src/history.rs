//! Job history read models: jobs with their attempts and aggregated stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::StreamDescriptor;
use crate::job::{
    Attempt, ConfigType, ConnectionId, Job, JobId, JobOrder, JobOrderField, JobStatus,
    SortDirection, TimeRange,
};
use crate::stats::{StreamSyncStats, SyncStats};

/// Page window of a listing request. Missing fields use service defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_offset: Option<u32>,
}

/// Request to list jobs, newest first unless an order is named.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListRequest {
    /// Must not be empty.
    pub config_types: Vec<ConfigType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<ConnectionId>,
    /// Empty means any status.
    #[serde(default)]
    pub statuses: Vec<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub created_at: TimeRange,
    #[serde(default)]
    pub updated_at: TimeRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by_field: Option<JobOrderField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by_method: Option<SortDirection>,
    /// Grow the first page in multiples of the page size until it contains
    /// this job. Only `config_types` and `config_id` filter such a listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub including_job_id: Option<JobId>,
}

impl JobListRequest {
    /// Requested sort order. Without a field the listing is newest created
    /// first and `order_by_method` is ignored.
    #[must_use]
    pub fn order(&self) -> JobOrder {
        match self.order_by_field {
            None => JobOrder::default(),
            Some(field) => JobOrder {
                field,
                direction: self.order_by_method.unwrap_or_default(),
            },
        }
    }
}

/// Job summary with stats aggregated over all attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRead {
    pub id: JobId,
    pub config_type: ConfigType,
    pub config_id: ConnectionId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub enabled_streams: Vec<StreamDescriptor>,
    pub aggregated_stats: SyncStats,
    pub stream_aggregated_stats: Vec<StreamSyncStats>,
}

impl JobRead {
    /// Summary of `job` with zeroed stats, to be hydrated afterwards.
    #[must_use]
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id,
            config_type: job.config_type(),
            config_id: job.scope.clone(),
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            enabled_streams: job
                .config
                .catalog()
                .map(|c| c.descriptors().cloned().collect())
                .unwrap_or_default(),
            aggregated_stats: SyncStats::default(),
            stream_aggregated_stats: Vec::new(),
        }
    }
}

/// One attempt with the stats it reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptWithStats {
    pub attempt: Attempt,
    pub total_stats: SyncStats,
    pub stream_stats: Vec<StreamSyncStats>,
}

/// Job summary plus its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobWithAttempts {
    pub job: JobRead,
    pub attempts: Vec<AttemptWithStats>,
}

/// One page of job history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReadList {
    pub jobs: Vec<JobWithAttempts>,
    pub total_job_count: u64,
}
