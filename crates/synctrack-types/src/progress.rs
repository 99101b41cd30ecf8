//! Live sync progress read model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::StreamDescriptor;
use crate::job::{ConfigType, ConnectionId, JobId};
use crate::stats::SyncStats;

/// Progress of one stream within the running job.
///
/// Counters are absent for streams that carry no record counts (clears).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSyncProgressItem {
    pub stream_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_namespace: Option<String>,
    pub config_type: ConfigType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_emitted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_emitted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_committed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_committed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_rejected: Option<u64>,
}

impl StreamSyncProgressItem {
    /// Entry without counters.
    #[must_use]
    pub fn bare(stream: &StreamDescriptor, config_type: ConfigType) -> Self {
        Self {
            stream_name: stream.name.clone(),
            stream_namespace: stream.namespace.clone(),
            config_type,
            records_emitted: None,
            bytes_emitted: None,
            records_committed: None,
            bytes_committed: None,
            records_rejected: None,
        }
    }

    /// Entry with every counter populated from `stats`.
    #[must_use]
    pub fn with_stats(stream: &StreamDescriptor, config_type: ConfigType, stats: SyncStats) -> Self {
        Self {
            records_emitted: Some(stats.records_emitted),
            bytes_emitted: Some(stats.bytes_emitted),
            records_committed: Some(stats.records_committed),
            bytes_committed: Some(stats.bytes_committed),
            records_rejected: Some(stats.records_rejected),
            ..Self::bare(stream, config_type)
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor {
            name: self.stream_name.clone(),
            namespace: self.stream_namespace.clone(),
        }
    }
}

/// Progress of the job currently running for a connection.
///
/// With no running job only `connection_id` is set and `streams` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSyncProgress {
    pub connection_id: ConnectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_type: Option<ConfigType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_emitted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_emitted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_committed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_committed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_rejected: Option<u64>,
    pub streams: Vec<StreamSyncProgressItem>,
}

impl ConnectionSyncProgress {
    /// View for a connection with nothing running.
    #[must_use]
    pub fn idle(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            job_id: None,
            sync_started_at: None,
            config_type: None,
            records_emitted: None,
            bytes_emitted: None,
            records_committed: None,
            bytes_committed: None,
            records_rejected: None,
            streams: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.job_id.is_none()
    }
}
