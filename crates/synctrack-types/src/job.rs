//! Job and attempt model types.
//!
//! A [`Job`] is one triggered execution of a connection. Retries of the job
//! are recorded as [`Attempt`]s, numbered densely from zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{ConfiguredCatalog, StreamDescriptor};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque connection identifier. Jobs are scoped to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new connection identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for ConnectionId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Job identifier assigned by the job store.
pub type JobId = i64;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Flat tag of a job's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    Sync,
    Refresh,
    ResetConnection,
    Clear,
    CheckConnection,
    DiscoverSchema,
}

impl ConfigType {
    /// Config types that move data for a connection's streams.
    pub const REPLICATION: [Self; 4] = [
        Self::Sync,
        Self::Refresh,
        Self::ResetConnection,
        Self::Clear,
    ];

    /// Replication types that read from the source: resets and clears
    /// only wipe data and are excluded.
    pub const SYNC_REPLICATION: [Self; 2] = [Self::Sync, Self::Refresh];

    /// Storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Refresh => "refresh",
            Self::ResetConnection => "reset_connection",
            Self::Clear => "clear",
            Self::CheckConnection => "check_connection",
            Self::DiscoverSchema => "discover_schema",
        }
    }

    /// Parse a storage string produced by [`ConfigType::as_str`].
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sync" => Some(Self::Sync),
            "refresh" => Some(Self::Refresh),
            "reset_connection" => Some(Self::ResetConnection),
            "clear" => Some(Self::Clear),
            "check_connection" => Some(Self::CheckConnection),
            "discover_schema" => Some(Self::DiscoverSchema),
            _ => None,
        }
    }

    /// Whether jobs of this type carry stream-level semantics.
    #[must_use]
    pub fn is_replication(self) -> bool {
        Self::REPLICATION.contains(&self)
    }
}

impl std::fmt::Display for ConfigType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration snapshot taken when a job is created.
///
/// One variant per [`ConfigType`]; the catalog inside is never mutated
/// after job creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "config_type", rename_all = "snake_case")]
pub enum JobConfig {
    Sync {
        catalog: ConfiguredCatalog,
    },
    Refresh {
        catalog: ConfiguredCatalog,
        streams_to_refresh: Vec<StreamDescriptor>,
    },
    ResetConnection {
        catalog: ConfiguredCatalog,
        streams_to_reset: Vec<StreamDescriptor>,
    },
    Clear {
        catalog: ConfiguredCatalog,
        streams_to_reset: Vec<StreamDescriptor>,
    },
    CheckConnection,
    DiscoverSchema,
}

impl JobConfig {
    #[must_use]
    pub fn config_type(&self) -> ConfigType {
        match self {
            Self::Sync { .. } => ConfigType::Sync,
            Self::Refresh { .. } => ConfigType::Refresh,
            Self::ResetConnection { .. } => ConfigType::ResetConnection,
            Self::Clear { .. } => ConfigType::Clear,
            Self::CheckConnection => ConfigType::CheckConnection,
            Self::DiscoverSchema => ConfigType::DiscoverSchema,
        }
    }

    /// Catalog snapshot, for config types that have one.
    #[must_use]
    pub fn catalog(&self) -> Option<&ConfiguredCatalog> {
        match self {
            Self::Sync { catalog }
            | Self::Refresh { catalog, .. }
            | Self::ResetConnection { catalog, .. }
            | Self::Clear { catalog, .. } => Some(catalog),
            Self::CheckConnection | Self::DiscoverSchema => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Incomplete,
    Failed,
    Succeeded,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Running,
        Self::Incomplete,
        Self::Failed,
        Self::Succeeded,
        Self::Cancelled,
    ];

    /// Statuses of jobs that may still make progress.
    pub const NON_TERMINAL: [Self; 3] = [Self::Pending, Self::Running, Self::Incomplete];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "incomplete" => Some(Self::Incomplete),
            "failed" => Some(Self::Failed),
            "succeeded" => Some(Self::Succeeded),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !Self::NON_TERMINAL.contains(&self)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single attempt. Terminal status is set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Running,
    Failed,
    Succeeded,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "failed" => Some(Self::Failed),
            "succeeded" => Some(Self::Succeeded),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One retry of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt_number: i32,
    pub job_id: JobId,
    pub status: AttemptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// One triggered execution of a connection, with its attempts in
/// ascending `attempt_number` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub scope: ConnectionId,
    pub config: JobConfig,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
}

impl Job {
    #[must_use]
    pub fn config_type(&self) -> ConfigType {
        self.config.config_type()
    }
}

/// Inclusive window on a job timestamp. A missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Whether both bounds are set and `start` is after `end`.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(start), Some(end)) if start > end)
    }
}

/// Job timestamp a listing is sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOrderField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl JobOrderField {
    /// Column name in the jobs table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Sort order of a job listing. Defaults to newest created first; ties
/// break on job id in the same direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOrder {
    pub field: JobOrderField,
    pub direction: SortDirection,
}

/// Filter and page window for listing jobs from a store.
///
/// Empty `config_types` or `statuses` match nothing and everything
/// respectively: a query must name at least one config type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    pub config_types: Vec<ConfigType>,
    pub scope: Option<ConnectionId>,
    pub statuses: Vec<JobStatus>,
    pub created_at: TimeRange,
    pub updated_at: TimeRange,
    pub order: JobOrder,
    pub limit: u32,
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ConfiguredStream, SyncMode};

    fn catalog() -> ConfiguredCatalog {
        ConfiguredCatalog {
            streams: vec![ConfiguredStream {
                stream: StreamDescriptor::new("users"),
                sync_mode: SyncMode::Incremental,
            }],
        }
    }

    #[test]
    fn time_range_inversion() {
        let start = Utc::now();
        let end = start + chrono::Duration::minutes(5);
        let forward = TimeRange {
            start: Some(start),
            end: Some(end),
        };
        assert!(!forward.is_inverted());
        let backward = TimeRange {
            start: Some(end),
            end: Some(start),
        };
        assert!(backward.is_inverted());
        assert!(!TimeRange {
            start: Some(end),
            end: None
        }
        .is_inverted());
        assert!(!TimeRange::default().is_inverted());
    }

    #[test]
    fn job_order_defaults_to_newest_created() {
        let order = JobOrder::default();
        assert_eq!(order.field, JobOrderField::CreatedAt);
        assert_eq!(order.direction, SortDirection::Desc);
        assert_eq!(JobOrderField::parse("updated_at"), Some(JobOrderField::UpdatedAt));
        assert_eq!(SortDirection::parse("asc"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }

    #[test]
    fn connection_id_display_and_as_str() {
        let id = ConnectionId::new("conn-1");
        assert_eq!(id.as_str(), "conn-1");
        assert_eq!(id.to_string(), "conn-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conn-1\"");
    }

    #[test]
    fn config_type_storage_strings_roundtrip() {
        for ty in [
            ConfigType::Sync,
            ConfigType::Refresh,
            ConfigType::ResetConnection,
            ConfigType::Clear,
            ConfigType::CheckConnection,
            ConfigType::DiscoverSchema,
        ] {
            assert_eq!(ConfigType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ConfigType::parse("bogus"), None);
    }

    #[test]
    fn replication_types() {
        assert!(ConfigType::Sync.is_replication());
        assert!(ConfigType::Clear.is_replication());
        assert!(!ConfigType::CheckConnection.is_replication());
        assert!(!ConfigType::DiscoverSchema.is_replication());
    }

    #[test]
    fn job_config_is_tagged_by_config_type() {
        let config = JobConfig::Refresh {
            catalog: catalog(),
            streams_to_refresh: vec![StreamDescriptor::new("users")],
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["config_type"], "refresh");
        let back: JobConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.config_type(), ConfigType::Refresh);
    }

    #[test]
    fn non_replication_configs_have_no_catalog() {
        assert!(JobConfig::CheckConnection.catalog().is_none());
        assert!(JobConfig::Sync { catalog: catalog() }.catalog().is_some());
    }

    #[test]
    fn job_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Incomplete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn attempt_status_parse() {
        assert_eq!(AttemptStatus::parse("running"), Some(AttemptStatus::Running));
        assert!(AttemptStatus::Failed.is_terminal());
        assert!(!AttemptStatus::Running.is_terminal());
    }
}
