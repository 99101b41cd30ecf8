//! Integration tests for config loading, job history, progress, and state
//! tracking against a file-backed SQLite store.
//!
//! These exercise the public API the CLI uses, end to end.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use synctrack_engine::config::{self, parser, validator, StoreBackendKind};
use synctrack_engine::{JobHistory, StateTracker, TrackerError};
use synctrack_state::prelude::*;
use synctrack_types::history::JobListRequest;
use synctrack_types::state::{ConnectionCheckpoint, ConnectionState, ConnectionStateType};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures/config")
        .join(name)
}

fn records(n: u64) -> SyncStats {
    SyncStats {
        records_emitted: n,
        bytes_emitted: n * 100,
        records_committed: n,
        bytes_committed: n * 100,
        records_rejected: 0,
    }
}

fn stream(name: &str, mode: SyncMode) -> ConfiguredStream {
    ConfiguredStream {
        stream: StreamDescriptor::new(name),
        sync_mode: mode,
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<SqliteStore>,
    history: JobHistory,
    tracker: StateTracker,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("synctrack.db")).unwrap());
        let history = JobHistory::new(store.clone());
        let tracker = StateTracker::new(store.clone(), history.clone());
        Self {
            _dir: dir,
            store,
            history,
            tracker,
        }
    }

    fn run_attempt(&self, job_id: JobId, rows: &[(&str, u64)], status: AttemptStatus) {
        let attempt = self.store.create_attempt(job_id).unwrap();
        let stats: Vec<StreamSyncStats> = rows
            .iter()
            .map(|(name, n)| StreamSyncStats::new(StreamDescriptor::new(*name), records(*n)))
            .collect();
        self.store.write_attempt_stats(job_id, attempt, &stats).unwrap();
        if status != AttemptStatus::Running {
            self.store.complete_attempt(job_id, attempt, status).unwrap();
        }
    }
}

/// Parse, substitute, and validate the full fixture.
#[test]
fn test_load_fixture_config() {
    std::env::set_var("TEST_SYNCTRACK_DB_DIR", "/tmp/synctrack-fixture");

    let config = config::load(&fixture("sqlite_store.yaml")).expect("fixture should load");
    assert_eq!(config.store.backend, StoreBackendKind::Sqlite);
    assert_eq!(
        config.store.path.as_deref(),
        Some(Path::new("/tmp/synctrack-fixture/synctrack.db"))
    );
    assert_eq!(config.history.default_page_size, 25);

    std::env::remove_var("TEST_SYNCTRACK_DB_DIR");
}

#[test]
fn test_minimal_config_gets_defaults() {
    let config = config::load(&fixture("minimal.yaml")).unwrap();
    assert_eq!(config.history.default_page_size, JobHistory::DEFAULT_PAGE_SIZE);
}

#[test]
fn test_invalid_fixture_fails_validation() {
    let config = parser::parse_config(&fixture("invalid_config.yaml")).unwrap();
    let err = validator::validate_config(&config).unwrap_err().to_string();
    assert!(err.contains("store.path"));
    assert!(err.contains("default_page_size"));
}

/// A retried sync: the full-refresh stream restarts, the incremental stream
/// resumes, and the listing and progress views agree on the totals.
#[test]
fn test_retried_sync_history_and_progress() {
    let h = Harness::new();
    let conn = ConnectionId::new("conn-retry");
    let catalog = ConfiguredCatalog {
        streams: vec![
            stream("users", SyncMode::FullRefresh),
            stream("orders", SyncMode::Incremental),
            stream("events", SyncMode::Cdc),
        ],
    };
    let job_id = h.store.create_job(&conn, &JobConfig::Sync { catalog }).unwrap();
    h.run_attempt(job_id, &[("users", 5), ("orders", 50)], AttemptStatus::Failed);
    h.run_attempt(job_id, &[("users", 500), ("orders", 5000)], AttemptStatus::Running);

    let info = h.history.get_job_info(job_id).unwrap();
    let users = info
        .job
        .stream_aggregated_stats
        .iter()
        .find(|s| s.stream.name == "users")
        .unwrap();
    let orders = info
        .job
        .stream_aggregated_stats
        .iter()
        .find(|s| s.stream.name == "orders")
        .unwrap();
    assert_eq!(users.stats.records_emitted, 500);
    assert_eq!(orders.stats.records_emitted, 5050);
    assert_eq!(info.job.aggregated_stats.records_emitted, 5550);
    assert_eq!(info.job.stream_aggregated_stats.len(), 2);

    let progress = h.history.get_connection_sync_progress(&conn).unwrap();
    assert_eq!(progress.job_id, Some(job_id));
    assert_eq!(progress.records_emitted, Some(5550));
    let emitted: Vec<(&str, Option<u64>)> = progress
        .streams
        .iter()
        .map(|s| (s.stream_name.as_str(), s.records_emitted))
        .collect();
    assert_eq!(
        emitted,
        vec![("users", Some(500)), ("orders", Some(5050)), ("events", Some(0))]
    );

    h.store.set_job_status(job_id, JobStatus::Succeeded).unwrap();
    assert!(h.history.get_connection_sync_progress(&conn).unwrap().is_idle());
}

#[test]
fn test_refresh_progress_through_store() {
    let h = Harness::new();
    let conn = ConnectionId::new("conn-refresh");
    let job_id = h
        .store
        .create_job(
            &conn,
            &JobConfig::Refresh {
                catalog: ConfiguredCatalog {
                    streams: vec![
                        stream("s2", SyncMode::FullRefresh),
                        stream("s3", SyncMode::Incremental),
                    ],
                },
                streams_to_refresh: vec![StreamDescriptor::new("s2")],
            },
        )
        .unwrap();
    h.run_attempt(job_id, &[("s2", 3)], AttemptStatus::Running);

    let progress = h.history.get_connection_sync_progress(&conn).unwrap();
    let order: Vec<(&str, ConfigType)> = progress
        .streams
        .iter()
        .map(|s| (s.stream_name.as_str(), s.config_type))
        .collect();
    assert_eq!(
        order,
        vec![("s3", ConfigType::Sync), ("s2", ConfigType::Refresh)]
    );
    assert_eq!(progress.config_type, Some(ConfigType::Refresh));
}

#[test]
fn test_listing_filters_by_connection_type_and_status() {
    let h = Harness::new();
    let a = ConnectionId::new("conn-a");
    let b = ConnectionId::new("conn-b");
    let empty = || JobConfig::Sync {
        catalog: ConfiguredCatalog::default(),
    };
    let a1 = h.store.create_job(&a, &empty()).unwrap();
    h.store.set_job_status(a1, JobStatus::Failed).unwrap();
    let a2 = h.store.create_job(&a, &empty()).unwrap();
    h.store.create_job(&b, &empty()).unwrap();
    h.store.create_job(&a, &JobConfig::CheckConnection).unwrap();

    let list = h
        .history
        .list_jobs(&JobListRequest {
            config_types: vec![ConfigType::Sync],
            config_id: Some(a.clone()),
            ..JobListRequest::default()
        })
        .unwrap();
    let ids: Vec<JobId> = list.jobs.iter().map(|j| j.job.id).collect();
    assert_eq!(ids, vec![a2, a1]);
    assert_eq!(list.total_job_count, 2);

    let failed = h
        .history
        .list_jobs(&JobListRequest {
            config_types: vec![ConfigType::Sync, ConfigType::CheckConnection],
            config_id: Some(a),
            statuses: vec![JobStatus::Failed],
            ..JobListRequest::default()
        })
        .unwrap();
    assert_eq!(failed.total_job_count, 1);
    assert_eq!(failed.jobs[0].job.id, a1);
}

#[test]
fn test_state_lifecycle_with_running_sync() {
    let h = Harness::new();
    let conn = ConnectionId::new("conn-state");
    assert_eq!(
        h.tracker.get_state(&conn).unwrap().state_type,
        ConnectionStateType::NotSet
    );

    let global = ConnectionCheckpoint::Global(GlobalState {
        shared_state: json!({"lsn": 100}),
        stream_states: vec![StreamState {
            stream_descriptor: StreamDescriptor::new("users"),
            stream_state: json!({"pk": 1}),
        }],
    })
    .into_wire(conn.clone());
    let written = h.tracker.create_or_update_state_safe(&conn, global.clone()).unwrap();
    assert_eq!(written, global);
    assert!(written.state.is_none());
    assert!(written.stream_state.is_none());

    let job_id = h
        .store
        .create_job(
            &conn,
            &JobConfig::ResetConnection {
                catalog: ConfiguredCatalog::default(),
                streams_to_reset: vec![StreamDescriptor::new("users")],
            },
        )
        .unwrap();
    h.store.create_attempt(job_id).unwrap();

    let err = h
        .tracker
        .create_or_update_state_safe(&conn, ConnectionState::not_set(conn.clone()))
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(err, TrackerError::SyncIsRunning { job_id: id, .. } if id == job_id));
    assert_eq!(h.tracker.get_state(&conn).unwrap(), global);

    let forced = h
        .tracker
        .create_or_update_state(&conn, ConnectionState::not_set(conn.clone()))
        .unwrap();
    assert_eq!(forced, ConnectionState::not_set(conn));
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let conn = ConnectionId::new("conn-persist");
    let wire = ConnectionCheckpoint::Legacy(json!({"cursor": "abc"})).into_wire(conn.clone());

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let tracker = StateTracker::new(store.clone(), JobHistory::new(store));
        tracker.create_or_update_state(&conn, wire.clone()).unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let tracker = StateTracker::new(store.clone(), JobHistory::new(store));
    assert_eq!(tracker.get_state(&conn).unwrap(), wire);
}
