//! `SQLite`-backed implementation of [`JobStore`] and [`StateStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use synctrack_types::catalog::StreamDescriptor;
use synctrack_types::job::{
    Attempt, AttemptStatus, ConfigType, ConnectionId, Job, JobConfig, JobId, JobQuery, JobStatus,
};
use synctrack_types::state::{GlobalState, StateType, StateWrapper, StreamState};
use synctrack_types::stats::{AttemptStats, JobAttemptPair, StreamSyncStats, SyncStats};

use crate::backend::{JobStore, StateStore};
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, millisecond precision, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Idempotent DDL for store tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    config_type TEXT NOT NULL,
    scope TEXT NOT NULL,
    config_json TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_scope_created ON jobs (scope, created_at);

CREATE TABLE IF NOT EXISTS attempts (
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    attempt_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    ended_at TEXT,
    PRIMARY KEY (job_id, attempt_number)
);

CREATE TABLE IF NOT EXISTS stream_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL,
    attempt_number INTEGER NOT NULL,
    stream_name TEXT NOT NULL,
    stream_namespace TEXT,
    records_emitted INTEGER NOT NULL DEFAULT 0,
    bytes_emitted INTEGER NOT NULL DEFAULT 0,
    records_committed INTEGER NOT NULL DEFAULT 0,
    bytes_committed INTEGER NOT NULL DEFAULT 0,
    records_rejected INTEGER NOT NULL DEFAULT 0,
    was_backfilled INTEGER NOT NULL DEFAULT 0,
    was_resumed INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (job_id, attempt_number) REFERENCES attempts(job_id, attempt_number)
);

CREATE INDEX IF NOT EXISTS idx_stream_stats_attempt ON stream_stats (job_id, attempt_number);

CREATE TABLE IF NOT EXISTS connection_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    connection_id TEXT NOT NULL,
    stream_name TEXT,
    stream_namespace TEXT,
    state_type TEXT NOT NULL,
    state_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_connection_state_conn ON connection_state (connection_id);
";

const JOB_COLUMNS: &str = "id, scope, config_json, status, created_at, updated_at";

/// Raw `jobs` row before decoding.
struct JobRow {
    id: JobId,
    scope: String,
    config_json: String,
    status: String,
    created_at: String,
    updated_at: String,
}

/// Raw `connection_state` row before decoding.
struct StateRow {
    stream_name: Option<String>,
    stream_namespace: Option<String>,
    state_type: String,
    state_json: String,
}

/// Raw `stream_stats` row before counter conversion.
struct StatsRow {
    pair: JobAttemptPair,
    stream: StreamDescriptor,
    counters: [i64; 5],
    was_backfilled: bool,
    was_resumed: bool,
}

/// `SQLite`-backed job and state storage.
///
/// Create with [`SqliteStore::open`] for file-backed persistence
/// or [`SqliteStore::in_memory`] for tests.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a `SQLite` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(StateError::backend)?;
        Self::init(conn)
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StateError::backend)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Format current UTC time for `SQLite` storage.
    fn now_sqlite() -> String {
        Self::to_sqlite(&Utc::now())
    }

    fn to_sqlite(ts: &DateTime<Utc>) -> String {
        ts.format(SQLITE_DATETIME_FMT).to_string()
    }

    fn parse_sqlite(table: &'static str, raw: &str) -> error::Result<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT)
            .map(|ndt| ndt.and_utc())
            .map_err(|e| StateError::InvalidRow {
                table,
                reason: format!("bad timestamp '{raw}': {e}"),
            })
    }

    /// Stats counters are stored as `INTEGER` (i64); values beyond its
    /// range are rejected instead of wrapping.
    fn counter_to_sql(column: &'static str, value: u64) -> error::Result<i64> {
        i64::try_from(value).map_err(|_| StateError::InvalidRow {
            table: "stream_stats",
            reason: format!("{column} value {value} exceeds the storable range"),
        })
    }

    fn counter_from_sql(column: &'static str, raw: i64) -> error::Result<u64> {
        u64::try_from(raw).map_err(|_| StateError::InvalidRow {
            table: "stream_stats",
            reason: format!("negative {column} value {raw}"),
        })
    }

    /// `?, ?, ?` with `n` placeholders.
    fn placeholders(n: usize) -> String {
        vec!["?"; n].join(", ")
    }

    /// WHERE clause and bind values for a job query. `None` when the
    /// query cannot match anything.
    fn job_filter(query: &JobQuery) -> Option<(String, Vec<SqlValue>)> {
        if query.config_types.is_empty() {
            return None;
        }
        let mut clauses = vec![format!(
            "config_type IN ({})",
            Self::placeholders(query.config_types.len())
        )];
        let mut values: Vec<SqlValue> = query
            .config_types
            .iter()
            .map(|t| SqlValue::Text(t.as_str().to_string()))
            .collect();

        if let Some(scope) = &query.scope {
            clauses.push("scope = ?".to_string());
            values.push(SqlValue::Text(scope.as_str().to_string()));
        }
        if !query.statuses.is_empty() {
            clauses.push(format!(
                "status IN ({})",
                Self::placeholders(query.statuses.len())
            ));
            values.extend(
                query
                    .statuses
                    .iter()
                    .map(|s| SqlValue::Text(s.as_str().to_string())),
            );
        }
        // Stored timestamps share one fixed-width format, so text order is
        // time order.
        let windows = [
            ("created_at", &query.created_at),
            ("updated_at", &query.updated_at),
        ];
        for (column, range) in windows {
            if let Some(start) = &range.start {
                clauses.push(format!("{column} >= ?"));
                values.push(SqlValue::Text(Self::to_sqlite(start)));
            }
            if let Some(end) = &range.end {
                clauses.push(format!("{column} <= ?"));
                values.push(SqlValue::Text(Self::to_sqlite(end)));
            }
        }
        Some((clauses.join(" AND "), values))
    }

    fn query_jobs(conn: &Connection, query: &JobQuery) -> error::Result<Vec<Job>> {
        let Some((filter, mut values)) = Self::job_filter(query) else {
            return Ok(Vec::new());
        };
        values.push(SqlValue::Integer(i64::from(query.limit)));
        values.push(SqlValue::Integer(i64::from(query.offset)));

        let column = query.order.field.as_str();
        let direction = query.order.direction.as_sql();
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE {filter} \
             ORDER BY {column} {direction}, id {direction} LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql).map_err(StateError::backend)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), Self::read_job_row)
            .map_err(StateError::backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::backend)?;

        Self::hydrate_jobs(conn, rows)
    }

    fn read_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
        Ok(JobRow {
            id: row.get(0)?,
            scope: row.get(1)?,
            config_json: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    /// Decode job rows and attach their attempts.
    fn hydrate_jobs(conn: &Connection, rows: Vec<JobRow>) -> error::Result<Vec<Job>> {
        let ids: Vec<JobId> = rows.iter().map(|r| r.id).collect();
        let mut attempts = Self::load_attempts(conn, &ids)?;

        rows.into_iter()
            .map(|row| {
                let job_attempts = attempts.remove(&row.id).unwrap_or_default();
                Self::decode_job(row, job_attempts)
            })
            .collect()
    }

    fn decode_job(row: JobRow, attempts: Vec<Attempt>) -> error::Result<Job> {
        let config: JobConfig = serde_json::from_str(&row.config_json)?;
        let status = JobStatus::parse(&row.status).ok_or_else(|| StateError::InvalidRow {
            table: "jobs",
            reason: format!("unknown job status '{}'", row.status),
        })?;
        Ok(Job {
            id: row.id,
            scope: ConnectionId::new(row.scope),
            config,
            status,
            created_at: Self::parse_sqlite("jobs", &row.created_at)?,
            updated_at: Self::parse_sqlite("jobs", &row.updated_at)?,
            attempts,
        })
    }

    fn load_attempts(
        conn: &Connection,
        job_ids: &[JobId],
    ) -> error::Result<HashMap<JobId, Vec<Attempt>>> {
        let mut by_job: HashMap<JobId, Vec<Attempt>> = HashMap::new();
        if job_ids.is_empty() {
            return Ok(by_job);
        }

        let sql = format!(
            "SELECT job_id, attempt_number, status, created_at, updated_at, ended_at \
             FROM attempts WHERE job_id IN ({}) ORDER BY job_id, attempt_number",
            Self::placeholders(job_ids.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(StateError::backend)?;
        let rows = stmt
            .query_map(params_from_iter(job_ids.iter()), |row| {
                Ok((
                    row.get::<_, JobId>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .map_err(StateError::backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::backend)?;

        for (job_id, attempt_number, status, created_at, updated_at, ended_at) in rows {
            let status = AttemptStatus::parse(&status).ok_or_else(|| StateError::InvalidRow {
                table: "attempts",
                reason: format!("unknown attempt status '{status}'"),
            })?;
            let ended_at = ended_at
                .map(|raw| Self::parse_sqlite("attempts", &raw))
                .transpose()?;
            by_job.entry(job_id).or_default().push(Attempt {
                attempt_number,
                job_id,
                status,
                created_at: Self::parse_sqlite("attempts", &created_at)?,
                updated_at: Self::parse_sqlite("attempts", &updated_at)?,
                ended_at,
            });
        }
        Ok(by_job)
    }

    fn job_exists(conn: &Connection, job_id: JobId) -> error::Result<bool> {
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM jobs WHERE id = ?1", [job_id], |row| {
                row.get(0)
            })
            .map_err(StateError::backend)?;
        Ok(count > 0)
    }

    fn attempt_exists(conn: &Connection, job_id: JobId, attempt_number: i32) -> error::Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM attempts WHERE job_id = ?1 AND attempt_number = ?2",
                rusqlite::params![job_id, attempt_number],
                |row| row.get(0),
            )
            .map_err(StateError::backend)?;
        Ok(count > 0)
    }

    fn decode_stream_state(connection_id: &ConnectionId, row: StateRow) -> error::Result<StreamState> {
        let Some(name) = row.stream_name else {
            return Err(StateError::InconsistentState {
                connection_id: connection_id.clone(),
                reason: "stream state row without a stream name".into(),
            });
        };
        Ok(StreamState {
            stream_descriptor: StreamDescriptor {
                name,
                namespace: row.stream_namespace,
            },
            stream_state: serde_json::from_str(&row.state_json)?,
        })
    }

    /// Rebuild a checkpoint from its rows (ordered by insertion).
    fn assemble_state(
        connection_id: &ConnectionId,
        rows: Vec<StateRow>,
    ) -> error::Result<Option<StateWrapper>> {
        let inconsistent = |reason: String| StateError::InconsistentState {
            connection_id: connection_id.clone(),
            reason,
        };

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let first_type = first.state_type.clone();
        if let Some(other) = rows.iter().find(|r| r.state_type != first_type) {
            return Err(inconsistent(format!(
                "mixed state types '{first_type}' and '{}'",
                other.state_type
            )));
        }
        let state_type = StateType::parse(&first_type)
            .ok_or_else(|| inconsistent(format!("unknown state type '{first_type}'")))?;

        let (mut shared, streams): (Vec<StateRow>, Vec<StateRow>) =
            rows.into_iter().partition(|r| r.stream_name.is_none());
        let stream_states = streams
            .into_iter()
            .map(|row| Self::decode_stream_state(connection_id, row))
            .collect::<error::Result<Vec<_>>>()?;

        match state_type {
            StateType::Legacy => {
                if shared.len() != 1 || !stream_states.is_empty() {
                    return Err(inconsistent(
                        "legacy state must be exactly one stream-less row".into(),
                    ));
                }
                let blob = serde_json::from_str(&shared.remove(0).state_json)?;
                Ok(Some(StateWrapper::Legacy(blob)))
            }
            StateType::Global => {
                if shared.len() != 1 {
                    return Err(inconsistent(format!(
                        "global state needs exactly one shared row, found {}",
                        shared.len()
                    )));
                }
                let shared_state = serde_json::from_str(&shared.remove(0).state_json)?;
                Ok(Some(StateWrapper::Global(GlobalState {
                    shared_state,
                    stream_states,
                })))
            }
            StateType::Stream => {
                if !shared.is_empty() {
                    return Err(inconsistent(
                        "stream state has a stream-less row".into(),
                    ));
                }
                Ok(Some(StateWrapper::Stream(stream_states)))
            }
        }
    }

    fn insert_state_row(
        tx: &rusqlite::Transaction<'_>,
        connection_id: &ConnectionId,
        stream: Option<&StreamDescriptor>,
        state_type: StateType,
        blob: &serde_json::Value,
        now: &str,
    ) -> error::Result<()> {
        let json = serde_json::to_string(blob)?;
        tx.execute(
            "INSERT INTO connection_state \
             (connection_id, stream_name, stream_namespace, state_type, state_json, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                connection_id.as_str(),
                stream.map(|s| s.name.as_str()),
                stream.and_then(|s| s.namespace.as_deref()),
                state_type.as_str(),
                json,
                now,
            ],
        )
        .map_err(|e| StateError::backend_context("update_or_create_state: insert", e))?;
        Ok(())
    }

    #[cfg(test)]
    fn insert_raw_state_row(
        &self,
        connection_id: &str,
        stream_name: Option<&str>,
        state_type: &str,
        state_json: &str,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO connection_state \
             (connection_id, stream_name, stream_namespace, state_type, state_json, updated_at) \
             VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
            rusqlite::params![connection_id, stream_name, state_type, state_json, Self::now_sqlite()],
        )
        .map_err(StateError::backend)?;
        Ok(())
    }

    #[cfg(test)]
    fn count_state_rows(&self, connection_id: &str) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM connection_state WHERE connection_id = ?1",
            [connection_id],
            |row| row.get(0),
        )
        .map_err(StateError::backend)
    }
}

impl JobStore for SqliteStore {
    fn get_job(&self, job_id: JobId) -> error::Result<Option<Job>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let result = conn.query_row(&sql, [job_id], Self::read_job_row);

        match result {
            Ok(row) => Ok(Self::hydrate_jobs(&conn, vec![row])?.pop()),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::backend(e)),
        }
    }

    fn list_jobs(&self, query: &JobQuery) -> error::Result<Vec<Job>> {
        let conn = self.lock_conn()?;
        Self::query_jobs(&conn, query)
    }

    fn count_jobs(&self, query: &JobQuery) -> error::Result<u64> {
        let Some((filter, values)) = Self::job_filter(query) else {
            return Ok(0);
        };
        let conn = self.lock_conn()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM jobs WHERE {filter}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .map_err(StateError::backend)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn list_running_jobs_for_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> error::Result<Vec<Job>> {
        let query = JobQuery {
            config_types: ConfigType::REPLICATION.to_vec(),
            scope: Some(connection_id.clone()),
            statuses: JobStatus::NON_TERMINAL.to_vec(),
            limit: u32::MAX,
            ..JobQuery::default()
        };
        let conn = self.lock_conn()?;
        Self::query_jobs(&conn, &query)
    }

    fn get_attempt_stats(
        &self,
        job_ids: &[JobId],
    ) -> error::Result<HashMap<JobAttemptPair, AttemptStats>> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT job_id, attempt_number, stream_name, stream_namespace, \
             records_emitted, bytes_emitted, records_committed, bytes_committed, \
             records_rejected, was_backfilled, was_resumed \
             FROM stream_stats WHERE job_id IN ({}) \
             ORDER BY job_id, attempt_number, id",
            Self::placeholders(job_ids.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(StateError::backend)?;
        let raw_rows = stmt
            .query_map(params_from_iter(job_ids.iter()), |row| {
                Ok(StatsRow {
                    pair: JobAttemptPair::new(row.get(0)?, row.get(1)?),
                    stream: StreamDescriptor {
                        name: row.get(2)?,
                        namespace: row.get(3)?,
                    },
                    counters: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
                    was_backfilled: row.get(9)?,
                    was_resumed: row.get(10)?,
                })
            })
            .map_err(StateError::backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::backend)?;

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                let [emitted, bytes_emitted, committed, bytes_committed, rejected] = row.counters;
                let stats = StreamSyncStats {
                    stream: row.stream,
                    stats: SyncStats {
                        records_emitted: Self::counter_from_sql("records_emitted", emitted)?,
                        bytes_emitted: Self::counter_from_sql("bytes_emitted", bytes_emitted)?,
                        records_committed: Self::counter_from_sql("records_committed", committed)?,
                        bytes_committed: Self::counter_from_sql("bytes_committed", bytes_committed)?,
                        records_rejected: Self::counter_from_sql("records_rejected", rejected)?,
                    },
                    was_backfilled: row.was_backfilled,
                    was_resumed: row.was_resumed,
                };
                Ok((row.pair, stats))
            })
            .collect::<error::Result<Vec<_>>>()?;

        let mut grouped: HashMap<JobAttemptPair, Vec<StreamSyncStats>> = HashMap::new();
        for (pair, stats) in rows {
            grouped.entry(pair).or_default().push(stats);
        }
        Ok(grouped
            .into_iter()
            .map(|(pair, streams)| (pair, AttemptStats::from_streams(streams)))
            .collect())
    }

    fn create_job(&self, scope: &ConnectionId, config: &JobConfig) -> error::Result<JobId> {
        let config_json = serde_json::to_string(config)?;
        let now = Self::now_sqlite();
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO jobs (config_type, scope, config_json, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
                config.config_type().as_str(),
                scope.as_str(),
                config_json,
                JobStatus::Pending.as_str(),
                now,
            ],
        )
        .map_err(StateError::backend)?;
        Ok(conn.last_insert_rowid())
    }

    fn create_attempt(&self, job_id: JobId) -> error::Result<i32> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("create_attempt: begin tx", e))?;
        if !Self::job_exists(&tx, job_id)? {
            return Err(StateError::JobNotFound(job_id));
        }

        let next: i32 = tx
            .query_row(
                "SELECT COALESCE(MAX(attempt_number) + 1, 0) FROM attempts WHERE job_id = ?1",
                [job_id],
                |row| row.get(0),
            )
            .map_err(|e| StateError::backend_context("create_attempt: next number", e))?;
        let now = Self::now_sqlite();
        tx.execute(
            "INSERT INTO attempts (job_id, attempt_number, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![job_id, next, AttemptStatus::Running.as_str(), now],
        )
        .map_err(|e| StateError::backend_context("create_attempt: insert", e))?;
        tx.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![JobStatus::Running.as_str(), now, job_id],
        )
        .map_err(|e| StateError::backend_context("create_attempt: update job", e))?;
        tx.commit()
            .map_err(|e| StateError::backend_context("create_attempt: commit", e))?;
        Ok(next)
    }

    fn complete_attempt(
        &self,
        job_id: JobId,
        attempt_number: i32,
        status: AttemptStatus,
    ) -> error::Result<()> {
        if !status.is_terminal() {
            return Err(StateError::NonTerminalCompletion {
                job_id,
                attempt_number,
                status: status.as_str(),
            });
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("complete_attempt: begin tx", e))?;
        let now = Self::now_sqlite();
        // Terminal status is written once; a completed attempt has ended_at.
        let updated = tx
            .execute(
                "UPDATE attempts SET status = ?1, updated_at = ?2, ended_at = ?2 \
                 WHERE job_id = ?3 AND attempt_number = ?4 AND ended_at IS NULL",
                rusqlite::params![status.as_str(), now, job_id, attempt_number],
            )
            .map_err(|e| StateError::backend_context("complete_attempt: update", e))?;
        if updated == 0 {
            return Err(if Self::attempt_exists(&tx, job_id, attempt_number)? {
                StateError::AttemptAlreadyCompleted {
                    job_id,
                    attempt_number,
                }
            } else {
                StateError::AttemptNotFound {
                    job_id,
                    attempt_number,
                }
            });
        }
        tx.commit()
            .map_err(|e| StateError::backend_context("complete_attempt: commit", e))?;
        Ok(())
    }

    fn set_job_status(&self, job_id: JobId, status: JobStatus) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn
            .execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), Self::now_sqlite(), job_id],
            )
            .map_err(StateError::backend)?;
        if updated == 0 {
            return Err(StateError::JobNotFound(job_id));
        }
        Ok(())
    }

    fn write_attempt_stats(
        &self,
        job_id: JobId,
        attempt_number: i32,
        streams: &[StreamSyncStats],
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("write_attempt_stats: begin tx", e))?;
        if !Self::attempt_exists(&tx, job_id, attempt_number)? {
            return Err(StateError::AttemptNotFound {
                job_id,
                attempt_number,
            });
        }

        let now = Self::now_sqlite();
        for s in streams {
            let counters = [
                Self::counter_to_sql("records_emitted", s.stats.records_emitted)?,
                Self::counter_to_sql("bytes_emitted", s.stats.bytes_emitted)?,
                Self::counter_to_sql("records_committed", s.stats.records_committed)?,
                Self::counter_to_sql("bytes_committed", s.stats.bytes_committed)?,
                Self::counter_to_sql("records_rejected", s.stats.records_rejected)?,
            ];
            // `IS` matches NULL namespaces without conflating them with "".
            tx.execute(
                "DELETE FROM stream_stats WHERE job_id = ?1 AND attempt_number = ?2 \
                 AND stream_name = ?3 AND stream_namespace IS ?4",
                rusqlite::params![job_id, attempt_number, s.stream.name, s.stream.namespace],
            )
            .map_err(|e| StateError::backend_context("write_attempt_stats: delete", e))?;
            tx.execute(
                "INSERT INTO stream_stats \
                 (job_id, attempt_number, stream_name, stream_namespace, \
                  records_emitted, bytes_emitted, records_committed, bytes_committed, \
                  records_rejected, was_backfilled, was_resumed, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    job_id,
                    attempt_number,
                    s.stream.name,
                    s.stream.namespace,
                    counters[0],
                    counters[1],
                    counters[2],
                    counters[3],
                    counters[4],
                    s.was_backfilled,
                    s.was_resumed,
                    now,
                ],
            )
            .map_err(|e| StateError::backend_context("write_attempt_stats: insert", e))?;
        }
        tx.commit()
            .map_err(|e| StateError::backend_context("write_attempt_stats: commit", e))?;
        Ok(())
    }
}

impl StateStore for SqliteStore {
    fn get_current_state(
        &self,
        connection_id: &ConnectionId,
    ) -> error::Result<Option<StateWrapper>> {
        let rows = {
            let conn = self.lock_conn()?;
            let mut stmt = conn
                .prepare(
                    "SELECT stream_name, stream_namespace, state_type, state_json \
                     FROM connection_state WHERE connection_id = ?1 ORDER BY id",
                )
                .map_err(StateError::backend)?;
            let rows = stmt
                .query_map([connection_id.as_str()], |row| {
                    Ok(StateRow {
                        stream_name: row.get(0)?,
                        stream_namespace: row.get(1)?,
                        state_type: row.get(2)?,
                        state_json: row.get(3)?,
                    })
                })
                .map_err(StateError::backend)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(StateError::backend)?;
            rows
        };
        Self::assemble_state(connection_id, rows)
    }

    fn update_or_create_state(
        &self,
        connection_id: &ConnectionId,
        state: &StateWrapper,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("update_or_create_state: begin tx", e))?;
        tx.execute(
            "DELETE FROM connection_state WHERE connection_id = ?1",
            [connection_id.as_str()],
        )
        .map_err(|e| StateError::backend_context("update_or_create_state: clear", e))?;

        let now = Self::now_sqlite();
        let state_type = state.state_type();
        match state {
            StateWrapper::Legacy(blob) => {
                Self::insert_state_row(&tx, connection_id, None, state_type, blob, &now)?;
            }
            StateWrapper::Global(global) => {
                Self::insert_state_row(
                    &tx,
                    connection_id,
                    None,
                    state_type,
                    &global.shared_state,
                    &now,
                )?;
                for s in &global.stream_states {
                    Self::insert_state_row(
                        &tx,
                        connection_id,
                        Some(&s.stream_descriptor),
                        state_type,
                        &s.stream_state,
                        &now,
                    )?;
                }
            }
            StateWrapper::Stream(streams) => {
                for s in streams {
                    Self::insert_state_row(
                        &tx,
                        connection_id,
                        Some(&s.stream_descriptor),
                        state_type,
                        &s.stream_state,
                        &now,
                    )?;
                }
            }
        }
        tx.commit()
            .map_err(|e| StateError::backend_context("update_or_create_state: commit", e))?;

        tracing::debug!(
            connection_id = connection_id.as_str(),
            state_type = state_type.as_str(),
            "Connection state rows replaced"
        );
        Ok(())
    }

    fn erase_state(&self, connection_id: &ConnectionId) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM connection_state WHERE connection_id = ?1",
            [connection_id.as_str()],
        )
        .map_err(StateError::backend)?;
        Ok(())
    }
}
