//! Job history: paginated listing and lookups, hydrated with attempt stats.

use std::collections::HashMap;
use std::sync::Arc;

use synctrack_state::JobStore;
use synctrack_types::history::{AttemptWithStats, JobListRequest, JobRead, JobReadList, JobWithAttempts};
use synctrack_types::job::{ConfigType, ConnectionId, Job, JobId, JobQuery, JobStatus, TimeRange};
use synctrack_types::progress::ConnectionSyncProgress;
use synctrack_types::stats::{AttemptStats, JobAttemptPair};

use crate::aggregate::aggregate_job;
use crate::errors::{Result, TrackerError};
use crate::progress::build_progress;

/// Read access to jobs over a [`JobStore`].
#[derive(Clone)]
pub struct JobHistory {
    store: Arc<dyn JobStore>,
    default_page_size: u32,
}

impl JobHistory {
    /// Page size used when a request does not name one.
    pub const DEFAULT_PAGE_SIZE: u32 = 200;

    #[must_use]
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            default_page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the page size used when a request does not name one.
    #[must_use]
    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size;
        self
    }

    /// List jobs matching `request` with stats attached.
    ///
    /// Jobs are newest first unless the request names an order. With
    /// `including_job_id` the page starts at offset zero and grows in
    /// multiples of the page size until it holds that job; a job outside the
    /// requested config types or connection yields an empty page.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidRequest`] when no config type is named,
    /// the page size is zero or a time window is inverted, or
    /// [`TrackerError::Store`] on store failure.
    pub fn list_jobs(&self, request: &JobListRequest) -> Result<JobReadList> {
        if request.config_types.is_empty() {
            return Err(TrackerError::InvalidRequest(
                "at least one config type is required".into(),
            ));
        }
        let pagination = request.pagination.unwrap_or_default();
        let limit = pagination.page_size.unwrap_or(self.default_page_size);
        if limit == 0 {
            return Err(TrackerError::InvalidRequest(
                "page_size must be greater than zero".into(),
            ));
        }
        if request.created_at.is_inverted() || request.updated_at.is_inverted() {
            return Err(TrackerError::InvalidRequest(
                "time window start is after its end".into(),
            ));
        }

        let query = match request.including_job_id {
            Some(job_id) => match self.page_including(request, job_id, limit)? {
                Some(query) => query,
                None => {
                    let base = Self::base_query(request);
                    return Ok(JobReadList {
                        jobs: Vec::new(),
                        total_job_count: self.store.count_jobs(&base)?,
                    });
                }
            },
            None => JobQuery {
                statuses: request.statuses.clone(),
                created_at: request.created_at,
                updated_at: request.updated_at,
                order: request.order(),
                limit,
                offset: pagination.row_offset.unwrap_or(0),
                ..Self::base_query(request)
            },
        };
        let jobs = self.store.list_jobs(&query)?;
        let total_job_count = self.store.count_jobs(&query)?;

        tracing::debug!(
            config_id = query.scope.as_ref().map(ConnectionId::as_str),
            including_job_id = request.including_job_id,
            returned = jobs.len(),
            total = total_job_count,
            "Listed jobs"
        );
        Ok(JobReadList {
            jobs: self.hydrate(&jobs)?,
            total_job_count,
        })
    }

    /// Config types and connection of `request`, nothing else.
    fn base_query(request: &JobListRequest) -> JobQuery {
        JobQuery {
            config_types: request.config_types.clone(),
            scope: request.config_id.clone(),
            ..JobQuery::default()
        }
    }

    /// Query for the smallest page-size multiple, newest first, that reaches
    /// `job_id`. `None` when the job does not match the request.
    fn page_including(
        &self,
        request: &JobListRequest,
        job_id: JobId,
        page_size: u32,
    ) -> Result<Option<JobQuery>> {
        let Some(target) = self.store.get_job(job_id)? else {
            return Ok(None);
        };
        let in_scope = request
            .config_id
            .as_ref()
            .map_or(true, |scope| &target.scope == scope);
        if !in_scope || !request.config_types.contains(&target.config_type()) {
            return Ok(None);
        }

        let newer_or_same = self.store.count_jobs(&JobQuery {
            created_at: TimeRange {
                start: Some(target.created_at),
                end: None,
            },
            ..Self::base_query(request)
        })?;
        let pages = newer_or_same / u64::from(page_size) + 1;
        let limit = u32::try_from(pages * u64::from(page_size)).unwrap_or(u32::MAX);
        Ok(Some(JobQuery {
            limit,
            ..Self::base_query(request)
        }))
    }

    /// One job with its attempts and stats.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::JobNotFound`] for an unknown job, or
    /// [`TrackerError::Store`] on store failure.
    pub fn get_job_info(&self, job_id: JobId) -> Result<JobWithAttempts> {
        let job = self
            .store
            .get_job(job_id)?
            .ok_or(TrackerError::JobNotFound(job_id))?;
        let mut hydrated = self.hydrate(std::slice::from_ref(&job))?;
        hydrated.pop().ok_or(TrackerError::JobNotFound(job_id))
    }

    /// The newest non-terminal replication job of a connection.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] on store failure.
    pub fn get_latest_running_sync_job(&self, connection_id: &ConnectionId) -> Result<Option<Job>> {
        let running = self.store.list_running_jobs_for_connection(connection_id)?;
        Ok(running
            .into_iter()
            .filter(|job| job.config_type().is_replication())
            .max_by_key(|job| (job.created_at, job.id)))
    }

    /// The newest replication job of a connection that was not cancelled,
    /// whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] on store failure.
    pub fn get_last_replication_job(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Option<JobWithAttempts>> {
        let statuses = JobStatus::ALL
            .into_iter()
            .filter(|status| *status != JobStatus::Cancelled)
            .collect();
        self.newest_job(connection_id, ConfigType::REPLICATION.to_vec(), statuses)
    }

    /// The newest sync or refresh job of a connection, in any status.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] on store failure.
    pub fn get_latest_sync_job(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Option<JobWithAttempts>> {
        self.newest_job(connection_id, ConfigType::SYNC_REPLICATION.to_vec(), Vec::new())
    }

    fn newest_job(
        &self,
        connection_id: &ConnectionId,
        config_types: Vec<ConfigType>,
        statuses: Vec<JobStatus>,
    ) -> Result<Option<JobWithAttempts>> {
        let newest = self.store.list_jobs(&JobQuery {
            config_types,
            scope: Some(connection_id.clone()),
            statuses,
            limit: 1,
            ..JobQuery::default()
        })?;
        Ok(self.hydrate(&newest)?.pop())
    }

    /// Live progress of a connection; idle when nothing is running.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] on store failure.
    pub fn get_connection_sync_progress(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<ConnectionSyncProgress> {
        let Some(job) = self.get_latest_running_sync_job(connection_id)? else {
            return Ok(build_progress(connection_id, None, &HashMap::new()));
        };
        let stats = self.store.get_attempt_stats(&[job.id])?;
        Ok(build_progress(connection_id, Some(&job), &stats))
    }

    /// Attach stats to `jobs` with one bulk stats read.
    fn hydrate(&self, jobs: &[Job]) -> Result<Vec<JobWithAttempts>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
        let stats = self.store.get_attempt_stats(&ids)?;
        Ok(jobs.iter().map(|job| hydrate_job(job, &stats)).collect())
    }
}

/// Build the read model of `job` from bulk-loaded attempt stats.
#[must_use]
pub fn hydrate_job(job: &Job, stats: &HashMap<JobAttemptPair, AttemptStats>) -> JobWithAttempts {
    let aggregated = aggregate_job(job, stats);
    let mut read = JobRead::from_job(job);
    read.aggregated_stats = aggregated.job;
    read.stream_aggregated_stats = aggregated.streams;

    let attempts = job
        .attempts
        .iter()
        .map(|attempt| {
            let reported = stats.get(&JobAttemptPair::new(job.id, attempt.attempt_number));
            AttemptWithStats {
                attempt: attempt.clone(),
                total_stats: reported.map(|s| s.combined).unwrap_or_default(),
                stream_stats: reported.map(|s| s.streams.clone()).unwrap_or_default(),
            }
        })
        .collect();

    JobWithAttempts {
        job: read,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synctrack_state::prelude::*;
    use synctrack_types::history::Pagination;
    use synctrack_types::job::{JobOrderField, SortDirection};

    fn catalog() -> ConfiguredCatalog {
        ConfiguredCatalog {
            streams: vec![
                ConfiguredStream {
                    stream: StreamDescriptor::new("users"),
                    sync_mode: SyncMode::FullRefresh,
                },
                ConfiguredStream {
                    stream: StreamDescriptor::new("orders"),
                    sync_mode: SyncMode::Incremental,
                },
            ],
        }
    }

    fn records(n: u64) -> SyncStats {
        SyncStats {
            records_emitted: n,
            bytes_emitted: n,
            records_committed: n,
            bytes_committed: n,
            records_rejected: 0,
        }
    }

    fn setup() -> (Arc<SqliteStore>, JobHistory) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let history = JobHistory::new(store.clone());
        (store, history)
    }

    fn request(config_types: Vec<ConfigType>) -> JobListRequest {
        JobListRequest {
            config_types,
            ..JobListRequest::default()
        }
    }

    #[test]
    fn list_requires_a_config_type() {
        let (_, history) = setup();
        let err = history.list_jobs(&request(vec![])).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidRequest(_)));
    }

    #[test]
    fn list_rejects_zero_page_size() {
        let (_, history) = setup();
        let mut req = request(vec![ConfigType::Sync]);
        req.pagination = Some(Pagination {
            page_size: Some(0),
            row_offset: None,
        });
        assert!(matches!(
            history.list_jobs(&req),
            Err(TrackerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn list_hydrates_job_and_attempt_stats() {
        let (store, history) = setup();
        let conn = ConnectionId::new("c1");
        let job_id = store.create_job(&conn, &JobConfig::Sync { catalog: catalog() }).unwrap();
        let a0 = store.create_attempt(job_id).unwrap();
        store
            .write_attempt_stats(
                job_id,
                a0,
                &[
                    StreamSyncStats::new(StreamDescriptor::new("users"), records(5)),
                    StreamSyncStats::new(StreamDescriptor::new("orders"), records(50)),
                ],
            )
            .unwrap();
        let a1 = store.create_attempt(job_id).unwrap();
        store
            .write_attempt_stats(
                job_id,
                a1,
                &[
                    StreamSyncStats::new(StreamDescriptor::new("users"), records(500)),
                    StreamSyncStats::new(StreamDescriptor::new("orders"), records(5000)),
                ],
            )
            .unwrap();

        let list = history.list_jobs(&request(vec![ConfigType::Sync])).unwrap();
        assert_eq!(list.total_job_count, 1);
        let job = &list.jobs[0];
        assert_eq!(job.job.aggregated_stats, records(5550));
        assert_eq!(job.job.stream_aggregated_stats.len(), 2);
        assert_eq!(job.attempts.len(), 2);
        assert_eq!(job.attempts[0].total_stats, records(55));
        assert_eq!(job.attempts[1].total_stats, records(5500));
        assert_eq!(job.attempts[1].stream_stats.len(), 2);
    }

    #[test]
    fn attempt_without_stats_hydrates_to_zero() {
        let (store, history) = setup();
        let job_id = store
            .create_job(&ConnectionId::new("c1"), &JobConfig::Sync { catalog: catalog() })
            .unwrap();
        store.create_attempt(job_id).unwrap();

        let info = history.get_job_info(job_id).unwrap();
        assert_eq!(info.attempts.len(), 1);
        assert_eq!(info.attempts[0].total_stats, SyncStats::default());
        assert!(info.attempts[0].stream_stats.is_empty());
        assert!(info.job.stream_aggregated_stats.is_empty());
        assert_eq!(info.job.enabled_streams.len(), 2);
    }

    #[test]
    fn job_info_not_found() {
        let (_, history) = setup();
        let err = history.get_job_info(404).unwrap_err();
        assert!(matches!(err, TrackerError::JobNotFound(404)));
    }

    #[test]
    fn page_window_and_total_count() {
        let (store, history) = setup();
        let conn = ConnectionId::new("c1");
        let ids: Vec<JobId> = (0..5)
            .map(|_| store.create_job(&conn, &JobConfig::Sync { catalog: catalog() }).unwrap())
            .collect();

        let mut req = request(vec![ConfigType::Sync]);
        req.pagination = Some(Pagination {
            page_size: Some(2),
            row_offset: Some(1),
        });
        let list = history.list_jobs(&req).unwrap();
        assert_eq!(list.total_job_count, 5);
        let listed: Vec<JobId> = list.jobs.iter().map(|j| j.job.id).collect();
        assert_eq!(listed, vec![ids[3], ids[2]]);
    }

    #[test]
    fn default_page_size_applies() {
        let (store, history) = setup();
        let history = history.with_default_page_size(3);
        let conn = ConnectionId::new("c1");
        for _ in 0..5 {
            store.create_job(&conn, &JobConfig::Sync { catalog: catalog() }).unwrap();
        }
        let list = history.list_jobs(&request(vec![ConfigType::Sync])).unwrap();
        assert_eq!(list.jobs.len(), 3);
        assert_eq!(list.total_job_count, 5);
    }

    #[test]
    fn latest_running_sync_job_ignores_finished_jobs() {
        let (store, history) = setup();
        let conn = ConnectionId::new("c1");
        assert!(history.get_latest_running_sync_job(&conn).unwrap().is_none());

        let done = store.create_job(&conn, &JobConfig::Sync { catalog: catalog() }).unwrap();
        store.set_job_status(done, JobStatus::Succeeded).unwrap();
        assert!(history.get_latest_running_sync_job(&conn).unwrap().is_none());

        let running = store.create_job(&conn, &JobConfig::Sync { catalog: catalog() }).unwrap();
        store.create_attempt(running).unwrap();
        let job = history.get_latest_running_sync_job(&conn).unwrap().unwrap();
        assert_eq!(job.id, running);
    }

    /// Create `n` sync jobs with distinct creation timestamps, oldest first.
    fn create_spaced_jobs(store: &SqliteStore, conn: &ConnectionId, n: usize) -> Vec<JobId> {
        (0..n)
            .map(|_| {
                std::thread::sleep(std::time::Duration::from_millis(3));
                store.create_job(conn, &JobConfig::Sync { catalog: catalog() }).unwrap()
            })
            .collect()
    }

    fn listed(list: &JobReadList) -> Vec<JobId> {
        list.jobs.iter().map(|j| j.job.id).collect()
    }

    #[test]
    fn including_job_id_grows_page_until_job_is_listed() {
        let (store, history) = setup();
        let conn = ConnectionId::new("c1");
        let ids = create_spaced_jobs(&store, &conn, 5);

        let mut req = request(vec![ConfigType::Sync]);
        req.pagination = Some(Pagination {
            page_size: Some(2),
            row_offset: Some(3),
        });

        req.including_job_id = Some(ids[4]);
        assert_eq!(listed(&history.list_jobs(&req).unwrap()), vec![ids[4], ids[3]]);

        req.including_job_id = Some(ids[3]);
        let list = history.list_jobs(&req).unwrap();
        assert_eq!(listed(&list), vec![ids[4], ids[3], ids[2], ids[1]]);
        assert_eq!(list.total_job_count, 5);

        req.including_job_id = Some(ids[0]);
        let list = history.list_jobs(&req).unwrap();
        assert_eq!(list.jobs.len(), 5);
        assert_eq!(list.jobs.last().unwrap().job.id, ids[0]);
    }

    #[test]
    fn including_job_outside_request_lists_nothing() {
        let (store, history) = setup();
        let conn = ConnectionId::new("c1");
        create_spaced_jobs(&store, &conn, 2);
        let other = store
            .create_job(&ConnectionId::new("c2"), &JobConfig::Sync { catalog: catalog() })
            .unwrap();
        let check = store.create_job(&conn, &JobConfig::CheckConnection).unwrap();

        let mut req = request(vec![ConfigType::Sync]);
        req.config_id = Some(conn);
        for job_id in [other, check, 999] {
            req.including_job_id = Some(job_id);
            let list = history.list_jobs(&req).unwrap();
            assert!(list.jobs.is_empty(), "job {job_id} should not be listed");
            assert_eq!(list.total_job_count, 2);
        }
    }

    #[test]
    fn list_rejects_inverted_time_window() {
        let (_, history) = setup();
        let now = chrono::Utc::now();
        let mut req = request(vec![ConfigType::Sync]);
        req.updated_at = TimeRange {
            start: Some(now),
            end: Some(now - chrono::Duration::hours(1)),
        };
        assert!(matches!(
            history.list_jobs(&req),
            Err(TrackerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn list_filters_by_time_window_and_orders_by_field() {
        let (store, history) = setup();
        let conn = ConnectionId::new("c1");
        let ids = create_spaced_jobs(&store, &conn, 2);
        std::thread::sleep(std::time::Duration::from_millis(3));
        store.set_job_status(ids[0], JobStatus::Failed).unwrap();

        let mut req = request(vec![ConfigType::Sync]);
        assert_eq!(listed(&history.list_jobs(&req).unwrap()), vec![ids[1], ids[0]]);

        req.order_by_field = Some(JobOrderField::UpdatedAt);
        assert_eq!(listed(&history.list_jobs(&req).unwrap()), vec![ids[0], ids[1]]);
        req.order_by_method = Some(SortDirection::Asc);
        assert_eq!(listed(&history.list_jobs(&req).unwrap()), vec![ids[1], ids[0]]);

        let second = store.get_job(ids[1]).unwrap().unwrap();
        let mut req = request(vec![ConfigType::Sync]);
        req.created_at = TimeRange {
            start: Some(second.created_at),
            end: None,
        };
        let list = history.list_jobs(&req).unwrap();
        assert_eq!(listed(&list), vec![ids[1]]);
        assert_eq!(list.total_job_count, 1);

        req.created_at = TimeRange {
            start: None,
            end: Some(second.created_at - chrono::Duration::milliseconds(1)),
        };
        assert_eq!(listed(&history.list_jobs(&req).unwrap()), vec![ids[0]]);
    }

    #[test]
    fn last_replication_job_skips_cancelled() {
        let (store, history) = setup();
        let conn = ConnectionId::new("c1");
        assert!(history.get_last_replication_job(&conn).unwrap().is_none());

        let ids = create_spaced_jobs(&store, &conn, 2);
        store.set_job_status(ids[0], JobStatus::Failed).unwrap();
        store.set_job_status(ids[1], JobStatus::Cancelled).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(3));
        store.create_job(&conn, &JobConfig::DiscoverSchema).unwrap();

        let last = history.get_last_replication_job(&conn).unwrap().unwrap();
        assert_eq!(last.job.id, ids[0]);
        assert_eq!(last.job.status, JobStatus::Failed);
    }

    #[test]
    fn latest_sync_job_ignores_resets_but_not_cancellation() {
        let (store, history) = setup();
        let conn = ConnectionId::new("c1");
        let ids = create_spaced_jobs(&store, &conn, 1);
        store.set_job_status(ids[0], JobStatus::Cancelled).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(3));
        let reset = store
            .create_job(
                &conn,
                &JobConfig::ResetConnection {
                    catalog: catalog(),
                    streams_to_reset: vec![StreamDescriptor::new("users")],
                },
            )
            .unwrap();

        let latest = history.get_latest_sync_job(&conn).unwrap().unwrap();
        assert_eq!(latest.job.id, ids[0]);
        let last = history.get_last_replication_job(&conn).unwrap().unwrap();
        assert_eq!(last.job.id, reset);
    }

    #[test]
    fn progress_is_idle_without_running_job() {
        let (_, history) = setup();
        let view = history
            .get_connection_sync_progress(&ConnectionId::new("c1"))
            .unwrap();
        assert!(view.is_idle());
    }
}
