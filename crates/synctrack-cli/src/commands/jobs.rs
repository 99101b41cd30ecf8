use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use synctrack_types::history::{JobListRequest, Pagination};
use synctrack_types::job::{
    ConfigType, ConnectionId, JobId, JobOrderField, JobStatus, SortDirection, TimeRange,
};

use super::{print_json, Context};

/// Filters and page window of `jobs list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Config types to include (sync, refresh, reset_connection, clear, ...)
    #[arg(long = "config-type", required = true, value_parser = parse_config_type)]
    pub config_types: Vec<ConfigType>,
    /// Only jobs of this connection
    #[arg(long)]
    pub connection: Option<String>,
    /// Only jobs in these statuses
    #[arg(long = "status", value_parser = parse_job_status)]
    pub statuses: Vec<JobStatus>,
    /// Only jobs created at or after this RFC 3339 time
    #[arg(long)]
    pub created_after: Option<DateTime<Utc>>,
    /// Only jobs created at or before this RFC 3339 time
    #[arg(long)]
    pub created_before: Option<DateTime<Utc>>,
    /// Only jobs updated at or after this RFC 3339 time
    #[arg(long)]
    pub updated_after: Option<DateTime<Utc>>,
    /// Only jobs updated at or before this RFC 3339 time
    #[arg(long)]
    pub updated_before: Option<DateTime<Utc>>,
    /// Sort field (created_at, updated_at)
    #[arg(long, value_parser = parse_order_field)]
    pub order_by: Option<JobOrderField>,
    /// Sort direction (asc, desc); needs --order-by
    #[arg(long, requires = "order_by", value_parser = parse_direction)]
    pub order: Option<SortDirection>,
    /// Grow the first page until it contains this job
    #[arg(long, conflicts_with = "offset")]
    pub including_job: Option<JobId>,
    /// Jobs per page (default from config)
    #[arg(long)]
    pub page_size: Option<u32>,
    /// Jobs to skip
    #[arg(long)]
    pub offset: Option<u32>,
}

impl ListArgs {
    fn into_request(self) -> JobListRequest {
        JobListRequest {
            config_types: self.config_types,
            config_id: self.connection.map(ConnectionId::new),
            statuses: self.statuses,
            pagination: Some(Pagination {
                page_size: self.page_size,
                row_offset: self.offset,
            }),
            created_at: TimeRange {
                start: self.created_after,
                end: self.created_before,
            },
            updated_at: TimeRange {
                start: self.updated_after,
                end: self.updated_before,
            },
            order_by_field: self.order_by,
            order_by_method: self.order,
            including_job_id: self.including_job,
        }
    }
}

fn parse_config_type(raw: &str) -> Result<ConfigType, String> {
    ConfigType::parse(raw).ok_or_else(|| format!("unknown config type '{raw}'"))
}

fn parse_job_status(raw: &str) -> Result<JobStatus, String> {
    JobStatus::parse(raw).ok_or_else(|| format!("unknown job status '{raw}'"))
}

fn parse_order_field(raw: &str) -> Result<JobOrderField, String> {
    JobOrderField::parse(raw).ok_or_else(|| format!("unknown order field '{raw}'"))
}

fn parse_direction(raw: &str) -> Result<SortDirection, String> {
    SortDirection::parse(raw).ok_or_else(|| format!("unknown sort direction '{raw}'"))
}

/// Execute `jobs list`: print one page of jobs with aggregated stats.
pub fn list(ctx: &Context, args: ListArgs) -> Result<()> {
    let list = ctx.history.list_jobs(&args.into_request())?;
    tracing::info!(
        returned = list.jobs.len(),
        total = list.total_job_count,
        "Listed jobs"
    );
    print_json(&list)
}

/// Execute `jobs show`: print one job with its attempts.
pub fn show(ctx: &Context, job_id: JobId) -> Result<()> {
    let job = ctx.history.get_job_info(job_id)?;
    print_json(&job)
}

/// Execute `jobs last`: print the connection's newest replication job that
/// was not cancelled, or with `sync_only` its newest sync or refresh job.
pub fn last(ctx: &Context, connection: &str, sync_only: bool) -> Result<()> {
    let connection_id = ConnectionId::new(connection);
    let job = if sync_only {
        ctx.history.get_latest_sync_job(&connection_id)?
    } else {
        ctx.history.get_last_replication_job(&connection_id)?
    };
    if job.is_none() {
        tracing::info!(connection, "No matching job");
    }
    print_json(&job)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ListArgs {
        ListArgs {
            config_types: vec![ConfigType::Sync],
            connection: Some("c1".into()),
            statuses: vec![],
            created_after: None,
            created_before: None,
            updated_after: None,
            updated_before: None,
            order_by: None,
            order: None,
            including_job: None,
            page_size: Some(5),
            offset: None,
        }
    }

    #[test]
    fn request_carries_windows_and_order() {
        let after: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
        let mut args = args();
        args.created_after = Some(after);
        args.order_by = Some(JobOrderField::UpdatedAt);
        args.order = Some(SortDirection::Asc);
        args.including_job = Some(7);

        let request = args.into_request();
        assert_eq!(request.config_id, Some(ConnectionId::new("c1")));
        assert_eq!(request.created_at.start, Some(after));
        assert!(request.updated_at.start.is_none());
        assert_eq!(request.order().field, JobOrderField::UpdatedAt);
        assert_eq!(request.order().direction, SortDirection::Asc);
        assert_eq!(request.including_job_id, Some(7));
        assert_eq!(request.pagination.and_then(|p| p.page_size), Some(5));
    }
}
