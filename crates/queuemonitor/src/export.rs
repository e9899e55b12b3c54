use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::analytics::statistics::{JobStatistics, QueueHealth, ServerStatistics, StatisticsEngine};
use crate::error::Result;
use crate::jobs::filter::JobFilter;
use crate::jobs::model::{JobRecord, JobStatus, WorkerType};
use crate::jobs::store::JobStore;

pub const CSV_HEADER: &str = "UUID,Job Class,Queue,Status,Attempt,Duration (ms),Memory (MB),Queued At,Started At,Completed At,Exception";

const RECENT_FAILURES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ExportedJob {
    pub uuid: String,
    pub job_class: String,
    pub display_name: Option<String>,
    pub queue: String,
    pub connection: String,
    pub status: JobStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    pub server_name: Option<String>,
    pub worker_id: Option<String>,
    pub worker_type: WorkerType,
    pub metrics: ExportedMetrics,
    pub exception: Option<ExportedException>,
    pub tags: Option<Vec<String>>,
    pub timestamps: ExportedTimestamps,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedMetrics {
    pub cpu_time_ms: Option<f64>,
    pub memory_peak_mb: Option<f64>,
    pub file_descriptors: Option<i32>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedException {
    pub class: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedTimestamps {
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for ExportedJob {
    fn from(r: JobRecord) -> Self {
        Self {
            uuid: r.uuid,
            job_class: r.job_class,
            display_name: r.display_name,
            queue: r.queue,
            connection: r.connection,
            status: r.status,
            attempt: r.attempt,
            max_attempts: r.max_attempts,
            server_name: r.server_name,
            worker_id: r.worker_id,
            worker_type: r.worker_type,
            metrics: ExportedMetrics {
                cpu_time_ms: r.cpu_time_ms,
                memory_peak_mb: r.memory_peak_mb,
                file_descriptors: r.file_descriptors,
                duration_ms: r.duration_ms,
            },
            exception: r.exception.map(|e| ExportedException {
                class: e.class,
                message: e.message,
            }),
            tags: r.tags,
            timestamps: ExportedTimestamps {
                queued_at: r.queued_at,
                started_at: r.started_at,
                completed_at: r.completed_at,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsReport {
    pub generated_at: DateTime<Utc>,
    pub global: JobStatistics,
    pub servers: Vec<ServerStatistics>,
    pub queue_health: Vec<QueueHealth>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExceptionGroup {
    pub count: usize,
    pub jobs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentFailure {
    pub uuid: String,
    pub job_class: String,
    pub exception: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedJobsReport {
    pub generated_at: DateTime<Utc>,
    pub total_failed: usize,
    pub by_exception: BTreeMap<String, ExceptionGroup>,
    pub by_queue: BTreeMap<String, usize>,
    pub recent_failures: Vec<RecentFailure>,
}

/// CSV / JSON dumps and summary reports.
#[derive(Clone)]
pub struct Exporter {
    store: Arc<dyn JobStore>,
    stats: StatisticsEngine,
}

impl Exporter {
    pub fn new(store: Arc<dyn JobStore>, stats: StatisticsEngine) -> Self {
        Self { store, stats }
    }

    pub async fn to_csv(&self, filter: &JobFilter) -> Result<String> {
        let jobs = self.store.query(filter).await?;
        let mut out = String::with_capacity(CSV_HEADER.len() + 1 + jobs.len() * 160);
        out.push_str(CSV_HEADER);
        out.push('\n');
        for job in &jobs {
            out.push_str(&csv_row(job));
            out.push('\n');
        }
        Ok(out)
    }

    pub async fn to_json(&self, filter: &JobFilter) -> Result<Vec<ExportedJob>> {
        let jobs = self.store.query(filter).await?;
        Ok(jobs.into_iter().map(ExportedJob::from).collect())
    }

    pub async fn statistics_report(&self) -> Result<StatisticsReport> {
        Ok(StatisticsReport {
            generated_at: Utc::now(),
            global: self.stats.global_statistics().await?,
            servers: self.stats.server_statistics(None).await?,
            queue_health: self.stats.queue_health().await?,
        })
    }

    pub async fn failed_jobs_report(&self, limit: i64) -> Result<FailedJobsReport> {
        let failed = self.store.failed_jobs(limit).await?;

        let mut by_exception: BTreeMap<String, ExceptionGroup> = BTreeMap::new();
        let mut by_queue: BTreeMap<String, usize> = BTreeMap::new();
        for job in &failed {
            let class = job
                .exception
                .as_ref()
                .map(|e| e.class.clone())
                .unwrap_or_default();
            let group = by_exception.entry(class).or_default();
            group.count += 1;
            group.jobs.push(job.uuid.clone());
            *by_queue.entry(job.queue.clone()).or_default() += 1;
        }

        let recent_failures = failed
            .iter()
            .take(RECENT_FAILURES)
            .map(|job| RecentFailure {
                uuid: job.uuid.clone(),
                job_class: job.job_class.clone(),
                exception: job.exception.as_ref().map(|e| e.class.clone()),
                failed_at: job.completed_at,
            })
            .collect();

        Ok(FailedJobsReport {
            generated_at: Utc::now(),
            total_failed: failed.len(),
            by_exception,
            by_queue,
            recent_failures,
        })
    }
}

fn csv_row(job: &JobRecord) -> String {
    let fields = [
        escape_csv(&job.uuid),
        escape_csv(&job.job_class),
        escape_csv(&job.queue),
        escape_csv(job.status.as_str()),
        job.attempt.to_string(),
        job.duration_ms.map(|d| d.to_string()).unwrap_or_default(),
        job.memory_peak_mb.map(|m| m.to_string()).unwrap_or_default(),
        escape_csv(&iso8601(job.queued_at)),
        escape_csv(&iso8601(job.started_at)),
        escape_csv(&iso8601(job.completed_at)),
        escape_csv(job.exception.as_ref().map(|e| e.class.as_str()).unwrap_or("")),
    ];
    fields.join(",")
}

fn iso8601(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, false))
        .unwrap_or_default()
}

/// Quotes a CSV field and neutralizes spreadsheet formulas.
pub fn escape_csv(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let mut v = String::with_capacity(value.len() + 3);
    if value.starts_with(['=', '+', '-', '@', '\t', '\r', '\n', '|']) {
        v.push('\'');
    }
    v.push_str(&value.replace('"', "\"\""));

    if v.contains([',', '"', '\n', '\'']) {
        format!("\"{v}\"")
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(escape_csv("App\\Jobs\\SendMail"), "App\\Jobs\\SendMail");
        assert_eq!(escape_csv(""), "");
    }

    #[test]
    fn formula_prefix_is_neutralized_and_quoted() {
        assert_eq!(escape_csv("=SUM(A1:A2)"), "\"'=SUM(A1:A2)\"");
        assert_eq!(escape_csv("@cmd"), "\"'@cmd\"");
        assert_eq!(escape_csv("-1"), "\"'-1\"");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
    }
}
