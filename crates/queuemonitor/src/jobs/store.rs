use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::jobs::filter::{JobFilter, SortColumn, SortDirection};
use crate::jobs::model::{JobPatch, JobRecord, JobStatus, NewJobRecord};
use crate::jobs::worker_context::WorkerContext;

/// Everything the Start transition needs to decide and act atomically.
#[derive(Debug, Clone)]
pub struct StartTransition {
    pub job_id: String,
    /// The transport's attempt counter for this delivery.
    pub attempts: i32,
    /// Record to insert if the job was never seen at enqueue time.
    pub enqueue: NewJobRecord,
    pub worker: WorkerContext,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartAction {
    /// A queued record moved to processing.
    Advanced,
    /// No record existed; one was created already processing.
    Synthesized,
    /// The transport retried; a new linked attempt was inserted.
    Retried,
    /// Duplicate delivery, nothing changed.
    Duplicate,
}

/// Result of the find-or-create behind Enqueue.
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub record: JobRecord,
    /// False when a record for the uuid already existed.
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub record: JobRecord,
    pub action: StartAction,
}

/// Grouping used by [`JobStore::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Global,
    Server,
    /// Grouped by queue and connection.
    Queue,
    JobClass,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Global => "global",
            Dimension::Server => "server",
            Dimension::Queue => "queue",
            Dimension::JobClass => "job_class",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateScope {
    /// Restrict to one server / queue / job class.
    pub value: Option<String>,
    /// Only records created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
}

impl AggregateScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(value: Option<&str>) -> Self {
        Self {
            value: value.map(str::to_string),
            created_after: None,
        }
    }

    pub fn since(created_after: DateTime<Utc>) -> Self {
        Self {
            value: None,
            created_after: Some(created_after),
        }
    }
}

/// Raw per-group counters. Rates are derived by the statistics engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AggregateRow {
    pub key: Option<String>,
    pub connection: Option<String>,
    pub total: i64,
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub timeout: i64,
    pub cancelled: i64,
    pub avg_duration_ms: Option<f64>,
    pub max_duration_ms: Option<i64>,
    pub avg_memory_mb: Option<f64>,
    pub max_memory_mb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FailurePattern {
    pub exception_class: String,
    pub count: i64,
    pub affected_job_classes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagStatistic {
    pub tag: String,
    pub count: i64,
    pub successful_count: i64,
    pub success_rate: f64,
}

/// Slim projection used by the performance analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub job_class: String,
    pub queue: String,
    pub status: JobStatus,
    pub duration_ms: Option<i64>,
    pub queued_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Durable storage of job attempts and their tags.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, record: NewJobRecord) -> Result<JobRecord>;

    /// Updates the latest attempt of `uuid`.
    async fn update(&self, uuid: &str, patch: JobPatch) -> Result<JobRecord>;

    async fn update_by_id(&self, id: i64, patch: JobPatch) -> Result<JobRecord>;

    /// Applies `patch` only while the record's status is one of `from`.
    /// Returns `None` if the record moved on (or is gone).
    async fn transition(
        &self,
        id: i64,
        from: &[JobStatus],
        patch: JobPatch,
    ) -> Result<Option<JobRecord>>;

    /// Inserts `record` unless the uuid is already known, atomically with
    /// respect to `record_start` for the same uuid.
    async fn record_enqueue(&self, record: NewJobRecord) -> Result<EnqueueOutcome>;

    /// Read-decide-write of the Start transition, serialized per job id and
    /// per uuid.
    async fn record_start(&self, start: StartTransition) -> Result<StartOutcome>;

    async fn find_by_id(&self, id: i64) -> Result<Option<JobRecord>>;

    /// Latest attempt of the logical job.
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<JobRecord>>;

    async fn find_all_by_uuid(&self, uuid: &str) -> Result<Vec<JobRecord>>;

    /// Latest attempt carrying this transport id.
    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<JobRecord>>;

    /// Records whose `retried_from_id` is in `parent_ids`.
    async fn find_children(&self, parent_ids: &[i64]) -> Result<Vec<JobRecord>>;

    async fn query(&self, filter: &JobFilter) -> Result<Vec<JobRecord>>;

    /// Count of matching records; ignores limit, offset and sort.
    async fn count(&self, filter: &JobFilter) -> Result<i64>;

    /// Removes every attempt of `uuid`. Returns false if none existed.
    async fn delete(&self, uuid: &str) -> Result<bool>;

    /// Deletes records created before `cutoff`, limited to `statuses`
    /// unless empty.
    async fn prune(&self, cutoff: DateTime<Utc>, statuses: &[JobStatus]) -> Result<u64>;

    /// Insert-or-ignore of normalized tag rows.
    async fn store_tags(&self, record_id: i64, tags: &[String]) -> Result<()>;

    async fn all_tags(&self) -> Result<Vec<String>>;

    async fn tag_statistics(&self) -> Result<Vec<TagStatistic>>;

    async fn aggregate(&self, dimension: Dimension, scope: &AggregateScope)
        -> Result<Vec<AggregateRow>>;

    /// Exception classes of failed/timed-out records, most frequent first.
    async fn failure_patterns(&self, limit: i64) -> Result<Vec<FailurePattern>>;

    /// Every matching record projected for percentile math. Ignores limit.
    async fn metric_samples(&self, filter: &JobFilter) -> Result<Vec<MetricSample>>;

    async fn ping(&self) -> Result<()>;

    /// Failed and timed-out attempts, most recently finished first.
    async fn failed_jobs(&self, limit: i64) -> Result<Vec<JobRecord>> {
        let filter = JobFilter::new()
            .with_statuses([JobStatus::Failed, JobStatus::Timeout])
            .with_limit(limit)
            .sorted_by(SortColumn::CompletedAt, SortDirection::Desc);
        self.query(&filter).await
    }

    async fn recent_jobs(&self, limit: i64) -> Result<Vec<JobRecord>> {
        self.query(&JobFilter::new().with_limit(limit)).await
    }

    async fn jobs_by_queue(
        &self,
        queue: &str,
        connection: Option<&str>,
        limit: i64,
    ) -> Result<Vec<JobRecord>> {
        let mut filter = JobFilter::new().with_queue(queue).with_limit(limit);
        filter.connection = connection.map(str::to_string);
        self.query(&filter).await
    }

    async fn jobs_by_server(&self, server_name: &str, limit: i64) -> Result<Vec<JobRecord>> {
        let mut filter = JobFilter::new().with_limit(limit);
        filter.server_names.push(server_name.to_string());
        self.query(&filter).await
    }
}
