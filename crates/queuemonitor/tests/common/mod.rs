#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use queuemonitor::config::MonitorConfig;
use queuemonitor::jobs::store::{
    AggregateRow, AggregateScope, Dimension, EnqueueOutcome, FailurePattern, MetricSample,
    StartOutcome, StartTransition, TagStatistic,
};
use queuemonitor::jobs::{
    ExceptionInfo, JobFilter, JobPatch, JobRecord, JobStatus, JobStore, MemoryJobStore,
    NewJobRecord, QueuedJob, WorkerContext, WorkerType,
};
use queuemonitor::replay::QueueDispatcher;
use queuemonitor::Monitor;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Connects to `TEST_DATABASE_URL`, migrates and truncates. `None` when the
/// variable is unset so Postgres tests can skip.
pub async fn setup_db() -> Option<PgPool> {
    let _ = dotenvy::dotenv();

    let url = std::env::var("TEST_DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");

    sqlx::query(
        r#"
        TRUNCATE TABLE
            queue_monitor_tags,
            queue_monitor_outbox,
            queue_monitor_jobs
        RESTART IDENTITY CASCADE
        "#,
    )
    .execute(&pool)
    .await
    .expect("truncate failed");

    Some(pool)
}

/// Records every push; can be switched to fail.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub pushed: Mutex<Vec<(String, String, Value)>>,
    fail: AtomicBool,
    next: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.pushed.lock().len()
    }
}

#[async_trait]
impl QueueDispatcher for RecordingDispatcher {
    async fn push_raw(
        &self,
        connection: &str,
        queue: &str,
        payload: &Value,
    ) -> anyhow::Result<Option<String>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("queue connection refused");
        }
        self.pushed
            .lock()
            .push((connection.to_string(), queue.to_string(), payload.clone()));
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("replayed-{n}")))
    }
}

/// Memory store whose enqueue-side calls stall first, widening any window
/// between reading and inserting a record.
pub struct SlowEnqueueStore {
    pub inner: Arc<MemoryJobStore>,
    pub delay: std::time::Duration,
}

impl SlowEnqueueStore {
    pub fn new(inner: Arc<MemoryJobStore>) -> Self {
        Self {
            inner,
            delay: std::time::Duration::from_millis(50),
        }
    }

    async fn stall(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

#[async_trait]
impl JobStore for SlowEnqueueStore {
    async fn create(&self, record: NewJobRecord) -> queuemonitor::Result<JobRecord> {
        self.stall().await;
        self.inner.create(record).await
    }

    async fn update(&self, uuid: &str, patch: JobPatch) -> queuemonitor::Result<JobRecord> {
        self.inner.update(uuid, patch).await
    }

    async fn update_by_id(&self, id: i64, patch: JobPatch) -> queuemonitor::Result<JobRecord> {
        self.inner.update_by_id(id, patch).await
    }

    async fn transition(
        &self,
        id: i64,
        from: &[JobStatus],
        patch: JobPatch,
    ) -> queuemonitor::Result<Option<JobRecord>> {
        self.inner.transition(id, from, patch).await
    }

    async fn record_enqueue(&self, record: NewJobRecord) -> queuemonitor::Result<EnqueueOutcome> {
        self.stall().await;
        self.inner.record_enqueue(record).await
    }

    async fn record_start(&self, start: StartTransition) -> queuemonitor::Result<StartOutcome> {
        self.inner.record_start(start).await
    }

    async fn find_by_id(&self, id: i64) -> queuemonitor::Result<Option<JobRecord>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_uuid(&self, uuid: &str) -> queuemonitor::Result<Option<JobRecord>> {
        self.inner.find_by_uuid(uuid).await
    }

    async fn find_all_by_uuid(&self, uuid: &str) -> queuemonitor::Result<Vec<JobRecord>> {
        self.inner.find_all_by_uuid(uuid).await
    }

    async fn find_by_job_id(&self, job_id: &str) -> queuemonitor::Result<Option<JobRecord>> {
        self.inner.find_by_job_id(job_id).await
    }

    async fn find_children(&self, parent_ids: &[i64]) -> queuemonitor::Result<Vec<JobRecord>> {
        self.inner.find_children(parent_ids).await
    }

    async fn query(&self, filter: &JobFilter) -> queuemonitor::Result<Vec<JobRecord>> {
        self.inner.query(filter).await
    }

    async fn count(&self, filter: &JobFilter) -> queuemonitor::Result<i64> {
        self.inner.count(filter).await
    }

    async fn delete(&self, uuid: &str) -> queuemonitor::Result<bool> {
        self.inner.delete(uuid).await
    }

    async fn prune(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> queuemonitor::Result<u64> {
        self.inner.prune(cutoff, statuses).await
    }

    async fn store_tags(&self, record_id: i64, tags: &[String]) -> queuemonitor::Result<()> {
        self.inner.store_tags(record_id, tags).await
    }

    async fn all_tags(&self) -> queuemonitor::Result<Vec<String>> {
        self.inner.all_tags().await
    }

    async fn tag_statistics(&self) -> queuemonitor::Result<Vec<TagStatistic>> {
        self.inner.tag_statistics().await
    }

    async fn aggregate(
        &self,
        dimension: Dimension,
        scope: &AggregateScope,
    ) -> queuemonitor::Result<Vec<AggregateRow>> {
        self.inner.aggregate(dimension, scope).await
    }

    async fn failure_patterns(&self, limit: i64) -> queuemonitor::Result<Vec<FailurePattern>> {
        self.inner.failure_patterns(limit).await
    }

    async fn metric_samples(&self, filter: &JobFilter) -> queuemonitor::Result<Vec<MetricSample>> {
        self.inner.metric_samples(filter).await
    }

    async fn ping(&self) -> queuemonitor::Result<()> {
        self.inner.ping().await
    }
}

pub struct Harness {
    pub monitor: Monitor,
    pub store: Arc<MemoryJobStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

/// Defaults with the aggregate cache off so every read sees fresh data.
pub fn test_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.cache.enabled = false;
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: MonitorConfig) -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let monitor = Monitor::new(store.clone(), dispatcher.clone(), config);
    Harness {
        monitor,
        store,
        dispatcher,
    }
}

pub fn worker() -> WorkerContext {
    WorkerContext::new("web-1", "worker-42", WorkerType::QueueWork)
}

pub fn queued_job(uuid: &str) -> QueuedJob {
    QueuedJob::new(uuid, "App\\Jobs\\SendInvoice")
        .on("redis", "emails")
        .with_payload(json!({"invoice_id": 7, "command": "O:11:\"SendInvoice\""}))
}

/// A stored record with sensible defaults; tests adjust fields directly.
pub fn job(uuid: &str, status: JobStatus) -> JobRecord {
    let now = Utc::now();
    let finished = status.is_finished();
    JobRecord {
        id: 0,
        uuid: uuid.to_string(),
        job_id: Some(format!("tx-{uuid}")),
        job_class: "App\\Jobs\\SendInvoice".to_string(),
        display_name: None,
        connection: "redis".to_string(),
        queue: "emails".to_string(),
        payload: Some(json!({"invoice_id": 7})),
        status,
        attempt: 1,
        max_attempts: 3,
        retried_from_id: None,
        server_name: Some("web-1".to_string()),
        worker_id: Some("worker-42".to_string()),
        worker_type: WorkerType::QueueWork,
        cpu_time_ms: None,
        memory_peak_mb: finished.then_some(12.5),
        file_descriptors: None,
        duration_ms: finished.then_some(250),
        exception: status
            .is_failed()
            .then(|| ExceptionInfo::new("RuntimeException", "boom", "#0 main")),
        tags: None,
        queued_at: Some(now - Duration::seconds(5)),
        started_at: (status != JobStatus::Queued).then(|| now - Duration::seconds(1)),
        completed_at: finished.then_some(now),
        created_at: now,
        updated_at: now,
    }
}

/// Shifts every timestamp of `record` back to `at`.
pub fn aged(mut record: JobRecord, at: DateTime<Utc>) -> JobRecord {
    record.created_at = at;
    record.updated_at = at;
    record.queued_at = Some(at);
    if record.started_at.is_some() {
        record.started_at = Some(at);
    }
    if record.completed_at.is_some() {
        record.completed_at = Some(at);
    }
    record
}
