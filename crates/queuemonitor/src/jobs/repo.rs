// crates/queuemonitor/src/jobs/repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgExecutor;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use crate::error::{MonitorError, Result};
use crate::jobs::filter::JobFilter;
use crate::jobs::model::{
    ExceptionInfo, JobPatch, JobRecord, JobStatus, NewJobRecord, WorkerType,
};
use crate::jobs::store::{
    AggregateRow, AggregateScope, Dimension, EnqueueOutcome, FailurePattern, JobStore,
    MetricSample, StartAction, StartOutcome, StartTransition, TagStatistic,
};
use crate::jobs::transitions::{plan_start, StartPlan};

/// Postgres-backed [`JobStore`] over `queue_monitor_jobs` / `queue_monitor_tags`.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    uuid: String,
    job_id: Option<String>,
    job_class: String,
    display_name: Option<String>,
    connection: String,
    queue: String,
    payload: Option<Value>,
    status: String,
    attempt: i32,
    max_attempts: i32,
    retried_from_id: Option<i64>,
    server_name: Option<String>,
    worker_id: Option<String>,
    worker_type: String,
    cpu_time_ms: Option<f64>,
    memory_peak_mb: Option<f64>,
    file_descriptors: Option<i32>,
    duration_ms: Option<i64>,
    exception_class: Option<String>,
    exception_message: Option<String>,
    exception_trace: Option<String>,
    tags: Option<Value>,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = MonitorError;

    fn try_from(row: JobRow) -> Result<Self> {
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| MonitorError::Corrupt(format!("status {:?} on job {}", row.status, row.id)))?;
        let worker_type = WorkerType::parse(&row.worker_type).ok_or_else(|| {
            MonitorError::Corrupt(format!("worker_type {:?} on job {}", row.worker_type, row.id))
        })?;
        let tags = match row.tags {
            Some(v) => Some(
                serde_json::from_value::<Vec<String>>(v)
                    .map_err(|e| MonitorError::Corrupt(format!("tags on job {}: {e}", row.id)))?,
            ),
            None => None,
        };
        let exception = row.exception_class.map(|class| ExceptionInfo {
            class,
            message: row.exception_message.unwrap_or_default(),
            trace: row.exception_trace.unwrap_or_default(),
        });

        Ok(JobRecord {
            id: row.id,
            uuid: row.uuid,
            job_id: row.job_id,
            job_class: row.job_class,
            display_name: row.display_name,
            connection: row.connection,
            queue: row.queue,
            payload: row.payload,
            status,
            attempt: row.attempt,
            max_attempts: row.max_attempts,
            retried_from_id: row.retried_from_id,
            server_name: row.server_name,
            worker_id: row.worker_id,
            worker_type,
            cpu_time_ms: row.cpu_time_ms,
            memory_peak_mb: row.memory_peak_mb,
            file_descriptors: row.file_descriptors,
            duration_ms: row.duration_ms,
            exception,
            tags,
            queued_at: row.queued_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SampleRow {
    job_class: String,
    queue: String,
    status: String,
    duration_ms: Option<i64>,
    queued_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

fn into_records(rows: Vec<JobRow>) -> Result<Vec<JobRecord>> {
    rows.into_iter().map(JobRecord::try_from).collect()
}

fn tags_json(tags: &Option<Vec<String>>) -> Option<Value> {
    tags.as_ref()
        .map(|t| Value::Array(t.iter().cloned().map(Value::String).collect()))
}

fn status_strings(statuses: &[JobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

// `\` is the default LIKE escape in Postgres.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Transaction-scoped lock on a logical job, in its own key space so it
/// never collides with the transport-id lock.
async fn lock_uuid<'e, E>(exec: E, uuid: &str) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('queue_monitor_uuid'), hashtext($1))")
        .bind(uuid)
        .execute(exec)
        .await?;
    Ok(())
}

async fn insert_row<'e, E>(exec: E, rec: &NewJobRecord) -> Result<JobRecord>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO queue_monitor_jobs (
            uuid, job_id, job_class, display_name, connection, queue, payload,
            status, attempt, max_attempts, retried_from_id,
            server_name, worker_id, worker_type,
            tags, queued_at, started_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING *
        "#,
    )
    .bind(&rec.uuid)
    .bind(&rec.job_id)
    .bind(&rec.job_class)
    .bind(&rec.display_name)
    .bind(&rec.connection)
    .bind(&rec.queue)
    .bind(&rec.payload)
    .bind(rec.status.as_str())
    .bind(rec.attempt)
    .bind(rec.max_attempts)
    .bind(rec.retried_from_id)
    .bind(&rec.worker.server_name)
    .bind(&rec.worker.worker_id)
    .bind(rec.worker.worker_type.as_str())
    .bind(tags_json(&rec.tags))
    .bind(rec.queued_at)
    .bind(rec.started_at)
    .fetch_one(exec)
    .await?;

    row.try_into()
}

/// COALESCE-per-column update. `from` limits the update to records whose
/// status is in the set, which makes it a compare-and-swap.
async fn patch_row<'e, E>(
    exec: E,
    id: i64,
    patch: &JobPatch,
    from: Option<&[JobStatus]>,
) -> Result<Option<JobRecord>>
where
    E: PgExecutor<'e>,
{
    let exception = patch.exception.as_ref();
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE queue_monitor_jobs
        SET job_id            = COALESCE($2, job_id),
            status            = COALESCE($3, status),
            attempt           = COALESCE($4, attempt),
            server_name       = COALESCE($5, server_name),
            worker_id         = COALESCE($6, worker_id),
            worker_type       = COALESCE($7, worker_type),
            cpu_time_ms       = COALESCE($8, cpu_time_ms),
            memory_peak_mb    = COALESCE($9, memory_peak_mb),
            file_descriptors  = COALESCE($10, file_descriptors),
            duration_ms       = COALESCE($11, duration_ms),
            exception_class   = COALESCE($12, exception_class),
            exception_message = COALESCE($13, exception_message),
            exception_trace   = COALESCE($14, exception_trace),
            tags              = COALESCE($15, tags),
            started_at        = COALESCE($16, started_at),
            completed_at      = COALESCE($17, completed_at),
            updated_at        = now()
        WHERE id = $1
          AND ($18::text[] IS NULL OR status = ANY($18))
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&patch.job_id)
    .bind(patch.status.map(|s| s.as_str()))
    .bind(patch.attempt)
    .bind(&patch.server_name)
    .bind(&patch.worker_id)
    .bind(patch.worker_type.map(|w| w.as_str()))
    .bind(patch.cpu_time_ms)
    .bind(patch.memory_peak_mb)
    .bind(patch.file_descriptors)
    .bind(patch.duration_ms)
    .bind(exception.map(|e| e.class.as_str()))
    .bind(exception.map(|e| e.message.as_str()))
    .bind(exception.map(|e| e.trace.as_str()))
    .bind(tags_json(&patch.tags))
    .bind(patch.started_at)
    .bind(patch.completed_at)
    .bind(from.map(status_strings))
    .fetch_optional(exec)
    .await?;

    row.map(JobRecord::try_from).transpose()
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &JobFilter) {
    if !f.statuses.is_empty() {
        qb.push(" AND status = ANY(")
            .push_bind(status_strings(&f.statuses))
            .push(")");
    }
    if !f.queues.is_empty() {
        qb.push(" AND queue = ANY(").push_bind(f.queues.clone()).push(")");
    }
    if let Some(c) = &f.connection {
        qb.push(" AND connection = ").push_bind(c.clone());
    }
    if !f.job_classes.is_empty() {
        qb.push(" AND job_class = ANY(")
            .push_bind(f.job_classes.clone())
            .push(")");
    }
    if !f.server_names.is_empty() {
        qb.push(" AND server_name = ANY(")
            .push_bind(f.server_names.clone())
            .push(")");
    }
    if let Some(w) = &f.worker_id {
        qb.push(" AND worker_id = ").push_bind(w.clone());
    }
    if let Some(t) = f.worker_type {
        qb.push(" AND worker_type = ").push_bind(t.as_str());
    }
    if !f.tags.is_empty() {
        qb.push(" AND tags ?& ").push_bind(f.tags.clone()).push("::text[]");
    }

    let windows = [
        ("queued_at", f.queued_after, f.queued_before),
        ("started_at", f.started_after, f.started_before),
        ("completed_at", f.completed_after, f.completed_before),
    ];
    for (column, after, before) in windows {
        if let Some(a) = after {
            qb.push(format!(" AND {column} >= ")).push_bind(a);
        }
        if let Some(b) = before {
            qb.push(format!(" AND {column} <= ")).push_bind(b);
        }
    }

    if let Some(min) = f.min_duration_ms {
        qb.push(" AND duration_ms >= ").push_bind(min);
    }
    if let Some(max) = f.max_duration_ms {
        qb.push(" AND duration_ms <= ").push_bind(max);
    }

    if let Some(term) = f.search_term() {
        let pattern = like_pattern(term);
        qb.push(" AND (job_class ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR display_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR exception_message ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR uuid ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, record: NewJobRecord) -> Result<JobRecord> {
        insert_row(&self.pool, &record).await
    }

    async fn update(&self, uuid: &str, patch: JobPatch) -> Result<JobRecord> {
        let current = self
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| MonitorError::NotFound(uuid.to_string()))?;
        patch_row(&self.pool, current.id, &patch, None)
            .await?
            .ok_or_else(|| MonitorError::NotFound(uuid.to_string()))
    }

    async fn update_by_id(&self, id: i64, patch: JobPatch) -> Result<JobRecord> {
        patch_row(&self.pool, id, &patch, None)
            .await?
            .ok_or_else(|| MonitorError::NotFound(id.to_string()))
    }

    #[instrument(skip(self, patch), err)]
    async fn transition(
        &self,
        id: i64,
        from: &[JobStatus],
        patch: JobPatch,
    ) -> Result<Option<JobRecord>> {
        patch_row(&self.pool, id, &patch, Some(from)).await
    }

    #[instrument(skip(self, record), fields(uuid = %record.uuid), err)]
    async fn record_enqueue(&self, record: NewJobRecord) -> Result<EnqueueOutcome> {
        let mut tx = self.pool.begin().await?;
        lock_uuid(&mut *tx, &record.uuid).await?;

        let existing = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM queue_monitor_jobs
            WHERE uuid = $1
            ORDER BY attempt DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&record.uuid)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some(row) => EnqueueOutcome {
                record: JobRecord::try_from(row)?,
                created: false,
            },
            None => EnqueueOutcome {
                record: insert_row(&mut *tx, &record).await?,
                created: true,
            },
        };

        tx.commit().await?;
        Ok(outcome)
    }

    #[instrument(skip(self, start), fields(job_id = %start.job_id, attempts = start.attempts), err)]
    async fn record_start(&self, start: StartTransition) -> Result<StartOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent Start deliveries for one transport id.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&start.job_id)
            .execute(&mut *tx)
            .await?;
        lock_uuid(&mut *tx, &start.enqueue.uuid).await?;

        let by_job_id = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM queue_monitor_jobs
            WHERE job_id = $1
            ORDER BY attempt DESC, id DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&start.job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let existing = match by_job_id {
            Some(row) => Some(row),
            None => {
                sqlx::query_as::<_, JobRow>(
                    r#"
                    SELECT * FROM queue_monitor_jobs
                    WHERE uuid = $1
                    ORDER BY attempt DESC, id DESC
                    LIMIT 1
                    FOR UPDATE
                    "#,
                )
                .bind(&start.enqueue.uuid)
                .fetch_optional(&mut *tx)
                .await?
            }
        };
        let existing = existing.map(JobRecord::try_from).transpose()?;

        let outcome = match plan_start(existing.as_ref(), &start) {
            StartPlan::Advance { id, patch } => StartOutcome {
                record: patch_row(&mut *tx, id, &patch, None)
                    .await?
                    .ok_or_else(|| MonitorError::NotFound(id.to_string()))?,
                action: StartAction::Advanced,
            },
            StartPlan::Synthesize { record } => StartOutcome {
                record: insert_row(&mut *tx, &record).await?,
                action: StartAction::Synthesized,
            },
            StartPlan::Retry { record } => StartOutcome {
                record: insert_row(&mut *tx, &record).await?,
                action: StartAction::Retried,
            },
            StartPlan::Ignore => StartOutcome {
                record: existing.ok_or_else(|| MonitorError::NotFound(start.job_id.clone()))?,
                action: StartAction::Duplicate,
            },
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM queue_monitor_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRecord::try_from).transpose()
    }

    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM queue_monitor_jobs
            WHERE uuid = $1
            ORDER BY attempt DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRecord::try_from).transpose()
    }

    async fn find_all_by_uuid(&self, uuid: &str) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM queue_monitor_jobs
            WHERE uuid = $1
            ORDER BY attempt ASC, id ASC
            "#,
        )
        .bind(uuid)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM queue_monitor_jobs
            WHERE job_id = $1
            ORDER BY attempt DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRecord::try_from).transpose()
    }

    async fn find_children(&self, parent_ids: &[i64]) -> Result<Vec<JobRecord>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM queue_monitor_jobs WHERE retried_from_id = ANY($1)",
        )
        .bind(parent_ids)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn query(&self, filter: &JobFilter) -> Result<Vec<JobRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM queue_monitor_jobs WHERE 1=1");
        push_filter(&mut qb, filter);

        // Column and direction come from closed enums, never from input text.
        let dir = filter.sort_direction.as_sql();
        qb.push(format!(
            " ORDER BY {} {dir} NULLS LAST, id {dir}",
            filter.sort_by.as_sql()
        ));
        qb.push(" LIMIT ")
            .push_bind(filter.effective_limit())
            .push(" OFFSET ")
            .push_bind(filter.effective_offset());

        let rows = qb.build_query_as::<JobRow>().fetch_all(&self.pool).await?;
        into_records(rows)
    }

    async fn count(&self, filter: &JobFilter) -> Result<i64> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*)::bigint FROM queue_monitor_jobs WHERE 1=1");
        push_filter(&mut qb, filter);
        let n = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(n)
    }

    async fn delete(&self, uuid: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM queue_monitor_jobs WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    #[instrument(skip(self), err)]
    async fn prune(&self, cutoff: DateTime<Utc>, statuses: &[JobStatus]) -> Result<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM queue_monitor_jobs
            WHERE created_at < $1
              AND (cardinality($2::text[]) = 0 OR status = ANY($2))
            "#,
        )
        .bind(cutoff)
        .bind(status_strings(statuses))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }

    async fn store_tags(&self, record_id: i64, tags: &[String]) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO queue_monitor_tags (job_id, tag)
            SELECT $1, t FROM unnest($2::text[]) AS t
            ON CONFLICT (job_id, tag) DO NOTHING
            "#,
        )
        .bind(record_id)
        .bind(tags)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn all_tags(&self) -> Result<Vec<String>> {
        let tags = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT tag FROM queue_monitor_tags ORDER BY tag",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    async fn tag_statistics(&self) -> Result<Vec<TagStatistic>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT
                t.tag,
                COUNT(*)::bigint AS count,
                COUNT(*) FILTER (WHERE j.status = 'completed')::bigint AS successful_count
            FROM queue_monitor_tags t
            JOIN queue_monitor_jobs j ON j.id = t.job_id
            GROUP BY t.tag
            ORDER BY count DESC, t.tag ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(tag, count, successful_count)| TagStatistic {
                success_rate: if count == 0 {
                    0.0
                } else {
                    (successful_count as f64 / count as f64 * 10_000.0).round() / 100.0
                },
                tag,
                count,
                successful_count,
            })
            .collect())
    }

    async fn aggregate(
        &self,
        dimension: Dimension,
        scope: &AggregateScope,
    ) -> Result<Vec<AggregateRow>> {
        let (key_expr, group_by) = match dimension {
            Dimension::Global => ("NULL::text AS key, NULL::text AS connection", None),
            Dimension::Server => (
                "server_name AS key, NULL::text AS connection",
                Some("server_name"),
            ),
            Dimension::Queue => ("queue AS key, connection", Some("queue, connection")),
            Dimension::JobClass => (
                "job_class AS key, NULL::text AS connection",
                Some("job_class"),
            ),
        };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(key_expr);
        qb.push(
            r#",
                COUNT(*)::bigint AS total,
                COUNT(*) FILTER (WHERE status = 'queued')::bigint AS queued,
                COUNT(*) FILTER (WHERE status = 'processing')::bigint AS processing,
                COUNT(*) FILTER (WHERE status = 'completed')::bigint AS completed,
                COUNT(*) FILTER (WHERE status = 'failed')::bigint AS failed,
                COUNT(*) FILTER (WHERE status = 'timeout')::bigint AS timeout,
                COUNT(*) FILTER (WHERE status = 'cancelled')::bigint AS cancelled,
                AVG(duration_ms)::float8 AS avg_duration_ms,
                MAX(duration_ms)::bigint AS max_duration_ms,
                AVG(memory_peak_mb)::float8 AS avg_memory_mb,
                MAX(memory_peak_mb)::float8 AS max_memory_mb
            FROM queue_monitor_jobs
            WHERE 1=1"#,
        );
        if let Some(after) = scope.created_after {
            qb.push(" AND created_at >= ").push_bind(after);
        }
        if let (Some(value), Some(_)) = (&scope.value, group_by) {
            let column = match dimension {
                Dimension::Server => "server_name",
                Dimension::Queue => "queue",
                _ => "job_class",
            };
            qb.push(format!(" AND {column} = ")).push_bind(value.clone());
        }
        if let Some(group_by) = group_by {
            qb.push(format!(" GROUP BY {group_by}"));
            match dimension {
                Dimension::JobClass => qb.push(" ORDER BY total DESC, job_class ASC"),
                _ => qb.push(format!(" ORDER BY {group_by}")),
            };
        }

        let rows = qb
            .build_query_as::<AggregateRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn failure_patterns(&self, limit: i64) -> Result<Vec<FailurePattern>> {
        let rows = sqlx::query_as::<_, FailurePattern>(
            r#"
            SELECT
                exception_class,
                COUNT(*)::bigint AS count,
                COUNT(DISTINCT job_class)::bigint AS affected_job_classes
            FROM queue_monitor_jobs
            WHERE status IN ('failed', 'timeout')
              AND exception_class IS NOT NULL
            GROUP BY exception_class
            ORDER BY count DESC, exception_class ASC
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn metric_samples(&self, filter: &JobFilter) -> Result<Vec<MetricSample>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT job_class, queue, status, duration_ms, queued_at, completed_at \
             FROM queue_monitor_jobs WHERE 1=1",
        );
        push_filter(&mut qb, filter);
        let rows = qb.build_query_as::<SampleRow>().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|r| {
                let status = JobStatus::parse(&r.status)
                    .ok_or_else(|| MonitorError::Corrupt(format!("status {:?}", r.status)))?;
                Ok(MetricSample {
                    job_class: r.job_class,
                    queue: r.queue,
                    status,
                    duration_ms: r.duration_ms,
                    queued_at: r.queued_at,
                    completed_at: r.completed_at,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
