use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

/// Pushes a raw job payload back onto a queue.
#[async_trait]
pub trait QueueDispatcher: Send + Sync {
    /// Returns the transport's id for the new job, when it assigns one.
    async fn push_raw(
        &self,
        connection: &str,
        queue: &str,
        payload: &Value,
    ) -> anyhow::Result<Option<String>>;
}

/// Decides whether a job class can still be instantiated by the workers.
pub trait JobClassResolver: Send + Sync {
    fn is_available(&self, job_class: &str) -> bool;
}

/// Accepts every class.
pub struct AnyJobClass;

impl JobClassResolver for AnyJobClass {
    fn is_available(&self, _job_class: &str) -> bool {
        true
    }
}

/// Allow-list of deployable job classes.
#[derive(Debug, Clone, Default)]
pub struct KnownJobClasses {
    classes: Vec<String>,
}

impl KnownJobClasses {
    pub fn new(classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }
}

impl JobClassResolver for KnownJobClasses {
    fn is_available(&self, job_class: &str) -> bool {
        self.classes.iter().any(|c| c == job_class)
    }
}

/// Writes replayed payloads to `queue_monitor_outbox` for the transport to
/// drain. The outbox row id is the new job id.
#[derive(Clone)]
pub struct PgOutboxDispatcher {
    pool: PgPool,
}

impl PgOutboxDispatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueDispatcher for PgOutboxDispatcher {
    async fn push_raw(
        &self,
        connection: &str,
        queue: &str,
        payload: &Value,
    ) -> anyhow::Result<Option<String>> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO queue_monitor_outbox (connection, queue, payload)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(connection)
        .bind(queue)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(id.to_string()))
    }
}
