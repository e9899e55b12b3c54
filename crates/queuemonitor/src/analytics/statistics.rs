use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analytics::cache::AggregateCache;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::jobs::store::{
    AggregateRow, AggregateScope, Dimension, FailurePattern, JobStore, TagStatistic,
};

const FAILURE_PATTERN_LIMIT: i64 = 10;

/// Aggregate counters and derived rates for one group of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub total_jobs: i64,
    pub queued_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    /// Failed plus timed out.
    pub failed_jobs: i64,
    pub timeout_jobs: i64,
    pub cancelled_jobs: i64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub avg_duration_ms: Option<f64>,
    pub max_duration_ms: Option<i64>,
    pub avg_memory_mb: Option<f64>,
    pub max_memory_mb: Option<f64>,
}

impl From<&AggregateRow> for JobStatistics {
    fn from(row: &AggregateRow) -> Self {
        let failed = row.failed + row.timeout;
        let success_rate = rate(row.completed, row.total);
        Self {
            total_jobs: row.total,
            queued_jobs: row.queued,
            processing_jobs: row.processing,
            completed_jobs: row.completed,
            failed_jobs: failed,
            timeout_jobs: row.timeout,
            cancelled_jobs: row.cancelled,
            success_rate,
            failure_rate: complement_capped(rate(failed, row.total), success_rate),
            avg_duration_ms: row.avg_duration_ms.map(round2),
            max_duration_ms: row.max_duration_ms,
            avg_memory_mb: row.avg_memory_mb.map(round2),
            max_memory_mb: row.max_memory_mb.map(round2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatistics {
    pub server_name: Option<String>,
    #[serde(flatten)]
    pub stats: JobStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub queue: String,
    pub connection: String,
    #[serde(flatten)]
    pub stats: JobStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobClassStatistics {
    pub job_class: String,
    #[serde(flatten)]
    pub stats: JobStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            HealthStatus::Healthy
        } else if score >= 75.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// Last-hour health of one queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueHealth {
    pub queue: String,
    pub connection: String,
    pub total_jobs: i64,
    pub processing: i64,
    pub failed: i64,
    pub avg_duration_ms: Option<f64>,
    pub failure_rate: f64,
    pub health_score: f64,
    pub status: HealthStatus,
}

/// Percentage rounded to two decimals; zero when `total` is zero.
pub fn rate(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

/// `rate` limited so that `rate + other` never exceeds 100 after rounding.
pub fn complement_capped(rate: f64, other: f64) -> f64 {
    rate.min(100.0 - other).max(0.0)
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Cached aggregate statistics over the record store.
#[derive(Clone)]
pub struct StatisticsEngine {
    store: Arc<dyn JobStore>,
    cache: AggregateCache,
    ttl: Duration,
    queue_health_ttl: Duration,
}

impl StatisticsEngine {
    pub fn new(store: Arc<dyn JobStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            cache: AggregateCache::new(config),
            ttl: config.ttl(),
            queue_health_ttl: config.queue_health_ttl(),
        }
    }

    pub fn cache(&self) -> &AggregateCache {
        &self.cache
    }

    pub async fn global_statistics(&self) -> Result<JobStatistics> {
        let store = self.store.clone();
        self.cache
            .remember(self.cache.key("global", None), self.ttl, || async move {
                let rows = store.aggregate(Dimension::Global, &AggregateScope::all()).await?;
                Ok(rows.first().map(JobStatistics::from).unwrap_or_default())
            })
            .await
    }

    pub async fn server_statistics(&self, server: Option<&str>) -> Result<Vec<ServerStatistics>> {
        let store = self.store.clone();
        let scope = AggregateScope::only(server);
        self.cache
            .remember(self.cache.key("server", server), self.ttl, || async move {
                let rows = store.aggregate(Dimension::Server, &scope).await?;
                Ok(rows
                    .iter()
                    .map(|r| ServerStatistics {
                        server_name: r.key.clone(),
                        stats: JobStatistics::from(r),
                    })
                    .collect::<Vec<_>>())
            })
            .await
    }

    pub async fn queue_statistics(&self, queue: Option<&str>) -> Result<Vec<QueueStatistics>> {
        let store = self.store.clone();
        let scope = AggregateScope::only(queue);
        self.cache
            .remember(self.cache.key("queue", queue), self.ttl, || async move {
                let rows = store.aggregate(Dimension::Queue, &scope).await?;
                Ok(rows
                    .iter()
                    .map(|r| QueueStatistics {
                        queue: r.key.clone().unwrap_or_default(),
                        connection: r.connection.clone().unwrap_or_default(),
                        stats: JobStatistics::from(r),
                    })
                    .collect::<Vec<_>>())
            })
            .await
    }

    /// Ordered by job count, busiest class first.
    pub async fn job_class_statistics(
        &self,
        job_class: Option<&str>,
    ) -> Result<Vec<JobClassStatistics>> {
        let store = self.store.clone();
        let scope = AggregateScope::only(job_class);
        self.cache
            .remember(self.cache.key("job_class", job_class), self.ttl, || async move {
                let rows = store.aggregate(Dimension::JobClass, &scope).await?;
                Ok(rows
                    .iter()
                    .map(|r| JobClassStatistics {
                        job_class: r.key.clone().unwrap_or_default(),
                        stats: JobStatistics::from(r),
                    })
                    .collect::<Vec<_>>())
            })
            .await
    }

    /// Per-queue health over records created in the last hour.
    pub async fn queue_health(&self) -> Result<Vec<QueueHealth>> {
        let store = self.store.clone();
        self.cache
            .remember(
                self.cache.key("queue_health", None),
                self.queue_health_ttl,
                || async move {
                    let since = Utc::now() - chrono::Duration::hours(1);
                    let rows = store
                        .aggregate(Dimension::Queue, &AggregateScope::since(since))
                        .await?;
                    Ok(rows.iter().map(queue_health_from).collect::<Vec<_>>())
                },
            )
            .await
    }

    pub async fn failure_patterns(&self) -> Result<Vec<FailurePattern>> {
        let store = self.store.clone();
        self.cache
            .remember(self.cache.key("failure_patterns", None), self.ttl, || async move {
                store.failure_patterns(FAILURE_PATTERN_LIMIT).await
            })
            .await
    }

    pub async fn tag_statistics(&self) -> Result<Vec<TagStatistic>> {
        let store = self.store.clone();
        self.cache
            .remember(self.cache.key("tags", None), self.ttl, || async move {
                store.tag_statistics().await
            })
            .await
    }

    pub fn flush(&self) {
        self.cache.flush();
    }
}

fn queue_health_from(row: &AggregateRow) -> QueueHealth {
    let failed = row.failed + row.timeout;
    let failure_rate = rate(failed, row.total);
    let health_score = complement_capped(round2(100.0 - failure_rate), failure_rate);
    QueueHealth {
        queue: row.key.clone().unwrap_or_default(),
        connection: row.connection.clone().unwrap_or_default(),
        total_jobs: row.total,
        processing: row.processing,
        failed,
        avg_duration_ms: row.avg_duration_ms.map(round2),
        failure_rate,
        health_score,
        status: HealthStatus::from_score(health_score),
    }
}
