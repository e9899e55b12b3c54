use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::alerting::{BACKLOG_THRESHOLD, STUCK_AFTER_MINUTES};
use crate::error::{MonitorError, Result};
use crate::jobs::filter::JobFilter;
use crate::jobs::model::JobStatus;
use crate::jobs::store::JobStore;

const MAX_HEALTHY_ERROR_RATE: f64 = 10.0;
const MAX_HEALTHY_PROCESSING: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub healthy: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl CheckResult {
    fn pass(message: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
            value,
        }
    }

    fn fail(message: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub checked_at: DateTime<Utc>,
    pub checks: BTreeMap<String, CheckResult>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == OverallStatus::Healthy
    }

    /// Share of passing checks, 0 to 100.
    pub fn score(&self) -> u8 {
        if self.checks.is_empty() {
            return 0;
        }
        let healthy = self.checks.values().filter(|c| c.healthy).count();
        ((healthy as f64 / self.checks.len() as f64) * 100.0).round() as u8
    }
}

/// Liveness-style checks of the monitor itself.
#[derive(Clone)]
pub struct HealthCheck {
    store: Arc<dyn JobStore>,
}

impl HealthCheck {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self) -> HealthReport {
        let now = Utc::now();
        let mut checks = BTreeMap::new();

        // Without a database the remaining checks cannot run.
        let database = self.database().await;
        let db_up = database.healthy;
        checks.insert("database".to_string(), database);

        if db_up {
            checks.insert("recent_activity".to_string(), self.recent_activity(now).await);
            checks.insert("stuck_jobs".to_string(), self.stuck_jobs(now).await);
            checks.insert("error_rate".to_string(), self.error_rate(now).await);
            checks.insert("queue_backlog".to_string(), self.queue_backlog().await);
        }

        let status = if checks.values().all(|c| c.healthy) {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        };
        HealthReport {
            status,
            checked_at: now,
            checks,
        }
    }

    pub async fn score(&self) -> u8 {
        self.check().await.score()
    }

    async fn database(&self) -> CheckResult {
        let reachable = async {
            self.store.ping().await?;
            self.store.count(&JobFilter::new()).await
        };
        match reachable.await {
            Ok(total) => CheckResult::pass(
                format!("Database reachable, {total} records"),
                Some(total as f64),
            ),
            Err(e) => CheckResult::fail(format!("Database unreachable: {e}"), None),
        }
    }

    async fn recent_activity(&self, now: DateTime<Utc>) -> CheckResult {
        let mut filter = JobFilter::new();
        filter.queued_after = Some(now - Duration::hours(1));
        outcome(self.store.count(&filter).await, |n| {
            if n > 0 {
                CheckResult::pass(format!("{n} jobs queued in the last hour"), Some(n as f64))
            } else {
                CheckResult::fail("No jobs queued in the last hour", Some(0.0))
            }
        })
    }

    async fn stuck_jobs(&self, now: DateTime<Utc>) -> CheckResult {
        let mut filter = JobFilter::new().with_statuses([JobStatus::Processing]);
        filter.started_before = Some(now - Duration::minutes(STUCK_AFTER_MINUTES));
        outcome(self.store.count(&filter).await, |n| {
            if n == 0 {
                CheckResult::pass("No stuck jobs", Some(0.0))
            } else {
                CheckResult::fail(format!("{n} jobs stuck in processing"), Some(n as f64))
            }
        })
    }

    async fn error_rate(&self, now: DateTime<Utc>) -> CheckResult {
        let mut window = JobFilter::new();
        window.queued_after = Some(now - Duration::hours(1));
        let counts = async {
            let total = self.store.count(&window).await?;
            let failed = self
                .store
                .count(&window.clone().with_statuses([JobStatus::Failed, JobStatus::Timeout]))
                .await?;
            Ok::<_, MonitorError>((failed, total))
        };
        outcome(counts.await, |(failed, total)| {
            let rate = if total == 0 {
                0.0
            } else {
                (failed as f64 / total as f64 * 10_000.0).round() / 100.0
            };
            if rate < MAX_HEALTHY_ERROR_RATE {
                CheckResult::pass(format!("Error rate {rate}%"), Some(rate))
            } else {
                CheckResult::fail(format!("Error rate {rate}% is too high"), Some(rate))
            }
        })
    }

    async fn queue_backlog(&self) -> CheckResult {
        let counts = async {
            let queued = self
                .store
                .count(&JobFilter::new().with_statuses([JobStatus::Queued]))
                .await?;
            let processing = self
                .store
                .count(&JobFilter::new().with_statuses([JobStatus::Processing]))
                .await?;
            Ok::<_, MonitorError>((queued, processing))
        };
        outcome(counts.await, |(queued, processing)| {
            let message = format!("{queued} queued, {processing} processing");
            if queued < BACKLOG_THRESHOLD && processing < MAX_HEALTHY_PROCESSING {
                CheckResult::pass(message, Some(queued as f64))
            } else {
                CheckResult::fail(message, Some(queued as f64))
            }
        })
    }
}

fn outcome<T>(result: Result<T>, judge: impl FnOnce(T) -> CheckResult) -> CheckResult {
    match result {
        Ok(v) => judge(v),
        Err(e) => CheckResult::fail(format!("Check failed: {e}"), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_share_of_passing_checks() {
        let mut checks = BTreeMap::new();
        checks.insert("a".to_string(), CheckResult::pass("ok", None));
        checks.insert("b".to_string(), CheckResult::pass("ok", None));
        checks.insert("c".to_string(), CheckResult::fail("bad", None));
        let report = HealthReport {
            status: OverallStatus::Degraded,
            checked_at: Utc::now(),
            checks,
        };
        assert_eq!(report.score(), 67);
    }
}
