use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::jobs::filter::JobFilter;
use crate::jobs::model::JobStatus;
use crate::jobs::store::JobStore;

pub const STUCK_AFTER_MINUTES: i64 = 30;
pub const CRITICAL_ERROR_RATE: f64 = 0.20;
pub const WARNING_ERROR_RATE: f64 = 0.10;
pub const BACKLOG_THRESHOLD: i64 = 1000;
pub const SLOW_JOB_MS: i64 = 30_000;
pub const SLOW_JOB_COUNT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
    pub count: i64,
}

pub type Alerts = BTreeMap<String, Alert>;

/// On-demand threshold checks over current store contents. Keeps no state
/// between calls.
#[derive(Clone)]
pub struct AlertingEvaluator {
    store: Arc<dyn JobStore>,
}

impl AlertingEvaluator {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self) -> Result<Alerts> {
        self.check_at(Utc::now()).await
    }

    /// Same as [`check`](Self::check) with an explicit clock.
    pub async fn check_at(&self, now: DateTime<Utc>) -> Result<Alerts> {
        let mut alerts = Alerts::new();

        let stuck = self.stuck_jobs(now).await?;
        if stuck > 0 {
            alerts.insert(
                "stuck_jobs".into(),
                Alert {
                    severity: Severity::Warning,
                    message: format!(
                        "{stuck} job(s) stuck in processing for more than {STUCK_AFTER_MINUTES} minutes"
                    ),
                    count: stuck,
                },
            );
        }

        let (failed, total) = self.last_hour_failures(now).await?;
        if total > 0 {
            let error_rate = failed as f64 / total as f64;
            let pct = (error_rate * 10_000.0).round() / 100.0;
            if error_rate > CRITICAL_ERROR_RATE {
                alerts.insert(
                    "high_error_rate".into(),
                    Alert {
                        severity: Severity::Critical,
                        message: format!("High error rate: {pct}% in the last hour"),
                        count: failed,
                    },
                );
            } else if error_rate > WARNING_ERROR_RATE {
                alerts.insert(
                    "elevated_error_rate".into(),
                    Alert {
                        severity: Severity::Warning,
                        message: format!("Elevated error rate: {pct}% in the last hour"),
                        count: failed,
                    },
                );
            }
        }

        let backlog = self
            .store
            .count(&JobFilter::new().with_statuses([JobStatus::Queued]))
            .await?;
        if backlog > BACKLOG_THRESHOLD {
            alerts.insert(
                "high_backlog".into(),
                Alert {
                    severity: Severity::Warning,
                    message: format!("{backlog} jobs waiting in queue"),
                    count: backlog,
                },
            );
        }

        let slow = self.slow_jobs_today(now).await?;
        if slow > SLOW_JOB_COUNT {
            alerts.insert(
                "slow_jobs".into(),
                Alert {
                    severity: Severity::Info,
                    message: format!("{slow} jobs took longer than {}s today", SLOW_JOB_MS / 1000),
                    count: slow,
                },
            );
        }

        Ok(alerts)
    }

    pub async fn critical_alerts(&self) -> Result<Alerts> {
        let mut alerts = self.check().await?;
        alerts.retain(|_, a| a.severity == Severity::Critical);
        Ok(alerts)
    }

    pub async fn requires_attention(&self) -> Result<bool> {
        Ok(!self.critical_alerts().await?.is_empty())
    }

    async fn stuck_jobs(&self, now: DateTime<Utc>) -> Result<i64> {
        let mut filter = JobFilter::new().with_statuses([JobStatus::Processing]);
        filter.started_before = Some(now - Duration::minutes(STUCK_AFTER_MINUTES));
        self.store.count(&filter).await
    }

    async fn last_hour_failures(&self, now: DateTime<Utc>) -> Result<(i64, i64)> {
        let mut window = JobFilter::new();
        window.queued_after = Some(now - Duration::hours(1));
        let total = self.store.count(&window).await?;
        if total == 0 {
            return Ok((0, 0));
        }
        let failed = self
            .store
            .count(&window.with_statuses([JobStatus::Failed, JobStatus::Timeout]))
            .await?;
        Ok((failed, total))
    }

    async fn slow_jobs_today(&self, now: DateTime<Utc>) -> Result<i64> {
        let mut filter = JobFilter::new();
        filter.min_duration_ms = Some(SLOW_JOB_MS + 1);
        filter.completed_after = Some(start_of_day(now));
        self.store.count(&filter).await
    }
}

pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now)
}
