use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::statistics::{rate, round2};
use crate::error::Result;
use crate::jobs::filter::JobFilter;
use crate::jobs::model::JobStatus;
use crate::jobs::store::{JobStore, MetricSample};

pub const REGRESSION_THRESHOLD_PERCENT: f64 = 20.0;
pub const MAX_THROUGHPUT_HOURS: i64 = 24 * 365;
pub const MAX_TREND_DAYS: i64 = 366;

const BUCKETS: [(&str, i64, Option<i64>); 6] = [
    ("0-100ms", 0, Some(100)),
    ("100-500ms", 100, Some(500)),
    ("500ms-1s", 500, Some(1_000)),
    ("1s-5s", 1_000, Some(5_000)),
    ("5s-10s", 5_000, Some(10_000)),
    (">10s", 10_000, None),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub samples: usize,
    pub p50: i64,
    pub p75: i64,
    pub p90: i64,
    pub p95: i64,
    pub p99: i64,
}

impl Percentiles {
    pub fn from_durations(mut durations: Vec<i64>) -> Self {
        durations.sort_unstable();
        Self {
            samples: durations.len(),
            p50: percentile(&durations, 50.0),
            p75: percentile(&durations, 75.0),
            p90: percentile(&durations, 90.0),
            p95: percentile(&durations, 95.0),
            p99: percentile(&durations, 99.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationBucket {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub job_class: String,
    pub baseline_avg_ms: f64,
    pub current_avg_ms: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueThroughput {
    pub queue: String,
    pub jobs: i64,
    pub jobs_per_second: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyErrorRate {
    pub date: NaiveDate,
    pub total: i64,
    pub failed: i64,
    pub error_rate: f64,
}

/// Nearest-rank percentile of an ascending slice; 0 when empty.
pub fn percentile(sorted: &[i64], p: f64) -> i64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Duration and throughput analysis over raw samples.
#[derive(Clone)]
pub struct PerformanceAnalyzer {
    store: Arc<dyn JobStore>,
}

impl PerformanceAnalyzer {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Percentiles of completed durations per job class.
    pub async fn percentiles_by_job_class(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<String, Percentiles>> {
        let samples = self.completed_samples(since, None).await?;
        let mut by_class: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for s in samples {
            if let Some(d) = s.duration_ms {
                by_class.entry(s.job_class).or_default().push(d);
            }
        }
        Ok(by_class
            .into_iter()
            .map(|(class, durations)| (class, Percentiles::from_durations(durations)))
            .collect())
    }

    pub async fn duration_distribution(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<DurationBucket>> {
        let samples = self.completed_samples(since, None).await?;
        let mut counts = [0i64; BUCKETS.len()];
        for d in samples.iter().filter_map(|s| s.duration_ms) {
            if let Some(i) = BUCKETS
                .iter()
                .position(|(_, lo, hi)| d >= *lo && hi.map_or(true, |h| d < h))
            {
                counts[i] += 1;
            }
        }
        Ok(BUCKETS
            .iter()
            .zip(counts)
            .map(|((label, _, _), count)| DurationBucket {
                label: label.to_string(),
                count,
            })
            .collect())
    }

    /// Job classes whose average duration over the last 7 days is more than
    /// 20% above their average for the 23 days before that.
    pub async fn detect_regressions(&self) -> Result<Vec<Regression>> {
        let now = Utc::now();
        let split = now - Duration::days(7);
        let baseline = self
            .completed_samples(Some(now - Duration::days(30)), Some(split))
            .await?;
        let current = self.completed_samples(Some(split), None).await?;

        let baseline = averages(&baseline);
        let current = averages(&current);

        let mut out: Vec<Regression> = current
            .into_iter()
            .filter_map(|(class, cur)| {
                let base = *baseline.get(&class)?;
                if base <= 0.0 {
                    return None;
                }
                let change = (cur - base) / base * 100.0;
                (change > REGRESSION_THRESHOLD_PERCENT).then(|| Regression {
                    job_class: class,
                    baseline_avg_ms: round2(base),
                    current_avg_ms: round2(cur),
                    change_percent: round2(change),
                })
            })
            .collect();
        out.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));
        Ok(out)
    }

    /// Jobs queued per queue over the last `hours` (at most a year).
    pub async fn throughput(&self, hours: i64) -> Result<Vec<QueueThroughput>> {
        let hours = hours.clamp(1, MAX_THROUGHPUT_HOURS);
        let mut filter = JobFilter::new();
        filter.queued_after = Some(Utc::now() - Duration::hours(hours));
        let samples = self.store.metric_samples(&filter).await?;

        let mut by_queue: BTreeMap<String, i64> = BTreeMap::new();
        for s in samples {
            *by_queue.entry(s.queue).or_default() += 1;
        }
        let seconds = (hours * 3600) as f64;
        Ok(by_queue
            .into_iter()
            .map(|(queue, jobs)| QueueThroughput {
                queue,
                jobs,
                jobs_per_second: (jobs as f64 / seconds * 10_000.0).round() / 10_000.0,
            })
            .collect())
    }

    /// Failure percentage per day for the last `days` days, oldest first.
    pub async fn error_rate_trend(&self, days: i64) -> Result<Vec<DailyErrorRate>> {
        let days = days.clamp(1, MAX_TREND_DAYS);
        let today = Utc::now().date_naive();
        let first = today - Duration::days(days - 1);

        let mut filter = JobFilter::new();
        filter.queued_after = first.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        let samples = self.store.metric_samples(&filter).await?;

        let mut by_day: BTreeMap<NaiveDate, (i64, i64)> = (0..days)
            .map(|i| (first + Duration::days(i), (0, 0)))
            .collect();
        for s in samples {
            let Some(day) = s.queued_at.map(|t| t.date_naive()) else {
                continue;
            };
            if let Some(entry) = by_day.get_mut(&day) {
                entry.0 += 1;
                if s.status.is_failed() {
                    entry.1 += 1;
                }
            }
        }
        Ok(by_day
            .into_iter()
            .map(|(date, (total, failed))| DailyErrorRate {
                date,
                total,
                failed,
                error_rate: rate(failed, total),
            })
            .collect())
    }

    async fn completed_samples(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricSample>> {
        let mut filter = JobFilter::new().with_statuses([JobStatus::Completed]);
        filter.completed_after = after;
        filter.completed_before = before;
        self.store.metric_samples(&filter).await
    }
}

fn averages(samples: &[MetricSample]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    for s in samples {
        if let Some(d) = s.duration_ms {
            let e = sums.entry(s.job_class.clone()).or_default();
            e.0 += d;
            e.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(class, (sum, n))| (class, sum as f64 / n as f64))
        .collect()
}
