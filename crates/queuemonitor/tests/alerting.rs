mod common;

use chrono::{Duration, Utc};
use common::{aged, harness, job};
use queuemonitor::analytics::Severity;
use queuemonitor::jobs::JobStatus;

#[tokio::test]
async fn quiet_store_raises_nothing() {
    let h = harness();
    h.store.seed(job("ok", JobStatus::Completed));
    let alerts = h.monitor.alerts.check().await.unwrap();
    assert!(alerts.is_empty());
    assert!(!h.monitor.alerts.requires_attention().await.unwrap());
}

#[tokio::test]
async fn stuck_processing_jobs_warn() {
    let h = harness();
    let mut stuck = job("stuck", JobStatus::Processing);
    stuck.started_at = Some(Utc::now() - Duration::minutes(45));
    h.store.seed(stuck);
    h.store.seed(job("fresh", JobStatus::Processing));

    let alerts = h.monitor.alerts.check().await.unwrap();
    let alert = &alerts["stuck_jobs"];
    assert_eq!(alert.severity, Severity::Warning);
    assert_eq!(alert.count, 1);
}

#[tokio::test]
async fn error_rate_above_twenty_percent_is_critical() {
    let h = harness();
    for i in 0..3 {
        h.store.seed(job(&format!("ok-{i}"), JobStatus::Completed));
    }
    h.store.seed(job("bad", JobStatus::Failed));

    let alerts = h.monitor.alerts.check().await.unwrap();
    assert_eq!(alerts["high_error_rate"].severity, Severity::Critical);
    assert!(!alerts.contains_key("elevated_error_rate"));
    assert!(h.monitor.alerts.requires_attention().await.unwrap());
    assert_eq!(h.monitor.alerts.critical_alerts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn error_rate_between_ten_and_twenty_percent_warns() {
    let h = harness();
    for i in 0..7 {
        h.store.seed(job(&format!("ok-{i}"), JobStatus::Completed));
    }
    h.store.seed(job("bad", JobStatus::Timeout));

    let alerts = h.monitor.alerts.check().await.unwrap();
    assert_eq!(alerts["elevated_error_rate"].severity, Severity::Warning);
    assert!(!alerts.contains_key("high_error_rate"));
}

#[tokio::test]
async fn old_failures_do_not_count_toward_error_rate() {
    let h = harness();
    h.store.seed(job("ok", JobStatus::Completed));
    h.store.seed(aged(job("old", JobStatus::Failed), Utc::now() - Duration::hours(2)));

    let alerts = h.monitor.alerts.check().await.unwrap();
    assert!(!alerts.contains_key("high_error_rate"));
    assert!(!alerts.contains_key("elevated_error_rate"));
}

#[tokio::test]
async fn large_backlog_warns() {
    let h = harness();
    for i in 0..1001 {
        h.store.seed(job(&format!("q-{i}"), JobStatus::Queued));
    }
    let alerts = h.monitor.alerts.check().await.unwrap();
    assert_eq!(alerts["high_backlog"].count, 1001);
}

#[tokio::test]
async fn many_slow_jobs_today_are_informational() {
    let h = harness();
    let now = Utc::now();
    for i in 0..11 {
        let mut slow = job(&format!("slow-{i}"), JobStatus::Completed);
        slow.duration_ms = Some(45_000);
        slow.completed_at = Some(now);
        h.store.seed(slow);
    }

    let alerts = h.monitor.alerts.check_at(now).await.unwrap();
    let alert = &alerts["slow_jobs"];
    assert_eq!(alert.severity, Severity::Info);
    assert_eq!(alert.count, 11);
}
