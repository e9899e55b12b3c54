mod common;

use chrono::{Duration, Utc};
use common::{aged, harness, harness_with, job, test_config};
use queuemonitor::analytics::HealthStatus;
use queuemonitor::jobs::{JobStatus, JobStore};

#[tokio::test]
async fn empty_store_has_zero_rates() {
    let h = harness();
    let stats = h.monitor.statistics.global_statistics().await.unwrap();
    assert_eq!(stats.total_jobs, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.failure_rate, 0.0);
}

#[tokio::test]
async fn global_counts_and_rates() {
    let h = harness();
    for (i, status) in [
        JobStatus::Completed,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Timeout,
        JobStatus::Queued,
    ]
    .into_iter()
    .enumerate()
    {
        h.store.seed(job(&format!("g-{i}"), status));
    }

    let stats = h.monitor.statistics.global_statistics().await.unwrap();
    assert_eq!(stats.total_jobs, 5);
    assert_eq!(stats.completed_jobs, 2);
    assert_eq!(stats.failed_jobs, 2);
    assert_eq!(stats.timeout_jobs, 1);
    assert_eq!(stats.queued_jobs, 1);
    assert_eq!(stats.success_rate, 40.0);
    assert_eq!(stats.failure_rate, 40.0);
    assert!(stats.success_rate + stats.failure_rate <= 100.0);
}

#[tokio::test]
async fn success_and_failure_rates_stay_within_one_hundred() {
    let h = harness();
    h.store.seed(job("ok", JobStatus::Completed));
    for i in 0..31 {
        h.store.seed(job(&format!("bad-{i}"), JobStatus::Failed));
    }

    let stats = h.monitor.statistics.global_statistics().await.unwrap();
    assert_eq!(stats.success_rate, 3.13);
    assert!(stats.success_rate + stats.failure_rate <= 100.0);

    let queues = h.monitor.statistics.queue_statistics(None).await.unwrap();
    assert!(queues[0].stats.success_rate + queues[0].stats.failure_rate <= 100.0);
}

#[tokio::test]
async fn grouped_by_queue_and_job_class() {
    let h = harness();
    let mut a = job("q-1", JobStatus::Completed);
    a.queue = "reports".into();
    h.store.seed(a);
    h.store.seed(job("q-2", JobStatus::Failed));
    h.store.seed(job("q-3", JobStatus::Completed));
    let mut other = job("q-4", JobStatus::Completed);
    other.job_class = "App\\Jobs\\Cleanup".into();
    h.store.seed(other);

    let queues = h.monitor.statistics.queue_statistics(None).await.unwrap();
    let emails = queues.iter().find(|q| q.queue == "emails").unwrap();
    assert_eq!(emails.connection, "redis");
    assert_eq!(emails.stats.total_jobs, 3);

    let classes = h.monitor.statistics.job_class_statistics(None).await.unwrap();
    assert_eq!(classes[0].job_class, "App\\Jobs\\SendInvoice");
    assert_eq!(classes[0].stats.total_jobs, 3);

    let only = h
        .monitor
        .statistics
        .job_class_statistics(Some("App\\Jobs\\Cleanup"))
        .await
        .unwrap();
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].stats.total_jobs, 1);
}

#[tokio::test]
async fn queue_health_only_looks_at_last_hour() {
    let h = harness();
    for i in 0..3 {
        h.store.seed(job(&format!("ok-{i}"), JobStatus::Completed));
    }
    h.store.seed(job("bad", JobStatus::Failed));
    h.store.seed(aged(job("old", JobStatus::Failed), Utc::now() - Duration::hours(3)));

    let health = h.monitor.statistics.queue_health().await.unwrap();
    assert_eq!(health.len(), 1);
    let emails = &health[0];
    assert_eq!(emails.total_jobs, 4);
    assert_eq!(emails.failed, 1);
    assert_eq!(emails.failure_rate, 25.0);
    assert_eq!(emails.health_score, 75.0);
    assert_eq!(emails.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn failure_patterns_rank_exception_classes() {
    let h = harness();
    h.store.seed(job("f-1", JobStatus::Failed));
    h.store.seed(job("f-2", JobStatus::Failed));
    let mut other = job("f-3", JobStatus::Timeout);
    other.exception = Some(queuemonitor::jobs::ExceptionInfo::timeout());
    h.store.seed(other);

    let patterns = h.monitor.statistics.failure_patterns().await.unwrap();
    assert_eq!(patterns[0].exception_class, "RuntimeException");
    assert_eq!(patterns[0].count, 2);
    assert_eq!(patterns[0].affected_job_classes, 1);
    assert_eq!(patterns[1].exception_class, "JobTimeout");
}

#[tokio::test]
async fn tag_statistics_track_success() {
    let h = harness();
    let ok = h.store.seed(job("t-1", JobStatus::Completed));
    let bad = h.store.seed(job("t-2", JobStatus::Failed));
    h.store.store_tags(ok, &["billing".into()]).await.unwrap();
    h.store.store_tags(bad, &["billing".into()]).await.unwrap();

    let tags = h.monitor.statistics.tag_statistics().await.unwrap();
    let billing = tags.iter().find(|t| t.tag == "billing").unwrap();
    assert_eq!(billing.count, 2);
    assert_eq!(billing.successful_count, 1);
    assert_eq!(billing.success_rate, 50.0);
}

#[tokio::test]
async fn cached_statistics_are_stale_until_flushed() {
    let h = harness_with({
        let mut c = test_config();
        c.cache.enabled = true;
        c
    });
    h.store.seed(job("c-1", JobStatus::Completed));

    let first = h.monitor.statistics.global_statistics().await.unwrap();
    assert_eq!(first.total_jobs, 1);

    h.store.seed(job("c-2", JobStatus::Completed));
    let cached = h.monitor.statistics.global_statistics().await.unwrap();
    assert_eq!(cached.total_jobs, 1);

    h.monitor.statistics.flush();
    let fresh = h.monitor.statistics.global_statistics().await.unwrap();
    assert_eq!(fresh.total_jobs, 2);
}

#[tokio::test]
async fn storage_errors_surface() {
    let h = harness();
    h.store.set_unavailable(true);
    assert!(h.monitor.statistics.global_statistics().await.is_err());
    assert!(h.store.ping().await.is_err());
}
