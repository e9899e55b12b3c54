mod common;

use chrono::{Duration, Utc};
use common::{aged, harness, harness_with, job, test_config};
use queuemonitor::jobs::{cutoff_days, JobStatus, JobStore, MAX_RETENTION_DAYS};

#[tokio::test]
async fn prunes_only_old_records_with_listed_statuses() {
    let h = harness();
    let forty_days_ago = Utc::now() - Duration::days(40);
    h.store.seed(aged(job("old-ok", JobStatus::Completed), forty_days_ago));
    h.store.seed(aged(job("old-bad", JobStatus::Failed), forty_days_ago));
    h.store.seed(job("new-ok", JobStatus::Completed));

    let deleted = h
        .monitor
        .retention
        .prune(Some(30), Some(&[JobStatus::Completed]))
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    assert!(h.store.find_by_uuid("old-ok").await.unwrap().is_none());
    assert!(h.store.find_by_uuid("old-bad").await.unwrap().is_some());
    assert!(h.store.find_by_uuid("new-ok").await.unwrap().is_some());
}

#[tokio::test]
async fn defaults_come_from_config() {
    let h = harness();
    let forty_days_ago = Utc::now() - Duration::days(40);
    h.store.seed(aged(job("old-ok", JobStatus::Completed), forty_days_ago));
    h.store.seed(aged(job("old-bad", JobStatus::Failed), forty_days_ago));

    assert_eq!(h.monitor.retention.prune(None, None).await.unwrap(), 1);
}

#[tokio::test]
async fn empty_status_list_prunes_everything_old() {
    let h = harness();
    let forty_days_ago = Utc::now() - Duration::days(40);
    h.store.seed(aged(job("a", JobStatus::Completed), forty_days_ago));
    h.store.seed(aged(job("b", JobStatus::Failed), forty_days_ago));
    h.store.seed(aged(job("c", JobStatus::Cancelled), forty_days_ago));

    assert_eq!(h.monitor.retention.prune(Some(30), Some(&[])).await.unwrap(), 3);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn pruned_parents_leave_children_unlinked() {
    let h = harness();
    let mut parent = aged(job("p", JobStatus::Failed), Utc::now() - Duration::days(40));
    parent.attempt = 1;
    let parent_id = h.store.seed(parent);
    let mut child = job("p", JobStatus::Completed);
    child.attempt = 2;
    child.retried_from_id = Some(parent_id);
    h.store.seed(child);

    h.monitor
        .retention
        .prune(Some(30), Some(&[JobStatus::Failed]))
        .await
        .unwrap();

    let child = h.store.find_by_uuid("p").await.unwrap().unwrap();
    assert_eq!(child.attempt, 2);
    assert_eq!(child.retried_from_id, None);
}

#[tokio::test]
async fn disabled_monitor_prunes_nothing() {
    let mut config = test_config();
    config.enabled = false;
    let h = harness_with(config);
    h.store.seed(aged(job("old", JobStatus::Completed), Utc::now() - Duration::days(40)));

    assert_eq!(h.monitor.retention.prune(None, None).await.unwrap(), 0);
    assert_eq!(h.store.len(), 1);
}

#[test]
fn cutoff_is_in_the_past() {
    assert!(cutoff_days(30) < Utc::now() - Duration::days(29));
}

#[test]
fn cutoff_clamps_out_of_range_days() {
    let far = cutoff_days(i64::MAX);
    assert!(far > Utc::now() - Duration::days(MAX_RETENTION_DAYS + 1));
    assert!(cutoff_days(-10) <= Utc::now());
}

#[tokio::test]
async fn huge_retention_window_deletes_nothing_recent() {
    let h = harness();
    h.store.seed(aged(job("old", JobStatus::Completed), Utc::now() - Duration::days(40)));

    let deleted = h
        .monitor
        .retention
        .prune(Some(i64::MAX / 1000), None)
        .await
        .unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(h.store.len(), 1);
}
