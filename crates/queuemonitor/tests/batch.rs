mod common;

use common::{harness, harness_with, job, test_config};
use queuemonitor::jobs::{JobFilter, JobStatus, JobStore};
use queuemonitor::replay::BatchTarget;

fn seed_many(h: &common::Harness, prefix: &str, n: usize, status: JobStatus) -> Vec<String> {
    (0..n)
        .map(|i| {
            let uuid = format!("{prefix}-{i}");
            h.store.seed(job(&uuid, status));
            uuid
        })
        .collect()
}

#[tokio::test]
async fn delete_by_uuids_uses_ceil_chunks() {
    let mut config = test_config();
    config.batch.chunk_size = 4;
    let h = harness_with(config);
    let uuids = seed_many(&h, "d", 10, JobStatus::Completed);

    let outcome = h.monitor.batch.delete(BatchTarget::Uuids(uuids)).await.unwrap();
    assert_eq!(outcome.succeeded, 10);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.chunks, 3);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn delete_records_missing_uuids_and_continues() {
    let h = harness();
    seed_many(&h, "d", 2, JobStatus::Completed);

    let outcome = h
        .monitor
        .batch
        .delete(BatchTarget::Uuids(vec![
            "d-0".into(),
            "ghost".into(),
            "d-1".into(),
            "d-0".into(),
        ]))
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert!(outcome.errors["ghost"].contains("not found"));
    assert_eq!(outcome.total(), 3);
}

#[tokio::test]
async fn delete_by_filter_pages_through_matches() {
    let mut config = test_config();
    config.batch.chunk_size = 7;
    let h = harness_with(config);
    seed_many(&h, "f", 25, JobStatus::Failed);
    seed_many(&h, "c", 5, JobStatus::Completed);

    let target = BatchTarget::Filter {
        filter: JobFilter::new().with_statuses([JobStatus::Failed]),
        max_items: None,
    };
    let outcome = h.monitor.batch.delete(target).await.unwrap();
    assert_eq!(outcome.succeeded, 25);
    assert_eq!(outcome.chunks, 4);
    assert_eq!(h.store.count(&JobFilter::new()).await.unwrap(), 5);
}

#[tokio::test]
async fn filter_targets_respect_caps() {
    let mut config = test_config();
    config.batch.max_replay = 3;
    let h = harness_with(config);
    seed_many(&h, "f", 8, JobStatus::Failed);

    let target = BatchTarget::Filter {
        filter: JobFilter::new(),
        max_items: None,
    };
    let outcome = h.monitor.batch.replay(target).await.unwrap();
    assert_eq!(outcome.succeeded, 3);
    assert_eq!(h.dispatcher.count(), 3);

    let target = BatchTarget::Filter {
        filter: JobFilter::new(),
        max_items: Some(5),
    };
    let outcome = h.monitor.batch.delete(target).await.unwrap();
    assert_eq!(outcome.succeeded, 5);
    assert_eq!(h.store.len(), 3);
}

#[tokio::test]
async fn replay_batch_collects_per_item_errors() {
    let h = harness();
    h.store.seed(job("ok-1", JobStatus::Failed));
    h.store.seed(job("busy", JobStatus::Processing));
    h.store.seed(job("ok-2", JobStatus::Completed));

    let outcome = h
        .monitor
        .batch
        .replay(BatchTarget::Uuids(vec![
            "ok-1".into(),
            "busy".into(),
            "missing".into(),
            "ok-2".into(),
        ]))
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.replays.len(), 2);
    assert!(outcome.errors.contains_key("busy"));
    assert!(outcome.errors.contains_key("missing"));
    assert_eq!(h.dispatcher.count(), 2);
}

#[tokio::test]
async fn empty_target_is_a_no_op() {
    let h = harness();
    let outcome = h.monitor.batch.delete(BatchTarget::Uuids(Vec::new())).await.unwrap();
    assert_eq!(outcome.total(), 0);
    assert_eq!(outcome.chunks, 0);
}
