mod common;

use common::{harness, job};
use queuemonitor::jobs::{retry_chain, JobRecord, JobStatus, JobStore};

fn attempt(uuid: &str, n: i32, status: JobStatus, parent: Option<i64>) -> JobRecord {
    let mut r = job(uuid, status);
    r.attempt = n;
    r.retried_from_id = parent;
    r
}

#[tokio::test]
async fn chain_is_ordered_and_same_from_any_member() {
    let h = harness();
    let first = h.store.seed(attempt("u-1", 1, JobStatus::Failed, None));
    let second = h.store.seed(attempt("u-1", 2, JobStatus::Failed, Some(first)));
    let third = h.store.seed(attempt("u-1", 3, JobStatus::Completed, Some(second)));
    h.store.seed(job("other", JobStatus::Completed));

    let from_root = h.monitor.retry_chain("u-1").await.unwrap();
    let ids: Vec<i64> = from_root.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first, second, third]);

    let attempts: Vec<i32> = from_root.iter().map(|r| r.attempt).collect();
    assert!(attempts.windows(2).all(|w| w[0] < w[1]));

    // Starting from the last attempt's record yields the same chain.
    let leaf = h.store.find_by_id(third).await.unwrap().unwrap();
    let from_leaf = retry_chain::resolve(h.store.as_ref(), &leaf.uuid).await.unwrap();
    assert_eq!(from_leaf, from_root);
}

#[tokio::test]
async fn chain_follows_children_with_other_uuids() {
    let h = harness();
    let root = h.store.seed(attempt("root", 1, JobStatus::Failed, None));
    let child = h.store.seed(attempt("child", 2, JobStatus::Completed, Some(root)));

    let from_child = h.monitor.retry_chain("child").await.unwrap();
    assert_eq!(from_child.iter().map(|r| r.id).collect::<Vec<_>>(), vec![root, child]);

    let from_root = h.monitor.retry_chain("root").await.unwrap();
    assert_eq!(from_root, from_child);
}

#[tokio::test]
async fn deleted_parent_ends_the_chain() {
    let h = harness();
    let root = h.store.seed(attempt("gone", 1, JobStatus::Failed, None));
    h.store.seed(attempt("kept", 2, JobStatus::Completed, Some(root)));

    assert!(h.store.delete("gone").await.unwrap());

    let chain = h.monitor.retry_chain("kept").await.unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].retried_from_id, None);
}

#[tokio::test]
async fn cyclic_links_terminate() {
    let h = harness();
    // Ids are assigned 1 and 2 in seed order.
    h.store.seed(attempt("a", 1, JobStatus::Failed, Some(2)));
    h.store.seed(attempt("b", 2, JobStatus::Failed, Some(1)));

    let chain = h.monitor.retry_chain("a").await.unwrap();
    let mut ids: Vec<i64> = chain.iter().map(|r| r.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn unknown_uuid_has_empty_chain() {
    let h = harness();
    assert!(h.monitor.retry_chain("nope").await.unwrap().is_empty());
}
