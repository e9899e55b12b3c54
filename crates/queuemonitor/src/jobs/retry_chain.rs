use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::jobs::model::JobRecord;
use crate::jobs::store::JobStore;

/// Every attempt belonging to the logical job behind `uuid`, ordered by
/// attempt.
///
/// Walks `retried_from_id` up to the root, then collects the root's uuid
/// group plus every descendant. Works from any member of the chain, stops
/// at missing parents, and never loops on cyclic links.
pub async fn resolve(store: &dyn JobStore, uuid: &str) -> Result<Vec<JobRecord>> {
    let Some(start) = store.find_by_uuid(uuid).await? else {
        return Ok(Vec::new());
    };

    let mut visited: HashSet<i64> = HashSet::from([start.id]);
    let mut root = start;
    while let Some(parent_id) = root.retried_from_id {
        if !visited.insert(parent_id) {
            break;
        }
        match store.find_by_id(parent_id).await? {
            Some(parent) => root = parent,
            None => break,
        }
    }

    let mut chain: HashMap<i64, JobRecord> = HashMap::new();
    chain.insert(root.id, root.clone());
    for record in store.find_all_by_uuid(&root.uuid).await? {
        chain.entry(record.id).or_insert(record);
    }

    let mut frontier: Vec<i64> = chain.keys().copied().collect();
    while !frontier.is_empty() {
        let children = store.find_children(&frontier).await?;
        frontier.clear();
        for child in children {
            if !chain.contains_key(&child.id) {
                frontier.push(child.id);
                chain.insert(child.id, child);
            }
        }
    }

    let mut ordered: Vec<JobRecord> = chain.into_values().collect();
    ordered.sort_by(|a, b| a.attempt.cmp(&b.attempt).then(a.id.cmp(&b.id)));
    Ok(ordered)
}
