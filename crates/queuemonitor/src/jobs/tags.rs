use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::jobs::store::JobStore;

/// Drops empty tags and duplicates, keeping first-seen order.
pub fn normalize(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// How declared tags reach the normalized tag table.
#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn write(&self, record_id: i64, tags: Vec<String>) -> Result<()>;
}

/// Writes inline through the store.
pub struct ImmediateTagWriter {
    store: Arc<dyn JobStore>,
}

impl ImmediateTagWriter {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TagWriter for ImmediateTagWriter {
    async fn write(&self, record_id: i64, tags: Vec<String>) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        self.store.store_tags(record_id, &tags).await
    }
}

/// Hands writes to a background task so the notification path never waits
/// on the tag table.
pub struct DeferredTagWriter {
    tx: mpsc::UnboundedSender<(i64, Vec<String>)>,
}

impl DeferredTagWriter {
    /// Spawns the drain task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn JobStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(i64, Vec<String>)>();
        tokio::spawn(async move {
            while let Some((record_id, tags)) = rx.recv().await {
                if let Err(e) = store.store_tags(record_id, &tags).await {
                    tracing::error!(record_id, error = %e, "deferred tag write failed");
                }
            }
        });
        Self { tx }
    }
}

#[async_trait]
impl TagWriter for DeferredTagWriter {
    async fn write(&self, record_id: i64, tags: Vec<String>) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        if self.tx.send((record_id, tags)).is_err() {
            tracing::warn!(record_id, "tag writer stopped, tags dropped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_blanks_and_duplicates() {
        let raw = vec![
            "billing".to_string(),
            "".to_string(),
            "  ".to_string(),
            "urgent".to_string(),
            "billing".to_string(),
        ];
        assert_eq!(normalize(&raw), vec!["billing", "urgent"]);
    }
}
