use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;

use crate::config::CacheConfig;
use crate::error::Result;

#[derive(Clone)]
struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    ttl: Duration,
}

/// Each entry lives for the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// TTL cache in front of aggregate queries.
///
/// Keys are namespaced with the configured prefix. A disabled cache computes
/// every time and stores nothing.
#[derive(Clone)]
pub struct AggregateCache {
    inner: Option<Cache<String, Entry>>,
    prefix: String,
}

impl AggregateCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = config.is_active().then(|| {
            Cache::builder()
                .max_capacity(config.max_capacity)
                .expire_after(PerEntryTtl)
                .build()
        });
        Self {
            inner,
            prefix: config.prefix.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            inner: None,
            prefix: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// `<prefix><kind>:<scope>` with `all` standing in for no scope.
    pub fn key(&self, kind: &str, scope: Option<&str>) -> String {
        format!("{}{}:{}", self.prefix, kind, scope.unwrap_or("all"))
    }

    /// Returns the cached value for `key`, or computes and stores it.
    /// Errors are never cached.
    pub async fn remember<T, F, Fut>(&self, key: String, ttl: Duration, compute: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(cache) = &self.inner else {
            return compute().await;
        };

        if let Some(hit) = cache.get(&key).await {
            if let Some(value) = hit.value.downcast_ref::<T>() {
                return Ok(value.clone());
            }
        }

        let value = compute().await?;
        if !ttl.is_zero() {
            cache
                .insert(
                    key,
                    Entry {
                        value: Arc::new(value.clone()),
                        ttl,
                    },
                )
                .await;
        }
        Ok(value)
    }

    pub fn flush(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }
}
