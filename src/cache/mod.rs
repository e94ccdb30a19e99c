//! Read cache.
//!
//! Entries are keyed by a digest of the read (see [`key`]) and tagged with every table
//! the read touched. A mutation invalidates all entries tagged with any table it wrote.
//! Cache failures never fail a read or a write; they are logged and the engine falls
//! back to the database.

pub mod key;
pub mod memory;
pub mod redis;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::Error;

pub use memory::MemoryCache;
pub use redis::RedisCache;

#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<JsonValue>, Error>;

    /// Stores `value` under `key`, tagged with `tables`.
    async fn put(&self, key: &str, value: &JsonValue, tables: &[String]) -> Result<(), Error>;

    /// Drops every entry tagged with any of `tables`.
    async fn on_mutate(&self, tables: &[String]) -> Result<(), Error>;

    async fn clear(&self) -> Result<(), Error>;
}

/// Provider that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl CacheProvider for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<JsonValue>, Error> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &JsonValue, _tables: &[String]) -> Result<(), Error> {
        Ok(())
    }

    async fn on_mutate(&self, _tables: &[String]) -> Result<(), Error> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Best-effort wrapper around a [`CacheProvider`].
///
/// Invalidations bump an epoch. A read records the epoch before it queries the database
/// and only stores its result if no invalidation happened in between, so a result
/// computed from pre-mutation rows is never cached after the mutation's invalidation.
pub struct CacheLayer {
    provider: Arc<dyn CacheProvider>,
    epoch: AtomicU64,
}

impl CacheLayer {
    /// Creates a new instance of [`CacheLayer`]
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        Self {
            provider,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &Arc<dyn CacheProvider> {
        &self.provider
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub async fn get(&self, key: &str) -> Option<JsonValue> {
        match self.provider.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, "cache get failed: {}", e);
                None
            }
        }
    }

    /// Stores a read result unless an invalidation happened since `epoch`.
    pub async fn put(&self, key: &str, value: &JsonValue, tables: &[String], epoch: u64) {
        if self.epoch() != epoch {
            tracing::debug!(key, "skipping cache put after concurrent invalidation");
            return;
        }
        if let Err(e) = self.provider.put(key, value, tables).await {
            tracing::warn!(key, "cache put failed: {}", e);
        }
    }

    pub async fn invalidate(&self, tables: &[String]) {
        if tables.is_empty() {
            return;
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.provider.on_mutate(tables).await {
            tracing::warn!(tables = ?tables, "cache invalidation failed: {}", e);
        }
    }

    pub async fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.provider.clear().await {
            tracing::warn!("cache clear failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct FailingCache;

    #[async_trait]
    impl CacheProvider for FailingCache {
        async fn get(&self, _key: &str) -> Result<Option<JsonValue>, Error> {
            Err(Error::InternalError("store unavailable".to_string()))
        }

        async fn put(&self, _key: &str, _value: &JsonValue, _tables: &[String]) -> Result<(), Error> {
            Err(Error::InternalError("store unavailable".to_string()))
        }

        async fn on_mutate(&self, _tables: &[String]) -> Result<(), Error> {
            Err(Error::InternalError("store unavailable".to_string()))
        }

        async fn clear(&self) -> Result<(), Error> {
            Err(Error::InternalError("store unavailable".to_string()))
        }
    }

    /// Expect provider failures to read as misses
    #[tokio::test]
    async fn failures_are_misses() {
        let layer = CacheLayer::new(Arc::new(FailingCache));
        layer.put("k", &json!(1), &["posts".to_string()], layer.epoch()).await;
        assert_eq!(layer.get("k").await, None);
        layer.invalidate(&["posts".to_string()]).await;
    }

    /// Expect results computed before an invalidation to be dropped
    #[tokio::test]
    async fn skips_puts_from_older_epochs() {
        let layer = CacheLayer::new(Arc::new(MemoryCache::new(16)));
        let tables = vec!["posts".to_string()];

        let epoch = layer.epoch();
        layer.invalidate(&tables).await;
        layer.put("stale", &json!({"a": 1}), &tables, epoch).await;
        assert_eq!(layer.get("stale").await, None);

        layer.put("fresh", &json!({"a": 2}), &tables, layer.epoch()).await;
        assert_eq!(layer.get("fresh").await, Some(json!({"a": 2})));
    }
}
