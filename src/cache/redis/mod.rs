//! Valkey/Redis backed cache store
//!
//! Entries live under `<namespace>:entry:<key>` as serialised JSON. Every table an entry
//! read from has a set `<namespace>:tag:<table>` listing the entry keys, so a mutation
//! can drop exactly the entries that depend on the tables it wrote. Storing an entry and
//! invalidating tags run as Lua scripts so concurrent engines never observe an entry
//! without its tags.
mod lua;

use async_trait::async_trait;
use fred::prelude::*;
use serde_json::Value as JsonValue;

use lua::{CLEAR_NAMESPACE_SCRIPT, INVALIDATE_TAGS_SCRIPT, PUT_ENTRY_SCRIPT};

use crate::{cache::CacheProvider, error::Error};

pub const DEFAULT_NAMESPACE: &str = "mimir:cache";

pub struct RedisCache {
    pool: Pool,
    namespace: String,
}

impl RedisCache {
    /// Creates a new instance of [`RedisCache`] over an existing pool
    pub fn new(pool: Pool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    /// Builds a pool for `url`. Connections are opened by [`CacheProvider::init`].
    pub fn from_url(url: &str, namespace: impl Into<String>) -> Result<Self, Error> {
        let config = Config::from_url(url)?;
        let pool = Pool::new(config, None, None, None, 6)?;

        Ok(Self::new(pool, namespace))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}:entry:{}", self.namespace, key)
    }

    fn tag_key(&self, table: &str) -> String {
        format!("{}:tag:{}", self.namespace, table)
    }
}

#[async_trait]
impl CacheProvider for RedisCache {
    async fn init(&self) -> Result<(), Error> {
        self.pool.connect();
        self.pool.wait_for_connect().await?;

        tracing::info!(namespace = %self.namespace, "connected cache store");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), Error> {
        self.pool.quit().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<JsonValue>, Error> {
        let raw: Option<String> = self.pool.get(self.entry_key(key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &JsonValue, tables: &[String]) -> Result<(), Error> {
        let mut keys = Vec::with_capacity(tables.len() + 1);
        keys.push(self.entry_key(key));
        keys.extend(tables.iter().map(|t| self.tag_key(t)));

        let _: i64 = self
            .pool
            .eval(PUT_ENTRY_SCRIPT, keys, vec![serde_json::to_string(value)?])
            .await?;
        Ok(())
    }

    async fn on_mutate(&self, tables: &[String]) -> Result<(), Error> {
        if tables.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = tables.iter().map(|t| self.tag_key(t)).collect();

        let removed: i64 = self
            .pool
            .eval(INVALIDATE_TAGS_SCRIPT, keys, Vec::<String>::new())
            .await?;

        tracing::debug!(tables = ?tables, removed, "invalidated cache entries");
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let removed: i64 = self
            .pool
            .eval(
                CLEAR_NAMESPACE_SCRIPT,
                Vec::<String>::new(),
                vec![format!("{}:*", self.namespace)],
            )
            .await?;

        if removed > 0 {
            tracing::info!("Cleared {} cache keys from {}", removed, self.namespace);
        }
        Ok(())
    }
}
