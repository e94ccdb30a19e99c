//! In-process LRU cache with a table tag index.

use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
};

use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::{cache::CacheProvider, error::Error};

const MIN_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

struct Entry {
    value: JsonValue,
    tables: Vec<String>,
}

struct State {
    entries: LruCache<String, Entry>,
    /// table -> keys of entries tagged with it
    tags: HashMap<String, HashSet<String>>,
}

impl State {
    fn untag(&mut self, key: &str, tables: &[String]) {
        for table in tables {
            if let Some(keys) = self.tags.get_mut(table) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(table);
                }
            }
        }
    }
}

pub struct MemoryCache {
    state: Mutex<State>,
}

impl MemoryCache {
    /// Creates a new instance of [`MemoryCache`] holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(MIN_CAPACITY);
        Self {
            state: Mutex::new(State {
                entries: LruCache::new(capacity),
                tags: HashMap::new(),
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, Error> {
        let mut state = self.state.lock().await;
        Ok(state.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: &JsonValue, tables: &[String]) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let entry = Entry {
            value: value.clone(),
            tables: tables.to_vec(),
        };
        // `push` hands back either the replaced entry for `key` or the evicted LRU entry
        if let Some((old_key, old)) = state.entries.push(key.to_string(), entry) {
            state.untag(&old_key, &old.tables);
        }
        for table in tables {
            state
                .tags
                .entry(table.clone())
                .or_default()
                .insert(key.to_string());
        }
        Ok(())
    }

    async fn on_mutate(&self, tables: &[String]) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let keys: HashSet<String> = tables
            .iter()
            .filter_map(|table| state.tags.remove(table))
            .flatten()
            .collect();
        for key in &keys {
            if let Some(entry) = state.entries.pop(key) {
                state.untag(key, &entry.tables);
            }
        }

        tracing::debug!(tables = ?tables, evicted = keys.len(), "invalidated cache entries");
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.tags.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Expect invalidation to drop every entry tagged with a mutated table
    #[tokio::test]
    async fn invalidates_by_table() -> Result<(), Error> {
        let cache = MemoryCache::new(8);
        cache.put("posts-with-tags", &json!(1), &tables(&["posts", "post_tags", "tags"])).await?;
        cache.put("users", &json!(2), &tables(&["users"])).await?;

        cache.on_mutate(&tables(&["tags"])).await?;

        assert_eq!(cache.get("posts-with-tags").await?, None);
        assert_eq!(cache.get("users").await?, Some(json!(2)));
        Ok(())
    }

    /// Expect least recently used entries to be evicted with their tags
    #[tokio::test]
    async fn evicts_least_recently_used() -> Result<(), Error> {
        let cache = MemoryCache::new(2);
        cache.put("a", &json!("a"), &tables(&["posts"])).await?;
        cache.put("b", &json!("b"), &tables(&["posts"])).await?;
        cache.get("a").await?;
        cache.put("c", &json!("c"), &tables(&["users"])).await?;

        assert_eq!(cache.get("b").await?, None);
        assert_eq!(cache.get("a").await?, Some(json!("a")));
        assert_eq!(cache.len().await, 2);

        let state = cache.state.lock().await;
        assert!(!state.tags["posts"].contains("b"));
        Ok(())
    }

    /// Expect re-putting a key to replace its tags
    #[tokio::test]
    async fn replacing_an_entry_retags_it() -> Result<(), Error> {
        let cache = MemoryCache::new(4);
        cache.put("k", &json!(1), &tables(&["posts"])).await?;
        cache.put("k", &json!(2), &tables(&["users"])).await?;

        cache.on_mutate(&tables(&["posts"])).await?;
        assert_eq!(cache.get("k").await?, Some(json!(2)));

        cache.on_mutate(&tables(&["users"])).await?;
        assert!(cache.is_empty().await);
        Ok(())
    }
}
