//! Cache store boundary and the in-memory store used by the server binary.
//!
//! The orchestrator never evicts or ages entries itself; a store decides
//! freshness from the directives it was handed on `put`.

use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::directives::{Freshness, parse_cache_control};
use super::keys::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache entry could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where a stored entry sits relative to its freshness windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Within `max-age`.
    Fresh,
    /// Past `max-age` but within `stale-while-revalidate`.
    Stale,
    /// Only usable if a fresh fetch fails (`stale-if-error`).
    ErrorFallback,
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub value: Value,
    pub status: EntryStatus,
}

/// HTTP-cache-shaped key/value store supplied by the host.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheHit>, StoreError>;

    async fn put(&self, key: &CacheKey, value: Value, directives: &str) -> Result<(), StoreError>;
}

struct StoredEntry {
    value: Value,
    stored_at: Instant,
    freshness: Freshness,
}

impl StoredEntry {
    fn status(&self, now: Instant) -> Option<EntryStatus> {
        let age = now.saturating_duration_since(self.stored_at);
        let freshness = &self.freshness;
        if age <= freshness.max_age {
            Some(EntryStatus::Fresh)
        } else if age <= freshness.max_age + freshness.stale_while_revalidate {
            Some(EntryStatus::Stale)
        } else if age <= freshness.max_age + freshness.stale_if_error {
            Some(EntryStatus::ErrorFallback)
        } else {
            None
        }
    }
}

/// Bounded in-process store with LRU eviction.
pub struct InMemoryCacheStore {
    entries: Mutex<LruCache<CacheKey, StoredEntry>>,
}

impl InMemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.store_capacity_non_zero())),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheHit>, StoreError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "lookup");
        let status = match entries.get(key) {
            Some(entry) => entry.status(Instant::now()),
            None => return Ok(None),
        };

        match status {
            Some(status) => Ok(entries.get(key).map(|entry| CacheHit {
                value: entry.value.clone(),
                status,
            })),
            None => {
                entries.pop(key);
                debug!(key = %key, "expired cache entry dropped");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, value: Value, directives: &str) -> Result<(), StoreError> {
        let freshness = parse_cache_control(directives);
        if freshness.no_store || freshness.private || freshness.retention().is_zero() {
            debug!(key = %key, directives, "directives forbid shared storage");
            return Ok(());
        }

        mutex_lock(&self.entries, SOURCE, "put").put(
            key.clone(),
            StoredEntry {
                value,
                stored_at: Instant::now(),
                freshness,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::cache::{CacheStrategy, hash_query};

    fn store() -> InMemoryCacheStore {
        InMemoryCacheStore::new(&CacheConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn entry_ages_through_windows() {
        let store = store();
        let key = hash_query("*[_type == \"shop\"]", None);
        store
            .put(&key, json!({"name": "Snow"}), "public, max-age=10, stale-while-revalidate=20, stale-if-error=60")
            .await
            .unwrap();

        let hit = store.lookup(&key).await.unwrap().unwrap();
        assert_eq!(hit.status, EntryStatus::Fresh);
        assert_eq!(hit.value, json!({"name": "Snow"}));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(
            store.lookup(&key).await.unwrap().unwrap().status,
            EntryStatus::Stale
        );

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            store.lookup(&key).await.unwrap().unwrap().status,
            EntryStatus::ErrorFallback
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(store.lookup(&key).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn no_store_and_private_are_not_kept() {
        let store = store();
        let key = hash_query("q", None);
        store
            .put(&key, json!(1), &CacheStrategy::None.directive())
            .await
            .unwrap();
        store
            .put(&key, json!(1), "private, max-age=60")
            .await
            .unwrap();
        assert!(store.lookup(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recent() {
        let store = InMemoryCacheStore::new(&CacheConfig {
            store_capacity: 1,
            ..Default::default()
        });
        let first = hash_query("first", None);
        let second = hash_query("second", None);
        let directive = CacheStrategy::Long.directive();
        store.put(&first, json!(1), &directive).await.unwrap();
        store.put(&second, json!(2), &directive).await.unwrap();

        assert!(store.lookup(&first).await.unwrap().is_none());
        assert_eq!(store.lookup(&second).await.unwrap().unwrap().value, json!(2));
    }
}
