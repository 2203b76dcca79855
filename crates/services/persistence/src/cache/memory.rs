//! Process-local TTL cache.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use common::AppResult;

use super::{matches_pattern, CacheManager, CacheStats};
use crate::config::{DEFAULT_CACHE_CLEANUP_INTERVAL_SECONDS, DEFAULT_CACHE_TTL_SECONDS};

#[derive(Debug, Clone)]
struct CacheItem {
    value: Value,
    expires_at: Instant,
}

impl CacheItem {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type Items = RwLock<HashMap<String, CacheItem>>;

/// In-memory cache backed by a `HashMap` behind a tokio `RwLock`.
///
/// Expired entries are dropped lazily on read and periodically by a
/// background sweeper, which stops when the manager is dropped.
pub struct InMemoryCacheManager {
    items: Arc<Items>,
    default_ttl: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl InMemoryCacheManager {
    /// Cache with the default sweep interval.
    ///
    /// The sweeper only starts when called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_cleanup_interval(Duration::from_secs(DEFAULT_CACHE_CLEANUP_INTERVAL_SECONDS))
    }

    pub fn with_cleanup_interval(interval: Duration) -> Self {
        let items: Arc<Items> = Arc::new(RwLock::new(HashMap::new()));
        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) if !interval.is_zero() => {
                Some(handle.spawn(sweep(Arc::downgrade(&items), interval)))
            }
            _ => None,
        };

        Self {
            items,
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            sweeper,
        }
    }

    /// Expiry used when callers pass no ttl
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        if !ttl.is_zero() {
            self.default_ttl = ttl;
        }
        self
    }

    /// Remove expired entries; returns how many were removed
    pub async fn cleanup(&self) -> usize {
        remove_expired(&self.items).await
    }

    /// Number of stored entries, expired ones included
    pub async fn size(&self) -> usize {
        self.items.read().await.len()
    }

    fn expiry(&self, ttl: Option<Duration>) -> Instant {
        let ttl = ttl.filter(|ttl| !ttl.is_zero()).unwrap_or(self.default_ttl);
        Instant::now() + ttl
    }
}

impl Default for InMemoryCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryCacheManager {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

async fn remove_expired(items: &Items) -> usize {
    let now = Instant::now();
    let mut items = items.write().await;
    let before = items.len();
    items.retain(|_, item| !item.is_expired(now));
    before - items.len()
}

async fn sweep(items: Weak<Items>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(items) = items.upgrade() else {
            break;
        };
        let removed = remove_expired(&items).await;
        if removed > 0 {
            tracing::debug!(removed, "Swept expired cache entries");
        }
    }
}

#[async_trait]
impl CacheManager for InMemoryCacheManager {
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> AppResult<()> {
        let item = CacheItem {
            value,
            expires_at: self.expiry(ttl),
        };
        self.items.write().await.insert(key.to_string(), item);
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let now = Instant::now();
        {
            let items = self.items.read().await;
            match items.get(key) {
                None => return Ok(None),
                Some(item) if !item.is_expired(now) => return Ok(Some(item.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it unless another writer refreshed it meanwhile
        let mut items = self.items.write().await;
        if items.get(key).is_some_and(|item| item.is_expired(now)) {
            items.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self, pattern: &str) -> AppResult<()> {
        let mut items = self.items.write().await;
        if pattern == "*" {
            items.clear();
        } else {
            items.retain(|key, _| !matches_pattern(key, pattern));
        }
        Ok(())
    }

    async fn set_many(&self, values: HashMap<String, Value>, ttl: Option<Duration>) -> AppResult<()> {
        let expires_at = self.expiry(ttl);
        let mut items = self.items.write().await;
        for (key, value) in values {
            items.insert(key, CacheItem { value, expires_at });
        }
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> AppResult<HashMap<String, Value>> {
        let now = Instant::now();
        let mut items = self.items.write().await;
        let mut found = HashMap::with_capacity(keys.len());

        for key in keys {
            match items.get(key) {
                Some(item) if item.is_expired(now) => {
                    items.remove(key);
                }
                Some(item) => {
                    found.insert(key.clone(), item.value.clone());
                }
                None => {}
            }
        }
        Ok(found)
    }

    async fn stats(&self) -> Option<CacheStats> {
        let now = Instant::now();
        let items = self.items.read().await;
        let expired_items = items.values().filter(|item| item.is_expired(now)).count();

        Some(CacheStats {
            total_items: items.len(),
            expired_items,
            active_items: items.len() - expired_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SHORT: Duration = Duration::from_millis(20);

    async fn wait_past(ttl: Duration) {
        tokio::time::sleep(ttl * 3).await;
    }

    #[tokio::test]
    async fn values_round_trip() {
        let cache = InMemoryCacheManager::new();
        cache.set("user:id:1", json!({"name": "ada"}), None).await.unwrap();

        assert_eq!(
            cache.get("user:id:1").await.unwrap(),
            Some(json!({"name": "ada"}))
        );
        assert_eq!(cache.get("user:id:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_miss_and_are_removed_on_read() {
        let cache = InMemoryCacheManager::new();
        cache.set("k", json!(1), Some(SHORT)).await.unwrap();
        wait_past(SHORT).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn zero_ttl_uses_default() {
        let cache = InMemoryCacheManager::new();
        cache.set("k", json!(1), Some(Duration::ZERO)).await.unwrap();
        wait_past(SHORT).await;

        assert_eq!(cache.get("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn clear_supports_all_prefix_and_exact() {
        let cache = InMemoryCacheManager::new();
        for key in ["user:id:1", "user:id:2", "project:stats:1", "exact"] {
            cache.set(key, json!(true), None).await.unwrap();
        }

        cache.clear("user:*").await.unwrap();
        assert_eq!(cache.size().await, 2);

        cache.clear("exact").await.unwrap();
        assert_eq!(cache.size().await, 1);

        cache.clear("*").await.unwrap();
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn get_many_skips_and_removes_expired() {
        let cache = InMemoryCacheManager::new();
        cache
            .set_many(HashMap::from([("a".to_string(), json!(1))]), None)
            .await
            .unwrap();
        cache.set("b", json!(2), Some(SHORT)).await.unwrap();
        wait_past(SHORT).await;

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = cache.get_many(&keys).await.unwrap();

        assert_eq!(found, HashMap::from([("a".to_string(), json!(1))]));
        assert_eq!(cache.size().await, 1);
    }

    #[tokio::test]
    async fn stats_and_cleanup_count_expired_entries() {
        let cache = InMemoryCacheManager::new();
        cache.set("live", json!(1), None).await.unwrap();
        cache.set("stale", json!(2), Some(SHORT)).await.unwrap();
        wait_past(SHORT).await;

        let stats = cache.stats().await.unwrap();
        assert_eq!(
            stats,
            CacheStats {
                total_items: 2,
                expired_items: 1,
                active_items: 1,
            }
        );

        assert_eq!(cache.cleanup().await, 1);
        assert_eq!(cache.size().await, 1);
    }

    #[tokio::test]
    async fn sweeper_removes_expired_entries() {
        let cache = InMemoryCacheManager::with_cleanup_interval(Duration::from_millis(10));
        cache.set("k", json!(1), Some(SHORT)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.size().await, 0);
    }

    #[test]
    fn construction_outside_a_runtime_has_no_sweeper() {
        let cache = InMemoryCacheManager::new();
        assert!(cache.sweeper.is_none());
    }
}
