//! Cache layer in front of the repositories.
//!
//! Values are JSON documents keyed by string. A miss is `Ok(None)`;
//! errors are reserved for backend failures.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use common::AppResult;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

mod deferred;
mod memory;
mod noop;
mod redis_cache;

pub use deferred::DeferredCache;
pub use memory::InMemoryCacheManager;
pub use noop::NoCacheManager;
pub use redis_cache::RedisCacheManager;

/// Entry counts reported by caches that can enumerate their contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_items: usize,
    pub expired_items: usize,
    pub active_items: usize,
}

/// Key/value cache with per-entry expiry.
///
/// A `ttl` of `None` or zero means the backend default (24 hours).
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait CacheManager: Send + Sync {
    /// Store a value
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> AppResult<()>;

    /// Fetch a value; expired or missing keys are `None`
    async fn get(&self, key: &str) -> AppResult<Option<Value>>;

    /// Remove a single key
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Remove keys matching `pattern`: `*` clears everything, a trailing `*`
    /// matches a prefix, anything else is an exact key
    async fn clear(&self, pattern: &str) -> AppResult<()>;

    /// Store several values with one expiry
    async fn set_many(&self, items: HashMap<String, Value>, ttl: Option<Duration>) -> AppResult<()>;

    /// Fetch several values; misses are left out of the result
    async fn get_many(&self, keys: &[String]) -> AppResult<HashMap<String, Value>>;

    /// Entry counts, for backends that track them
    async fn stats(&self) -> Option<CacheStats> {
        None
    }
}

/// Typed access on top of [`CacheManager`]
#[async_trait]
pub trait CacheExt: CacheManager {
    /// Fetch and deserialize; an entry that no longer fits `T` counts as a miss
    async fn get_as<T>(&self, key: &str) -> AppResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                self.delete(key).await?;
                Ok(None)
            }
        }
    }

    /// Serialize and store
    async fn set_as<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> AppResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl).await
    }
}

impl<M: CacheManager + ?Sized> CacheExt for M {}

/// `*` matches everything, `prefix*` a prefix, anything else one exact key
pub(crate) fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use serde_json::json;

    #[test]
    fn pattern_matching() {
        assert!(matches_pattern("user:id:1", "*"));
        assert!(matches_pattern("user:id:1", "user:*"));
        assert!(!matches_pattern("project:stats:1", "user:*"));
        assert!(matches_pattern("user:id:1", "user:id:1"));
        assert!(!matches_pattern("user:id:10", "user:id:1"));
    }

    #[tokio::test]
    async fn undecodable_entries_are_dropped() {
        let mut cache = MockCacheManager::new();
        cache
            .expect_get()
            .with(eq("user:id:1"))
            .returning(|_| Ok(Some(json!("not a number"))));
        cache
            .expect_delete()
            .with(eq("user:id:1"))
            .times(1)
            .returning(|_| Ok(()));

        let value: Option<u32> = cache.get_as("user:id:1").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn typed_round_trip_goes_through_json() {
        let mut cache = MockCacheManager::new();
        cache
            .expect_set()
            .withf(|key, value, ttl| key == "k" && value == &json!({"a": 1}) && ttl.is_none())
            .returning(|_, _, _| Ok(()));

        cache
            .set_as("k", &HashMap::from([("a", 1)]), None)
            .await
            .unwrap();
    }
}
