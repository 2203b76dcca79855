//! Cache view handed to repositories inside a transaction.
//!
//! Rows read inside a transaction may never commit, so nothing is stored and
//! nothing is served. Invalidations are queued and replayed on the shared
//! cache once the transaction has finished, whichever way it ended.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use common::AppResult;

use super::CacheManager;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Invalidation {
    Key(String),
    Pattern(String),
}

/// Reads miss, writes are dropped, invalidations wait for [`apply`](Self::apply)
#[derive(Debug, Default)]
pub struct DeferredCache {
    pending: Mutex<Vec<Invalidation>>,
}

impl DeferredCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay queued invalidations on `target`, in the order they were made
    pub async fn apply(&self, target: &dyn CacheManager) {
        let pending = std::mem::take(&mut *self.pending.lock().await);
        for invalidation in pending {
            let result = match &invalidation {
                Invalidation::Key(key) => target.delete(key).await,
                Invalidation::Pattern(pattern) => target.clear(pattern).await,
            };
            if let Err(e) = result {
                tracing::warn!(invalidation = ?invalidation, error = %e, "Deferred cache invalidation failed");
            }
        }
    }

    async fn queue(&self, invalidation: Invalidation) {
        self.pending.lock().await.push(invalidation);
    }
}

#[async_trait]
impl CacheManager for DeferredCache {
    async fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> AppResult<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> AppResult<Option<Value>> {
        Ok(None)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.queue(Invalidation::Key(key.to_string())).await;
        Ok(())
    }

    async fn clear(&self, pattern: &str) -> AppResult<()> {
        self.queue(Invalidation::Pattern(pattern.to_string())).await;
        Ok(())
    }

    async fn set_many(&self, _items: HashMap<String, Value>, _ttl: Option<Duration>) -> AppResult<()> {
        Ok(())
    }

    async fn get_many(&self, _keys: &[String]) -> AppResult<HashMap<String, Value>> {
        Ok(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheManager;
    use serde_json::json;

    #[tokio::test]
    async fn fills_never_reach_the_shared_cache() {
        let deferred = DeferredCache::new();
        deferred.set("user:id:1", json!("draft"), None).await.unwrap();

        assert_eq!(deferred.get("user:id:1").await.unwrap(), None);

        let shared = InMemoryCacheManager::new();
        deferred.apply(&shared).await;
        assert_eq!(shared.size().await, 0);
    }

    #[tokio::test]
    async fn invalidations_are_replayed_once() {
        let shared = InMemoryCacheManager::new();
        shared.set("user:id:1", json!(1), None).await.unwrap();
        shared.set("project:stats:1", json!(2), None).await.unwrap();
        shared.set("project:stats:2", json!(3), None).await.unwrap();

        let deferred = DeferredCache::new();
        deferred.delete("user:id:1").await.unwrap();
        deferred.clear("project:*").await.unwrap();
        assert_eq!(shared.size().await, 3);

        deferred.apply(&shared).await;
        assert_eq!(shared.size().await, 0);

        shared.set("user:id:1", json!(1), None).await.unwrap();
        deferred.apply(&shared).await;
        assert!(shared.get("user:id:1").await.unwrap().is_some());
    }
}
