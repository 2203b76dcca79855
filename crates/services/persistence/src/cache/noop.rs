//! Cache that stores nothing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use common::AppResult;

use super::CacheManager;

/// Used when caching is disabled: writes succeed, reads always miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCacheManager;

#[async_trait]
impl CacheManager for NoCacheManager {
    async fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> AppResult<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> AppResult<Option<Value>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> AppResult<()> {
        Ok(())
    }

    async fn clear(&self, _pattern: &str) -> AppResult<()> {
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

    #[tokio::test]
    async fn reads_always_miss() {
        let cache = NoCacheManager;
        cache.set("k", Value::Bool(true), None).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.get_many(&["k".to_string()]).await.unwrap().is_empty());
        assert!(cache.stats().await.is_none());
    }
}
