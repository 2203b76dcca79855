//! Redis-backed cache shared between processes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde_json::Value;

use common::{AppError, AppResult, CacheConfig};

use super::CacheManager;
use crate::config::{CACHE_PATTERN_ALL, DEFAULT_CACHE_TTL_SECONDS};

/// Redis cache wrapper with connection pooling.
#[derive(Clone)]
pub struct RedisCacheManager {
    connection: ConnectionManager,
    default_ttl: u64,
}

impl RedisCacheManager {
    /// Connect to the Redis instance named in `config`.
    pub async fn connect(config: &CacheConfig) -> AppResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(cache_error)?;
        let connection = ConnectionManager::new(client).await.map_err(cache_error)?;

        tracing::info!("Redis cache connected");

        let default_ttl = if config.default_ttl_seconds == 0 {
            DEFAULT_CACHE_TTL_SECONDS
        } else {
            config.default_ttl_seconds
        };

        Ok(Self {
            connection,
            default_ttl,
        })
    }

    fn ttl_seconds(&self, ttl: Option<Duration>) -> u64 {
        match ttl.map(|ttl| ttl.as_secs()) {
            Some(secs) if secs > 0 => secs,
            _ => self.default_ttl,
        }
    }
}

#[async_trait]
impl CacheManager for RedisCacheManager {
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(&value)?;

        conn.set_ex::<_, _, ()>(key, json, self.ttl_seconds(ttl))
            .await
            .map_err(cache_error)
    }

    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await.map_err(cache_error)?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await.map_err(cache_error)
    }

    /// Uses UNLINK so Redis frees the values off the main thread.
    async fn clear(&self, pattern: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let pattern = if pattern.is_empty() { CACHE_PATTERN_ALL } else { pattern };
        let keys: Vec<String> = conn.keys(pattern).await.map_err(cache_error)?;

        if keys.is_empty() {
            return Ok(());
        }

        let removed: i64 = redis::cmd("UNLINK")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        tracing::debug!(pattern, removed, "Cleared cache keys");
        Ok(())
    }

    async fn set_many(&self, items: HashMap<String, Value>, ttl: Option<Duration>) -> AppResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let ttl = self.ttl_seconds(ttl);
        let mut pipe = redis::pipe();
        for (key, value) in &items {
            pipe.set_ex(key, serde_json::to_string(value)?, ttl).ignore();
        }

        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(cache_error)?;
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> AppResult<HashMap<String, Value>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.connection.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        let mut found = HashMap::with_capacity(keys.len());
        for (key, json) in keys.iter().zip(values) {
            if let Some(json) = json {
                found.insert(key.clone(), serde_json::from_str(&json)?);
            }
        }
        Ok(found)
    }
}

/// Convert Redis error to AppError.
fn cache_error(e: RedisError) -> AppError {
    tracing::error!("Redis error: {}", e);
    AppError::from(e)
}
