//! Service settings loaded from environment variables.

use std::env;
use std::str::FromStr;

use common::{CacheBackend, CacheConfig, CleanupConfig, DatabaseConfig};
use domain::DEFAULT_ACTIVITY_LOG_RETENTION_DAYS;

use super::constants::{
    DEFAULT_CACHE_CLEANUP_INTERVAL_SECONDS, DEFAULT_CACHE_TTL_SECONDS, DEFAULT_DATABASE_URL,
    DEFAULT_DB_CONNECT_TIMEOUT_SECONDS, DEFAULT_DB_IDLE_TIMEOUT_SECONDS,
    DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_DB_MIN_CONNECTIONS, DEFAULT_REDIS_URL,
};

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub cleanup: CleanupConfig,
}

impl Config {
    /// Load configuration from `.env` and environment variables.
    ///
    /// Unparseable values fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let backend = match env::var("CACHE_BACKEND") {
            Ok(raw) => raw.parse::<CacheBackend>().unwrap_or_else(|e| {
                tracing::warn!("{}, falling back to in-memory cache", e);
                CacheBackend::Memory
            }),
            Err(_) => CacheBackend::Memory,
        };

        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: parse_env("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
                min_connections: parse_env("DB_MIN_CONNECTIONS", DEFAULT_DB_MIN_CONNECTIONS),
                connect_timeout_secs: parse_env(
                    "DB_CONNECT_TIMEOUT_SECS",
                    DEFAULT_DB_CONNECT_TIMEOUT_SECONDS,
                ),
                idle_timeout_secs: parse_env("DB_IDLE_TIMEOUT_SECS", DEFAULT_DB_IDLE_TIMEOUT_SECONDS),
                sqlx_logging: parse_env("DB_SQLX_LOGGING", false),
            },
            cache: CacheConfig {
                backend,
                url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
                default_ttl_seconds: parse_env("CACHE_DEFAULT_TTL_SECONDS", DEFAULT_CACHE_TTL_SECONDS),
                cleanup_interval_seconds: parse_env(
                    "CACHE_CLEANUP_INTERVAL_SECONDS",
                    DEFAULT_CACHE_CLEANUP_INTERVAL_SECONDS,
                ),
            },
            cleanup: CleanupConfig {
                activity_log_retention_days: parse_env(
                    "ACTIVITY_LOG_RETENTION_DAYS",
                    DEFAULT_ACTIVITY_LOG_RETENTION_DAYS,
                ),
            },
        }
    }

    /// Whether repositories should cache at all
    pub fn cache_enabled(&self) -> bool {
        self.cache.backend != CacheBackend::None
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                ..DatabaseConfig::default()
            },
            cache: CacheConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_on_garbage() {
        env::set_var("PERSISTENCE_TEST_POOL_SIZE", "lots");
        assert_eq!(parse_env("PERSISTENCE_TEST_POOL_SIZE", 7u32), 7);

        env::set_var("PERSISTENCE_TEST_POOL_SIZE", "12");
        assert_eq!(parse_env("PERSISTENCE_TEST_POOL_SIZE", 7u32), 12);
        env::remove_var("PERSISTENCE_TEST_POOL_SIZE");
    }

    #[test]
    fn default_config_enables_memory_cache() {
        let config = Config::default();
        assert!(config.cache_enabled());
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cleanup.activity_log_retention_days, 30);
    }
}
