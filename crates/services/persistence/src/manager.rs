//! Repository manager.
//!
//! One entry point over the pool, the cache and every repository, plus the
//! maintenance operations the CLI exposes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{DatabaseConnection, PaginatorTrait};
use serde::Serialize;

use common::{AppError, AppResult, CacheBackend, CleanupConfig};
use domain::DEFAULT_ACTIVITY_LOG_RETENTION_DAYS;

use crate::cache::{
    CacheManager, CacheStats, InMemoryCacheManager, NoCacheManager, RedisCacheManager,
};
use crate::config::{Config, CACHE_PATTERN_ALL};
use crate::infra::{Database, TransactionContext, TransactionFuture, TransactionManager};
use crate::repositories::entities::{
    activity_log, agent, insight, pattern, project, proposal, task, user, RecordEntity,
};
use crate::repositories::{
    ActivityLogRepository, ActivityLogStore, AgentStore, InsightStore, PatternStore, ProjectStore,
    ProposalStore, TaskStore, UserStore,
};

/// One step of [`RepositoryManager::batch_execute`]
pub type BatchOperation =
    Box<dyn for<'a> FnOnce(TransactionContext<'a>) -> TransactionFuture<'a, ()> + Send>;

/// Cache and row counts reported by [`RepositoryManager::stats`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerStats {
    pub cache: Option<CacheStats>,
    /// Live rows per table; -1 when the count failed
    pub entity_counts: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryHealth {
    pub status: HealthStatus,
    pub error: Option<String>,
}

/// Outcome of [`RepositoryManager::cleanup_old_data`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub retention_days: i64,
    pub activity_logs_removed: u64,
}

/// Facade over the connection pool, cache and repositories
pub struct RepositoryManager {
    db: Database,
    cache: Arc<dyn CacheManager>,
    transactions: TransactionManager,
}

impl RepositoryManager {
    pub fn new(db: Database, cache: Arc<dyn CacheManager>) -> Self {
        let transactions = TransactionManager::new(db.shared_connection(), cache.clone());
        Self {
            db,
            cache,
            transactions,
        }
    }

    /// Connect to the database and build the configured cache backend.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let db = Database::connect(&config.database).await?;
        let cache = build_cache(config).await?;
        Ok(Self::new(db, cache))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.connection()
    }

    pub fn cache(&self) -> Arc<dyn CacheManager> {
        self.cache.clone()
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(self.db.connection(), self.cache.clone())
    }

    pub fn projects(&self) -> ProjectStore<'_> {
        ProjectStore::new(self.db.connection(), self.cache.clone())
    }

    pub fn tasks(&self) -> TaskStore<'_> {
        TaskStore::new(self.db.connection())
    }

    pub fn agents(&self) -> AgentStore<'_> {
        AgentStore::new(self.db.connection())
    }

    pub fn proposals(&self) -> ProposalStore<'_> {
        ProposalStore::new(self.db.connection())
    }

    pub fn patterns(&self) -> PatternStore<'_> {
        PatternStore::new(self.db.connection())
    }

    pub fn insights(&self) -> InsightStore<'_> {
        InsightStore::new(self.db.connection())
    }

    pub fn activity_logs(&self) -> ActivityLogStore<'_> {
        ActivityLogStore::new(self.db.connection())
    }

    pub async fn with_transaction<F, T>(&self, f: F) -> AppResult<T>
    where
        F: for<'a> FnOnce(TransactionContext<'a>) -> TransactionFuture<'a, T> + Send,
        T: Send,
    {
        self.transactions.with_transaction(f).await
    }

    pub async fn with_transaction_serializable<F, T>(&self, f: F) -> AppResult<T>
    where
        F: for<'a> FnOnce(TransactionContext<'a>) -> TransactionFuture<'a, T> + Send,
        T: Send,
    {
        self.transactions.with_transaction_serializable(f).await
    }

    /// Ping the database
    pub async fn health(&self) -> AppResult<()> {
        self.db.ping().await.map_err(AppError::from)
    }

    pub async fn stats(&self) -> ManagerStats {
        let probes = self.probe_all().await;
        let entity_counts = probes
            .into_iter()
            .map(|(table, result)| {
                let count = match result {
                    Ok(count) => i64::try_from(count).unwrap_or(i64::MAX),
                    Err(e) => {
                        tracing::warn!(table = %table, error = %e, "Row count failed");
                        -1
                    }
                };
                (table, count)
            })
            .collect();

        ManagerStats {
            cache: self.cache.stats().await,
            entity_counts,
        }
    }

    /// Run a trivial query through every repository's table
    pub async fn repository_health(&self) -> BTreeMap<String, RepositoryHealth> {
        self.probe_all()
            .await
            .into_iter()
            .map(|(table, result)| {
                let health = match result {
                    Ok(_) => RepositoryHealth {
                        status: HealthStatus::Healthy,
                        error: None,
                    },
                    Err(e) => RepositoryHealth {
                        status: HealthStatus::Unhealthy,
                        error: Some(e.to_string()),
                    },
                };
                (table, health)
            })
            .collect()
    }

    pub async fn run_migrations(&self) -> AppResult<()> {
        self.db.run_migrations().await.map_err(AppError::from)
    }

    /// Delete activity logs past the retention window.
    ///
    /// A non-positive retention falls back to the default.
    pub async fn cleanup_old_data(&self, config: &CleanupConfig) -> AppResult<CleanupReport> {
        cleanup_activity_logs(&self.activity_logs(), config.activity_log_retention_days).await
    }

    pub async fn create_backup(&self, _path: &str) -> AppResult<()> {
        Err(AppError::not_implemented("database backup"))
    }

    pub async fn restore_backup(&self, _path: &str) -> AppResult<()> {
        Err(AppError::not_implemented("database restore"))
    }

    /// Clear every key matching any of `patterns`
    pub async fn invalidate_cache(&self, patterns: &[String]) -> AppResult<()> {
        for pattern in patterns {
            self.cache.clear(pattern).await?;
        }
        tracing::debug!(patterns = ?patterns, "Cache invalidated");
        Ok(())
    }

    pub async fn clear_all_cache(&self) -> AppResult<()> {
        self.cache.clear(CACHE_PATTERN_ALL).await
    }

    /// Run `operations` in order inside one transaction.
    ///
    /// The first failure rolls everything back and is reported with its
    /// position in the batch.
    pub async fn batch_execute(&self, operations: Vec<BatchOperation>) -> AppResult<()> {
        let total = operations.len();
        self.transactions
            .with_transaction(move |ctx| {
                Box::pin(async move {
                    for (index, operation) in operations.into_iter().enumerate() {
                        operation(ctx.clone())
                            .await
                            .map_err(|e| AppError::batch(index, e))?;
                    }
                    Ok(())
                })
            })
            .await?;

        tracing::debug!(operations = total, "Batch committed");
        Ok(())
    }

    /// Close the pool
    pub async fn close(self) -> AppResult<()> {
        let Self { db, transactions, .. } = self;
        drop(transactions);
        db.close().await?;
        tracing::info!("Database connection closed");
        Ok(())
    }

    async fn probe_all(&self) -> Vec<(String, AppResult<u64>)> {
        let conn = self.db.connection();
        let (users, projects, tasks, agents, proposals, patterns, insights, activity_logs) = futures::join!(
            probe::<user::Entity>(conn),
            probe::<project::Entity>(conn),
            probe::<task::Entity>(conn),
            probe::<agent::Entity>(conn),
            probe::<proposal::Entity>(conn),
            probe::<pattern::Entity>(conn),
            probe::<insight::Entity>(conn),
            probe::<activity_log::Entity>(conn),
        );
        vec![users, projects, tasks, agents, proposals, patterns, insights, activity_logs]
    }
}

async fn probe<E>(conn: &DatabaseConnection) -> (String, AppResult<u64>)
where
    E: RecordEntity,
    E::Model: Sync,
{
    let table = E::default().table_name().to_string();
    let result = E::find_active().count(conn).await.map_err(AppError::from);
    (table, result)
}

async fn build_cache(config: &Config) -> AppResult<Arc<dyn CacheManager>> {
    let cache: Arc<dyn CacheManager> = match config.cache.backend {
        CacheBackend::None => Arc::new(NoCacheManager),
        CacheBackend::Memory => Arc::new(
            InMemoryCacheManager::with_cleanup_interval(Duration::from_secs(
                config.cache.cleanup_interval_seconds,
            ))
            .with_default_ttl(Duration::from_secs(config.cache.default_ttl_seconds)),
        ),
        CacheBackend::Redis => Arc::new(RedisCacheManager::connect(&config.cache).await?),
    };
    tracing::info!(backend = ?config.cache.backend, "Cache ready");
    Ok(cache)
}

/// Delete activity logs older than `retention_days`
pub(crate) async fn cleanup_activity_logs(
    logs: &(dyn ActivityLogRepository + '_),
    retention_days: i64,
) -> AppResult<CleanupReport> {
    let retention_days = if retention_days > 0 {
        retention_days
    } else {
        DEFAULT_ACTIVITY_LOG_RETENTION_DAYS
    };
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let removed = logs.cleanup_old_activities(cutoff).await?;

    tracing::info!(retention_days, removed, "Old activity logs cleaned up");
    Ok(CleanupReport {
        retention_days,
        activity_logs_removed: removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{MockActivityLogRepository, ReadRepository};
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase};

    fn count_row(n: i64) -> BTreeMap<&'static str, sea_orm::Value> {
        BTreeMap::from([("num_items", n.into())])
    }

    fn manager(db: MockDatabase) -> RepositoryManager {
        RepositoryManager::new(
            Database::from_connection(db.into_connection()),
            Arc::new(InMemoryCacheManager::with_cleanup_interval(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn stats_mark_failed_counts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(4)], [count_row(2)]])
            .append_query_errors([DbErr::Custom("boom".into())]);
        let stats = manager(db).stats().await;

        assert_eq!(stats.entity_counts["users"], 4);
        assert_eq!(stats.entity_counts["projects"], 2);
        assert_eq!(stats.entity_counts["tasks"], -1);
        assert_eq!(stats.entity_counts["activity_logs"], -1);
        assert_eq!(stats.entity_counts.len(), 8);
        assert_eq!(stats.cache, Some(CacheStats::default()));
    }

    #[tokio::test]
    async fn repository_health_reports_errors() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(1)]])
            .append_query_errors([DbErr::Custom("relation missing".into())]);
        let health = manager(db).repository_health().await;

        assert_eq!(health["users"].status, HealthStatus::Healthy);
        assert_eq!(health["projects"].status, HealthStatus::Unhealthy);
        assert!(health["projects"].error.as_deref().unwrap().contains("relation missing"));
    }

    #[tokio::test]
    async fn backups_are_not_implemented() {
        let manager = manager(MockDatabase::new(DatabaseBackend::Postgres));
        assert!(matches!(
            manager.create_backup("/tmp/db.dump").await,
            Err(AppError::NotImplemented(_))
        ));
        assert!(matches!(
            manager.restore_backup("/tmp/db.dump").await,
            Err(AppError::NotImplemented(_))
        ));
    }

    #[tokio::test]
    async fn invalidation_clears_matching_keys() {
        let manager = manager(MockDatabase::new(DatabaseBackend::Postgres));
        let cache = manager.cache();
        cache.set("user:id:1", serde_json::json!(1), None).await.unwrap();
        cache.set("project:stats:1", serde_json::json!(2), None).await.unwrap();

        manager.invalidate_cache(&["user:*".to_string()]).await.unwrap();
        assert!(cache.get("user:id:1").await.unwrap().is_none());
        assert!(cache.get("project:stats:1").await.unwrap().is_some());

        manager.clear_all_cache().await.unwrap();
        assert!(cache.get("project:stats:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_failure_reports_index() {
        let manager = manager(MockDatabase::new(DatabaseBackend::Postgres));

        let operations: Vec<BatchOperation> = vec![
            Box::new(|_ctx| Box::pin(async { Ok(()) })),
            Box::new(|_ctx| Box::pin(async { Err(AppError::validation("bad row")) })),
            Box::new(|_ctx| Box::pin(async { Ok(()) })),
        ];

        let err = manager.batch_execute(operations).await.unwrap_err();
        assert!(matches!(err, AppError::BatchOperation { index: 1, .. }));
    }

    #[tokio::test]
    async fn transactions_share_the_pool() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(5)], [count_row(6)]]);
        let manager = manager(db);

        let in_txn = manager
            .with_transaction(|ctx| {
                Box::pin(async move { ctx.tasks().count(&crate::types::Filter::new()).await })
            })
            .await
            .unwrap();
        let outside = manager.tasks().count(&crate::types::Filter::new()).await.unwrap();

        assert_eq!((in_txn, outside), (5, 6));
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_uses_retention_window() {
        let mut logs = MockActivityLogRepository::new();
        logs.expect_cleanup_old_activities()
            .withf(|cutoff| {
                let age = Utc::now() - *cutoff;
                age >= chrono::Duration::days(7) && age < chrono::Duration::days(8)
            })
            .times(1)
            .returning(|_| Ok(12));

        let report = cleanup_activity_logs(&logs, 7).await.unwrap();
        assert_eq!(report.activity_logs_removed, 12);
        assert_eq!(report.retention_days, 7);
    }

    #[tokio::test]
    async fn cleanup_defaults_non_positive_retention() {
        let mut logs = MockActivityLogRepository::new();
        logs.expect_cleanup_old_activities().returning(|_| Ok(0));

        let report = cleanup_activity_logs(&logs, 0).await.unwrap();
        assert_eq!(report.retention_days, DEFAULT_ACTIVITY_LOG_RETENTION_DAYS);
    }
}
