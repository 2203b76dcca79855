//! Transaction management.
//!
//! A closure receives a [`TransactionContext`] whose repositories all run on
//! the same database transaction. The transaction commits when the closure
//! returns `Ok` and rolls back when it returns `Err`; a transaction that is
//! dropped uncommitted (for example on panic) is rolled back by sea-orm.
//!
//! Repositories inside the closure never fill the shared cache. Their
//! invalidations are replayed on it after the commit or rollback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sea_orm::{
    AccessMode, DatabaseConnection, DatabaseTransaction, IsolationLevel, TransactionTrait,
};

use common::{AppError, AppResult};

use crate::cache::{CacheManager, DeferredCache};
use crate::repositories::{
    ActivityLogStore, AgentStore, InsightStore, PatternStore, ProjectStore, ProposalStore,
    TaskStore, UserStore,
};

/// Boxed future returned by transactional closures
pub type TransactionFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

/// Repository access bound to one open transaction.
///
/// `cache` is the transaction's own view, not the shared cache.
#[derive(Clone)]
pub struct TransactionContext<'a> {
    txn: &'a DatabaseTransaction,
    cache: Arc<dyn CacheManager>,
}

impl<'a> TransactionContext<'a> {
    pub fn new(txn: &'a DatabaseTransaction, cache: Arc<dyn CacheManager>) -> Self {
        Self { txn, cache }
    }

    /// The underlying transaction, for statements no repository covers
    pub fn transaction(&self) -> &'a DatabaseTransaction {
        self.txn
    }

    pub fn users(&self) -> UserStore<'a, DatabaseTransaction> {
        UserStore::new(self.txn, self.cache.clone())
    }

    pub fn projects(&self) -> ProjectStore<'a, DatabaseTransaction> {
        ProjectStore::new(self.txn, self.cache.clone())
    }

    pub fn tasks(&self) -> TaskStore<'a, DatabaseTransaction> {
        TaskStore::new(self.txn)
    }

    pub fn agents(&self) -> AgentStore<'a, DatabaseTransaction> {
        AgentStore::new(self.txn)
    }

    pub fn proposals(&self) -> ProposalStore<'a, DatabaseTransaction> {
        ProposalStore::new(self.txn)
    }

    pub fn patterns(&self) -> PatternStore<'a, DatabaseTransaction> {
        PatternStore::new(self.txn)
    }

    pub fn insights(&self) -> InsightStore<'a, DatabaseTransaction> {
        InsightStore::new(self.txn)
    }

    pub fn activity_logs(&self) -> ActivityLogStore<'a, DatabaseTransaction> {
        ActivityLogStore::new(self.txn)
    }
}

/// Opens transactions on the pool and runs closures inside them
#[derive(Clone)]
pub struct TransactionManager {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheManager>,
}

impl TransactionManager {
    pub fn new(db: Arc<DatabaseConnection>, cache: Arc<dyn CacheManager>) -> Self {
        Self { db, cache }
    }

    /// Run `f` in a ReadCommitted transaction.
    pub async fn with_transaction<F, T>(&self, f: F) -> AppResult<T>
    where
        F: for<'a> FnOnce(TransactionContext<'a>) -> TransactionFuture<'a, T> + Send,
        T: Send,
    {
        self.execute(IsolationLevel::ReadCommitted, f).await
    }

    /// Run `f` in a Serializable transaction.
    pub async fn with_transaction_serializable<F, T>(&self, f: F) -> AppResult<T>
    where
        F: for<'a> FnOnce(TransactionContext<'a>) -> TransactionFuture<'a, T> + Send,
        T: Send,
    {
        self.execute(IsolationLevel::Serializable, f).await
    }

    /// Begin a transaction the caller commits or rolls back by hand.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.db.begin().await.map_err(AppError::from)
    }

    pub async fn commit(&self, txn: DatabaseTransaction) -> AppResult<()> {
        txn.commit().await.map_err(AppError::from)
    }

    pub async fn rollback(&self, txn: DatabaseTransaction) -> AppResult<()> {
        txn.rollback().await.map_err(AppError::from)
    }

    async fn execute<F, T>(&self, isolation: IsolationLevel, f: F) -> AppResult<T>
    where
        F: for<'a> FnOnce(TransactionContext<'a>) -> TransactionFuture<'a, T> + Send,
        T: Send,
    {
        let txn = self
            .db
            .begin_with_config(Some(isolation), Some(AccessMode::ReadWrite))
            .await?;

        let deferred = Arc::new(DeferredCache::new());
        let ctx = TransactionContext::new(&txn, deferred.clone());

        let outcome = match f(ctx).await {
            Ok(result) => txn.commit().await.map(|_| result).map_err(AppError::from),
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::error!(error = %rollback_err, "Transaction rollback failed");
                }
                Err(e)
            }
        };

        deferred.apply(self.cache.as_ref()).await;
        outcome
    }
}

/// Run a block inside a transaction:
/// `with_transaction!(manager, |ctx| { ctx.users().find_by_id(id).await })`
#[macro_export]
macro_rules! with_transaction {
    ($manager:expr, |$ctx:ident| $body:expr) => {
        $manager
            .with_transaction(|$ctx| Box::pin(async move { $body }))
            .await
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheExt, InMemoryCacheManager, NoCacheManager};
    use crate::repositories::entities::user;
    use crate::repositories::{ReadRepository, UserRepository};
    use crate::types::Filter;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn count_row(n: i64) -> BTreeMap<&'static str, sea_orm::Value> {
        BTreeMap::from([("num_items", n.into())])
    }

    fn manager(db: DatabaseConnection) -> TransactionManager {
        TransactionManager::new(Arc::new(db), Arc::new(NoCacheManager))
    }

    fn user_row(password_hash: &str) -> user::Model {
        let now = Utc::now();
        user::Model {
            id: Uuid::nil(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: password_hash.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: "user".to_string(),
            is_active: true,
            is_verified: true,
            last_login_at: None,
            login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn ok_result_is_committed() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(3)]])
            .into_connection();
        let tm = manager(db);

        let count = tm
            .with_transaction(|ctx| Box::pin(async move { ctx.users().count(&Filter::new()).await }))
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn err_result_is_returned_after_rollback() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let tm = manager(db);

        let result: AppResult<()> = with_transaction!(tm, |_ctx| {
            Err(AppError::validation("nothing to do"))
        });
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn manual_transactions_commit() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let tm = manager(db);

        let txn = tm.begin().await.unwrap();
        tm.commit(txn).await.unwrap();

        let txn = tm.begin().await.unwrap();
        tm.rollback(txn).await.unwrap();
    }

    #[tokio::test]
    async fn rolled_back_reads_are_not_cached() {
        let draft = user_row("uncommitted");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[draft.clone()], [draft]])
            .into_connection();
        let cache = Arc::new(InMemoryCacheManager::new());
        cache
            .set_as("user:username:ada", &user_row("committed"), None)
            .await
            .unwrap();
        let tm = TransactionManager::new(Arc::new(db), cache.clone());

        let result: AppResult<()> = with_transaction!(tm, |ctx| {
            let users = ctx.users();
            users.update_password(Uuid::nil(), "uncommitted".to_string()).await?;
            let seen = users.get_by_username("ada").await?;
            assert_eq!(seen.map(|u| u.password_hash).as_deref(), Some("uncommitted"));
            Err(AppError::validation("abort"))
        });

        assert!(result.is_err());
        assert!(cache.get("user:username:ada").await.unwrap().is_none());
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn committed_writes_invalidate_after_commit() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user_row("rotated")]])
            .into_connection();
        let cache = Arc::new(InMemoryCacheManager::new());
        cache
            .set_as("user:id:00000000-0000-0000-0000-000000000000", &user_row("old"), None)
            .await
            .unwrap();
        let tm = TransactionManager::new(Arc::new(db), cache.clone());

        let result: AppResult<()> = with_transaction!(tm, |ctx| {
            ctx.users().update_password(Uuid::nil(), "rotated".to_string()).await?;
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(cache.size().await, 0);
    }
}
