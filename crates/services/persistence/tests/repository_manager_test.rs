//! Repository manager tests against a scripted database.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
use uuid::Uuid;

use common::AppError;
use persistence_lib::cache::{CacheManager, InMemoryCacheManager};
use persistence_lib::repositories::entities::user;
use persistence_lib::repositories::{
    DeleteRepository, ProjectRepository, ReadRepository, UserRepository,
};
use persistence_lib::{with_transaction, Database, Filter, RepositoryManager};

fn test_user(username: &str) -> user::Model {
    let now = Utc::now();
    user::Model {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "hashed".to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        role: "user".to_string(),
        is_active: true,
        is_verified: false,
        last_login_at: None,
        login_attempts: 0,
        locked_until: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

fn count_row(n: i64) -> BTreeMap<&'static str, sea_orm::Value> {
    BTreeMap::from([("num_items", n.into())])
}

fn manager_with(db: DatabaseConnection) -> (RepositoryManager, Arc<dyn CacheManager>) {
    let cache: Arc<dyn CacheManager> =
        Arc::new(InMemoryCacheManager::with_cleanup_interval(Duration::ZERO));
    let manager = RepositoryManager::new(Database::from_connection(db), cache.clone());
    (manager, cache)
}

#[tokio::test]
async fn test_user_lookup_is_served_from_cache() {
    let alice = test_user("alice");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![alice.clone()]])
        .into_connection();
    let (manager, _cache) = manager_with(db);

    let first = manager.users().get_by_username("alice").await.unwrap();
    // The database has no second result scripted; this must come from cache
    let second = manager.users().get_by_username("alice").await.unwrap();

    assert_eq!(first.map(|u| u.id), Some(alice.id));
    assert_eq!(second.map(|u| u.id), Some(alice.id));
}

#[tokio::test]
async fn test_cleared_cache_falls_back_to_database() {
    let alice = test_user("alice");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![alice.clone()], vec![alice.clone()]])
        .into_connection();
    let (manager, cache) = manager_with(db);

    manager.users().get_by_username("alice").await.unwrap();
    assert!(cache.stats().await.unwrap().active_items > 0);

    manager.clear_all_cache().await.unwrap();
    assert_eq!(cache.stats().await.unwrap().total_items, 0);

    let again = manager.users().get_by_username("alice").await.unwrap();
    assert_eq!(again.map(|u| u.username), Some("alice".to_string()));
}

#[tokio::test]
async fn test_invalid_progress_never_reaches_database() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let (manager, _cache) = manager_with(db);

    let result = manager.projects().update_progress(Uuid::new_v4(), 101).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_progress_update_on_missing_project() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        }])
        .into_connection();
    let (manager, _cache) = manager_with(db);

    let result = manager.projects().update_progress(Uuid::new_v4(), 50).await;
    assert!(matches!(result, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_transaction_macro_runs_repositories() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[count_row(2)], [count_row(5)]])
        .into_connection();
    let (manager, _cache) = manager_with(db);

    let (users, tasks) = with_transaction!(manager, |ctx| {
        let users = ctx.users().count(&Filter::new()).await?;
        let tasks = ctx.tasks().count(&Filter::new()).await?;
        Ok((users, tasks))
    })
    .unwrap();

    assert_eq!((users, tasks), (2, 5));
}

#[tokio::test]
async fn test_health_pings_database() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .into_connection();
    let (manager, _cache) = manager_with(db);

    assert!(manager.health().await.is_ok());
}

#[tokio::test]
async fn test_soft_deleted_user_is_not_served_from_cache() {
    let alice = test_user("alice");
    let deleted = user::Model {
        deleted_at: Some(Utc::now()),
        ..alice.clone()
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![alice.clone()], vec![deleted], vec![]])
        .into_connection();
    let (manager, _cache) = manager_with(db);

    assert!(manager.users().get_by_username("alice").await.unwrap().is_some());
    manager.users().soft_delete(alice.id).await.unwrap();

    assert!(manager.users().get_by_username("alice").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rolled_back_transaction_leaves_cache_untouched() {
    let alice = test_user("alice");
    let draft = user::Model {
        password_hash: "uncommitted".to_string(),
        ..alice.clone()
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![draft.clone()], vec![draft], vec![alice.clone()]])
        .into_connection();
    let (manager, cache) = manager_with(db);
    let id = alice.id;

    let result: Result<(), AppError> = with_transaction!(manager, |ctx| {
        ctx.users().update_password(id, "uncommitted".to_string()).await?;
        ctx.users().get_by_username("alice").await?;
        Err(AppError::validation("abort"))
    });
    assert!(result.is_err());
    assert_eq!(cache.stats().await.unwrap().total_items, 0);

    let after = manager.users().get_by_username("alice").await.unwrap().unwrap();
    assert_eq!(after.password_hash, "hashed");
}
