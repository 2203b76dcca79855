//! User repository with cache-first lookups and login bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter,
};
use uuid::Uuid;

use super::base::{
    batch_update_records, delete_record, impl_base_repository, update_record, DeleteRepository,
    WriteRepository,
};
use super::entities::{activity_log, project, proposal, task, user, RecordEntity};
use super::query::{cache_key, fetch_page, search_condition};
use crate::cache::{CacheExt, CacheManager};
use crate::config::{CACHE_PREFIX_USER, USER_CACHE_TTL_SECONDS};
use crate::types::{Paginated, Pagination, SortOrder};
use common::{AppError, AppResult};
use domain::{lock_expiry, percentage, TaskStatus, UserStatistics, RECENT_ACTIVITY_DAYS};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User repository trait for dependency injection.
///
/// Generic CRUD lives on the base traits; this trait adds the
/// user-specific queries. All queries exclude soft-deleted users.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by username, served from cache when possible
    async fn get_by_username(&self, username: &str) -> AppResult<Option<user::Model>>;

    /// Find user by email, served from cache when possible
    async fn get_by_email(&self, email: &str) -> AppResult<Option<user::Model>>;

    /// Find user whose username or email equals `login`
    async fn get_by_credentials(&self, login: &str) -> AppResult<Option<user::Model>>;

    async fn get_active_users(&self, pagination: &Pagination) -> AppResult<Paginated<user::Model>>;

    async fn get_users_by_role(
        &self,
        role: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<user::Model>>;

    /// Record a successful login
    async fn update_last_login(&self, id: Uuid) -> AppResult<()>;

    /// Count a failed login; returns the new attempt count
    async fn increment_login_attempts(&self, id: Uuid) -> AppResult<i32>;

    /// Zero the attempt counter and lift any lock
    async fn reset_login_attempts(&self, id: Uuid) -> AppResult<()>;

    /// Lock the account for `duration` from now
    async fn lock_user(&self, id: Uuid, duration: Duration) -> AppResult<()>;

    async fn unlock_user(&self, id: Uuid) -> AppResult<()>;

    /// Users whose lock has not expired yet
    async fn get_locked_users(&self) -> AppResult<Vec<user::Model>>;

    async fn update_password(&self, id: Uuid, password_hash: String) -> AppResult<()>;

    async fn get_user_statistics(&self, id: Uuid) -> AppResult<UserStatistics>;

    /// Case-insensitive search over username, email and names
    async fn search_users(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<user::Model>>;
}

/// Concrete implementation of UserRepository.
///
/// Borrows its connection, so it runs on the pool or inside a transaction.
pub struct UserStore<'c, C = DatabaseConnection> {
    db: &'c C,
    cache: Arc<dyn CacheManager>,
}

impl<'c, C> UserStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    /// Create new repository instance
    pub fn new(db: &'c C, cache: Arc<dyn CacheManager>) -> Self {
        Self { db, cache }
    }

    async fn cached_lookup(
        &self,
        key: String,
        condition: Condition,
    ) -> AppResult<Option<user::Model>> {
        match self.cache.get_as::<user::Model>(&key).await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "User cache read failed"),
        }

        let user = user::Entity::find_active()
            .filter(condition)
            .one(self.db)
            .await?;

        if let Some(user) = &user {
            let ttl = Some(Duration::from_secs(USER_CACHE_TTL_SECONDS));
            if let Err(e) = self.cache.set_as(&key, user, ttl).await {
                tracing::warn!(key = %key, error = %e, "User cache write failed");
            }
        }
        Ok(user)
    }

    /// Apply column updates to a live user and drop its cache entries
    async fn modify<F>(&self, id: Uuid, apply: F) -> AppResult<user::Model>
    where
        F: FnOnce(sea_orm::UpdateMany<user::Entity>) -> sea_orm::UpdateMany<user::Entity> + Send,
    {
        let update = user::Entity::update_many()
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(id))
            .filter(user::Column::DeletedAt.is_null());

        let updated = apply(update).exec_with_returning(self.db).await?;
        let user = updated.into_iter().next().ok_or(AppError::NotFound)?;

        self.invalidate(&user).await;
        Ok(user)
    }

    async fn invalidate(&self, user: &user::Model) {
        let keys = [
            user_key("id", &user.id.to_string()),
            user_key("username", &user.username),
            user_key("email", &user.email),
        ];
        for key in keys {
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!(key = %key, error = %e, "User cache invalidation failed");
            }
        }
    }
}

impl_base_repository!(UserStore, user::Entity, read_only);

fn user_key(field: &str, value: &str) -> String {
    cache_key(CACHE_PREFIX_USER, [field, value])
}

#[async_trait]
impl<'c, C> WriteRepository<user::Entity> for UserStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    /// Save the changed columns; cache entries under the old and the new
    /// username and email are dropped
    async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        let previous = match &model.id {
            ActiveValue::Set(id) | ActiveValue::Unchanged(id) => {
                user::Entity::find_by_id(*id).one(self.db).await?
            }
            ActiveValue::NotSet => None,
        };

        let updated = update_record::<user::Entity, C>(self.db, model).await?;
        if let Some(previous) = &previous {
            self.invalidate(previous).await;
        }
        self.invalidate(&updated).await;
        Ok(updated)
    }

    async fn batch_update(&self, models: Vec<user::ActiveModel>) -> AppResult<u64> {
        let written = batch_update_records::<user::Entity, C>(self.db, models).await?;
        if written > 0 {
            let pattern = format!("{}:*", CACHE_PREFIX_USER);
            if let Err(e) = self.cache.clear(&pattern).await {
                tracing::warn!(pattern = %pattern, error = %e, "User cache invalidation failed");
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl<'c, C> DeleteRepository<user::Entity> for UserStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let existing = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        delete_record::<user::Entity, C>(self.db, id).await?;
        self.invalidate(&existing).await;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<()> {
        let now = Utc::now();
        self.modify(id, |update| {
            update.col_expr(user::Column::DeletedAt, Expr::value(Some(now)))
        })
        .await?;
        Ok(())
    }

    async fn batch_delete(&self, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let removed = user::Entity::update_many()
            .col_expr(user::Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.is_in(ids.iter().copied()))
            .filter(user::Column::DeletedAt.is_null())
            .exec_with_returning(self.db)
            .await?;

        for user in &removed {
            self.invalidate(user).await;
        }
        Ok(removed.len() as u64)
    }
}

#[async_trait]
impl<'c, C> UserRepository for UserStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn get_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        self.cached_lookup(
            user_key("username", username),
            Condition::all().add(user::Column::Username.eq(username)),
        )
        .await
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        self.cached_lookup(
            user_key("email", email),
            Condition::all().add(user::Column::Email.eq(email)),
        )
        .await
    }

    async fn get_by_credentials(&self, login: &str) -> AppResult<Option<user::Model>> {
        let result = user::Entity::find_active()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(login))
                    .add(user::Column::Email.eq(login)),
            )
            .one(self.db)
            .await?;
        Ok(result)
    }

    async fn get_active_users(&self, pagination: &Pagination) -> AppResult<Paginated<user::Model>> {
        let select = user::Entity::find_active().filter(user::Column::IsActive.eq(true));
        fetch_page(select, self.db, pagination).await
    }

    async fn get_users_by_role(
        &self,
        role: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<user::Model>> {
        let select = user::Entity::find_active().filter(user::Column::Role.eq(role));
        fetch_page(select, self.db, pagination).await
    }

    async fn update_last_login(&self, id: Uuid) -> AppResult<()> {
        self.modify(id, |update| {
            update.col_expr(user::Column::LastLoginAt, Expr::value(Some(Utc::now())))
        })
        .await?;
        Ok(())
    }

    async fn increment_login_attempts(&self, id: Uuid) -> AppResult<i32> {
        let user = self
            .modify(id, |update| {
                update.col_expr(
                    user::Column::LoginAttempts,
                    Expr::col(user::Column::LoginAttempts).add(1),
                )
            })
            .await?;
        Ok(user.login_attempts)
    }

    async fn reset_login_attempts(&self, id: Uuid) -> AppResult<()> {
        self.modify(id, |update| {
            update
                .col_expr(user::Column::LoginAttempts, Expr::value(0))
                .col_expr(user::Column::LockedUntil, Expr::value(None::<chrono::DateTime<Utc>>))
        })
        .await?;
        Ok(())
    }

    async fn lock_user(&self, id: Uuid, duration: Duration) -> AppResult<()> {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|_| AppError::validation("lock duration is out of range"))?;
        let until = lock_expiry(Utc::now(), duration);

        self.modify(id, |update| {
            update.col_expr(user::Column::LockedUntil, Expr::value(Some(until)))
        })
        .await?;
        tracing::info!(user_id = %id, locked_until = %until, "User locked");
        Ok(())
    }

    async fn unlock_user(&self, id: Uuid) -> AppResult<()> {
        self.modify(id, |update| {
            update.col_expr(user::Column::LockedUntil, Expr::value(None::<chrono::DateTime<Utc>>))
        })
        .await?;
        Ok(())
    }

    async fn get_locked_users(&self) -> AppResult<Vec<user::Model>> {
        let users = user::Entity::find_active()
            .filter(user::Column::LockedUntil.gt(Utc::now()))
            .all(self.db)
            .await?;
        Ok(users)
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> AppResult<()> {
        self.modify(id, |update| {
            update.col_expr(user::Column::PasswordHash, Expr::value(password_hash))
        })
        .await?;
        Ok(())
    }

    async fn get_user_statistics(&self, id: Uuid) -> AppResult<UserStatistics> {
        let projects_created = project::Entity::find_active()
            .filter(project::Column::CreatedBy.eq(id))
            .count(self.db)
            .await?;

        let tasks_assigned = task::Entity::find_active()
            .filter(task::Column::AssignedTo.eq(id))
            .count(self.db)
            .await?;

        let tasks_completed = task::Entity::find_active()
            .filter(task::Column::AssignedTo.eq(id))
            .filter(task::Column::Status.eq(TaskStatus::Completed.as_str()))
            .count(self.db)
            .await?;

        let proposals_submitted = proposal::Entity::find_active()
            .filter(proposal::Column::SubmittedBy.eq(id))
            .count(self.db)
            .await?;

        let since = Utc::now() - chrono::Duration::days(RECENT_ACTIVITY_DAYS);
        let recent_activities = activity_log::Entity::find_active()
            .filter(activity_log::Column::UserId.eq(id))
            .filter(activity_log::Column::CreatedAt.gte(since))
            .count(self.db)
            .await?;

        Ok(UserStatistics {
            user_id: id,
            projects_created,
            tasks_assigned,
            tasks_completed,
            proposals_submitted,
            recent_activities,
            completion_rate: percentage(tasks_completed, tasks_assigned),
        })
    }

    async fn search_users(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<user::Model>> {
        let select = user::Entity::find_active().filter(search_condition::<user::Entity>(
            query,
            &[
                user::Column::Username,
                user::Column::Email,
                user::Column::FirstName,
                user::Column::LastName,
            ],
        ));
        let pagination = pagination.clone().with_default_sort("username", SortOrder::Asc);
        fetch_page(select, self.db, &pagination).await
    }
}
