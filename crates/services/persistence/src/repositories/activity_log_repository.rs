//! Activity log repository: audit trail queries, statistics and retention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, IntoCondition};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, NotSet, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::base::impl_base_repository;
use super::entities::{activity_log, RecordEntity};
use super::query::{
    aggregate, clamp_limit, date_range, fetch_page, search_condition, start_of_day, trend_bucket,
};
use crate::types::{Paginated, Pagination};
use common::AppResult;
use domain::{
    percentage, SystemActivityStats, TrendPeriod, TrendPoint, UserActivityStats,
    TREND_BUCKET_LIMIT,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// One audit entry to record.
///
/// `ip_address` and `user_agent` are read out of `details` when present
/// there as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error_message: String,
}

impl NewActivity {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            success: true,
            ..Default::default()
        }
    }

    pub fn by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn on(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = error_message.into();
        self
    }

    fn detail(&self, key: &str) -> String {
        self.details
            .as_ref()
            .and_then(|details| details.get(key))
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn into_active_model(self) -> activity_log::ActiveModel {
        activity_log::ActiveModel {
            id: NotSet,
            ip_address: Set(self.detail("ip_address")),
            user_agent: Set(self.detail("user_agent")),
            action: Set(self.action),
            resource: Set(self.resource),
            resource_id: Set(self.resource_id),
            details: Set(self.details),
            success: Set(self.success),
            error_message: Set(self.error_message),
            user_id: Set(self.user_id),
            created_at: NotSet,
            updated_at: NotSet,
            deleted_at: Set(None),
        }
    }
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn get_by_user(
        &self,
        user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    async fn get_by_action(
        &self,
        action: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    async fn get_by_resource(
        &self,
        resource: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    async fn get_by_resource_id(
        &self,
        resource_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    async fn get_by_date_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    async fn get_recent_activities(&self, limit: u64) -> AppResult<Vec<activity_log::Model>>;

    async fn get_successful_activities(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    async fn get_failed_activities(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    /// Entries with a non-empty error message
    async fn get_activities_with_errors(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    async fn get_user_activity_stats(&self, user_id: Uuid) -> AppResult<UserActivityStats>;

    async fn get_system_activity_stats(&self) -> AppResult<SystemActivityStats>;

    /// Entry counts for the latest 30 buckets, newest first
    async fn get_activity_trends(&self, period: TrendPeriod) -> AppResult<Vec<TrendPoint>>;

    async fn log_activity(&self, activity: NewActivity) -> AppResult<activity_log::Model>;

    async fn search_activities(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    async fn get_activities_by_ip_address(
        &self,
        ip_address: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>>;

    /// Permanently remove entries created before `older_than`; returns rows removed
    async fn cleanup_old_activities(&self, older_than: DateTime<Utc>) -> AppResult<u64>;
}

pub struct ActivityLogStore<'c, C = DatabaseConnection> {
    db: &'c C,
}

impl<'c, C> ActivityLogStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(db: &'c C) -> Self {
        Self { db }
    }

    async fn page_where(
        &self,
        condition: impl IntoCondition,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        fetch_page(
            activity_log::Entity::find_active().filter(condition),
            self.db,
            pagination,
        )
        .await
    }
}

impl_base_repository!(ActivityLogStore, activity_log::Entity);

#[derive(Debug, FromQueryResult)]
struct TrendRow {
    bucket: DateTime<Utc>,
    count: i64,
}

#[async_trait]
impl<'c, C> ActivityLogRepository for ActivityLogStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn get_by_user(
        &self,
        user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(activity_log::Column::UserId.eq(user_id), pagination)
            .await
    }

    async fn get_by_action(
        &self,
        action: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(activity_log::Column::Action.eq(action), pagination)
            .await
    }

    async fn get_by_resource(
        &self,
        resource: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(activity_log::Column::Resource.eq(resource), pagination)
            .await
    }

    async fn get_by_resource_id(
        &self,
        resource_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(activity_log::Column::ResourceId.eq(resource_id), pagination)
            .await
    }

    async fn get_by_date_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(date_range(activity_log::Column::CreatedAt, from, to), pagination)
            .await
    }

    async fn get_recent_activities(&self, limit: u64) -> AppResult<Vec<activity_log::Model>> {
        let activities = activity_log::Entity::find_active()
            .order_by_desc(activity_log::Column::CreatedAt)
            .limit(clamp_limit(limit))
            .all(self.db)
            .await?;
        Ok(activities)
    }

    async fn get_successful_activities(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(activity_log::Column::Success.eq(true), pagination)
            .await
    }

    async fn get_failed_activities(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(activity_log::Column::Success.eq(false), pagination)
            .await
    }

    async fn get_activities_with_errors(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(activity_log::Column::ErrorMessage.ne(""), pagination)
            .await
    }

    async fn get_user_activity_stats(&self, user_id: Uuid) -> AppResult<UserActivityStats> {
        let select =
            || activity_log::Entity::find_active().filter(activity_log::Column::UserId.eq(user_id));

        let total_activities = select().count(self.db).await?;
        let successful_actions = select()
            .filter(activity_log::Column::Success.eq(true))
            .count(self.db)
            .await?;
        let last_activity = select()
            .order_by_desc(activity_log::Column::CreatedAt)
            .one(self.db)
            .await?
            .map(|latest| latest.created_at);

        Ok(UserActivityStats {
            user_id,
            total_activities,
            successful_actions,
            failed_actions: total_activities.saturating_sub(successful_actions),
            success_rate: percentage(successful_actions, total_activities),
            last_activity,
        })
    }

    async fn get_system_activity_stats(&self) -> AppResult<SystemActivityStats> {
        let select = activity_log::Entity::find_active;

        let total_activities = select().count(self.db).await?;
        let successful_actions = select()
            .filter(activity_log::Column::Success.eq(true))
            .count(self.db)
            .await?;
        let unique_users = aggregate(
            select().filter(activity_log::Column::UserId.is_not_null()),
            "COUNT(DISTINCT user_id)",
            self.db,
        )
        .await? as u64;
        let today_activities = select()
            .filter(activity_log::Column::CreatedAt.gte(start_of_day(Utc::now())))
            .count(self.db)
            .await?;

        Ok(SystemActivityStats {
            total_activities,
            successful_actions,
            failed_actions: total_activities.saturating_sub(successful_actions),
            unique_users,
            today_activities,
            success_rate: percentage(successful_actions, total_activities),
        })
    }

    async fn get_activity_trends(&self, period: TrendPeriod) -> AppResult<Vec<TrendPoint>> {
        let bucket = trend_bucket(period, "created_at");
        let rows = activity_log::Entity::find_active()
            .select_only()
            .column_as(bucket.clone(), "bucket")
            .column_as(Expr::cust("COUNT(*)"), "count")
            .group_by(bucket.clone())
            .order_by(bucket, Order::Desc)
            .limit(TREND_BUCKET_LIMIT)
            .into_model::<TrendRow>()
            .all(self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| TrendPoint {
                bucket: row.bucket,
                count: row.count.max(0) as u64,
            })
            .collect())
    }

    async fn log_activity(&self, activity: NewActivity) -> AppResult<activity_log::Model> {
        let logged = activity.into_active_model().insert(self.db).await?;
        tracing::debug!(
            activity_id = %logged.id,
            action = %logged.action,
            resource = %logged.resource,
            success = logged.success,
            "Activity logged"
        );
        Ok(logged)
    }

    async fn search_activities(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        let condition = search_condition::<activity_log::Entity>(
            query,
            &[
                activity_log::Column::Action,
                activity_log::Column::Resource,
                activity_log::Column::ErrorMessage,
            ],
        );
        self.page_where(condition, pagination).await
    }

    async fn get_activities_by_ip_address(
        &self,
        ip_address: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<activity_log::Model>> {
        self.page_where(activity_log::Column::IpAddress.eq(ip_address), pagination)
            .await
    }

    async fn cleanup_old_activities(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        let result = activity_log::Entity::delete_many()
            .filter(activity_log::Column::CreatedAt.lt(older_than))
            .exec(self.db)
            .await?;

        tracing::info!(
            removed = result.rows_affected,
            older_than = %older_than,
            "Old activity log entries removed"
        );
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn count_row(n: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("num_items", Value::from(n))])
    }

    fn logged(activity: &NewActivity) -> activity_log::Model {
        let now = Utc::now();
        activity_log::Model {
            id: Uuid::new_v4(),
            action: activity.action.clone(),
            resource: activity.resource.clone(),
            resource_id: activity.resource_id,
            details: activity.details.clone(),
            ip_address: activity.detail("ip_address"),
            user_agent: activity.detail("user_agent"),
            success: activity.success,
            error_message: activity.error_message.clone(),
            user_id: activity.user_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn client_fields_are_lifted_from_details() {
        let activity = NewActivity::new("login", "user").with_details(serde_json::json!({
            "ip_address": "10.0.0.7",
            "user_agent": "curl/8.0",
            "attempt": 2,
        }));

        let model = activity.into_active_model();
        assert_eq!(model.ip_address.as_ref(), "10.0.0.7");
        assert_eq!(model.user_agent.as_ref(), "curl/8.0");
    }

    #[test]
    fn non_string_client_fields_are_ignored() {
        let activity =
            NewActivity::new("login", "user").with_details(serde_json::json!({ "ip_address": 42 }));
        assert_eq!(activity.into_active_model().ip_address.as_ref(), "");
    }

    #[test]
    fn failures_carry_their_message() {
        let activity = NewActivity::new("delete", "project").failed("permission denied");
        assert!(!activity.success);
        assert_eq!(activity.error_message, "permission denied");
    }

    #[tokio::test]
    async fn logging_inserts_a_stamped_row() {
        let activity = NewActivity::new("create", "task")
            .by(Uuid::new_v4())
            .on(Uuid::new_v4())
            .with_details(serde_json::json!({ "ip_address": "127.0.0.1" }));
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![logged(&activity)]])
            .into_connection();
        let repo = ActivityLogStore::new(&db);

        let row = repo.log_activity(activity).await.unwrap();
        assert_eq!(row.ip_address, "127.0.0.1");

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("INSERT INTO \\\"activity_logs\\\""));
    }

    #[tokio::test]
    async fn system_stats_without_activity_have_zero_rate() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(0)], [count_row(0)]])
            .append_query_results([[BTreeMap::from([("value", Value::from(Some(0.0f64)))])]])
            .append_query_results([[count_row(0)]])
            .into_connection();
        let repo = ActivityLogStore::new(&db);

        let stats = repo.get_system_activity_stats().await.unwrap();
        assert_eq!(stats.total_activities, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[tokio::test]
    async fn user_stats_split_success_and_failure() {
        let user_id = Uuid::new_v4();
        let latest = logged(&NewActivity::new("update", "project").by(user_id));
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(8)], [count_row(6)]])
            .append_query_results([vec![latest.clone()]])
            .into_connection();
        let repo = ActivityLogStore::new(&db);

        let stats = repo.get_user_activity_stats(user_id).await.unwrap();
        assert_eq!(stats.failed_actions, 2);
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.last_activity, Some(latest.created_at));
    }

    #[tokio::test]
    async fn trends_are_newest_first_and_bounded() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<BTreeMap<&'static str, Value>>::new()])
            .into_connection();
        let repo = ActivityLogStore::new(&db);

        repo.get_activity_trends(TrendPeriod::Weekly).await.unwrap();

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("DATE_TRUNC('week', created_at) DESC"));
        assert!(log.contains("LIMIT"));
    }

    #[tokio::test]
    async fn cleanup_hard_deletes_and_reports_rows() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 17,
            }])
            .into_connection();
        let repo = ActivityLogStore::new(&db);

        let removed = repo
            .cleanup_old_activities(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 17);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("DELETE FROM"));
        assert!(!log.contains("UPDATE"));
    }
}
