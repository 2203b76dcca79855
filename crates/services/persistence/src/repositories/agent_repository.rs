//! Agent repository: availability, performance metrics and workload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, IntoCondition};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

use super::base::impl_base_repository;
use super::entities::{agent, task, RecordEntity};
use super::query::{
    aggregate, bucket_sum, clamp_limit, count_by, fetch_page, json_contains, search_condition,
    update_live,
};
use crate::types::{Paginated, Pagination, SortOrder};
use common::{AppError, AppResult};
use domain::{
    AgentStatistics, AgentStatus, AgentTaskCounts, AgentWorkload, TaskStatus, MAX_SUCCESS_RATE,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn get_by_type(
        &self,
        agent_type: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<agent::Model>>;

    async fn get_by_status(
        &self,
        status: AgentStatus,
        pagination: &Pagination,
    ) -> AppResult<Paginated<agent::Model>>;

    async fn get_active_agents(&self, pagination: &Pagination) -> AppResult<Paginated<agent::Model>>;

    async fn get_inactive_agents(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<agent::Model>>;

    async fn get_busy_agents(&self, pagination: &Pagination) -> AppResult<Paginated<agent::Model>>;

    /// Active agents, least loaded first, optionally of one type
    async fn get_available_agents(&self, agent_type: Option<String>) -> AppResult<Vec<agent::Model>>;

    async fn get_agent_with_tasks(&self, id: Uuid) -> AppResult<Option<(agent::Model, Vec<task::Model>)>>;

    async fn update_status(&self, id: Uuid, status: AgentStatus) -> AppResult<()>;

    /// Stamp `last_active` with the current time
    async fn update_last_active(&self, id: Uuid) -> AppResult<()>;

    async fn update_task_count(&self, id: Uuid, count: i32) -> AppResult<()>;

    /// Success rate as a percentage (0..=100)
    async fn update_success_rate(&self, id: Uuid, rate: f64) -> AppResult<()>;

    /// Average response time in milliseconds
    async fn update_response_time(&self, id: Uuid, millis: f64) -> AppResult<()>;

    async fn get_agent_statistics(&self, id: Uuid) -> AppResult<AgentStatistics>;

    /// Agents advertising every capability in `capabilities`
    async fn get_agents_by_capabilities(&self, capabilities: &[String])
        -> AppResult<Vec<agent::Model>>;

    async fn get_agents_by_last_active(&self, since: DateTime<Utc>) -> AppResult<Vec<agent::Model>>;

    async fn get_top_performing_agents(&self, limit: u64) -> AppResult<Vec<agent::Model>>;

    async fn search_agents(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<agent::Model>>;

    async fn get_agent_workload(&self, id: Uuid) -> AppResult<AgentWorkload>;
}

pub struct AgentStore<'c, C = DatabaseConnection> {
    db: &'c C,
}

impl<'c, C> AgentStore<'c, C>
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
    ) -> AppResult<Paginated<agent::Model>> {
        fetch_page(agent::Entity::find_active().filter(condition), self.db, pagination).await
    }

    async fn find_live(&self, id: Uuid) -> AppResult<Option<agent::Model>> {
        let agent = agent::Entity::find_active()
            .filter(agent::Column::Id.eq(id))
            .one(self.db)
            .await?;
        Ok(agent)
    }

    fn tasks_of(id: Uuid) -> sea_orm::Select<task::Entity> {
        task::Entity::find_active().filter(task::Column::AgentId.eq(id))
    }
}

impl_base_repository!(AgentStore, agent::Entity);

#[async_trait]
impl<'c, C> AgentRepository for AgentStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn get_by_type(
        &self,
        agent_type: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<agent::Model>> {
        self.page_where(agent::Column::AgentType.eq(agent_type), pagination)
            .await
    }

    async fn get_by_status(
        &self,
        status: AgentStatus,
        pagination: &Pagination,
    ) -> AppResult<Paginated<agent::Model>> {
        self.page_where(agent::Column::Status.eq(status.as_str()), pagination)
            .await
    }

    async fn get_active_agents(&self, pagination: &Pagination) -> AppResult<Paginated<agent::Model>> {
        self.get_by_status(AgentStatus::Active, pagination).await
    }

    async fn get_inactive_agents(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<agent::Model>> {
        self.get_by_status(AgentStatus::Inactive, pagination).await
    }

    async fn get_busy_agents(&self, pagination: &Pagination) -> AppResult<Paginated<agent::Model>> {
        self.get_by_status(AgentStatus::Busy, pagination).await
    }

    async fn get_available_agents(&self, agent_type: Option<String>) -> AppResult<Vec<agent::Model>> {
        let mut select = agent::Entity::find_active()
            .filter(agent::Column::Status.eq(AgentStatus::Active.as_str()));
        if let Some(agent_type) = agent_type {
            select = select.filter(agent::Column::AgentType.eq(agent_type));
        }

        let agents = select
            .order_by_asc(agent::Column::TaskCount)
            .order_by_desc(agent::Column::SuccessRate)
            .all(self.db)
            .await?;
        Ok(agents)
    }

    async fn get_agent_with_tasks(&self, id: Uuid) -> AppResult<Option<(agent::Model, Vec<task::Model>)>> {
        let Some(agent) = self.find_live(id).await? else {
            return Ok(None);
        };
        let tasks = agent
            .find_related(task::Entity)
            .filter(task::Column::DeletedAt.is_null())
            .order_by_desc(task::Column::CreatedAt)
            .all(self.db)
            .await?;
        Ok(Some((agent, tasks)))
    }

    async fn update_status(&self, id: Uuid, status: AgentStatus) -> AppResult<()> {
        update_live::<agent::Entity, _>(
            self.db,
            id,
            vec![(agent::Column::Status, Expr::value(status.as_str()))],
        )
        .await?;
        tracing::debug!(agent_id = %id, status = %status, "Agent status updated");
        Ok(())
    }

    async fn update_last_active(&self, id: Uuid) -> AppResult<()> {
        update_live::<agent::Entity, _>(
            self.db,
            id,
            vec![(agent::Column::LastActive, Expr::value(Some(Utc::now())))],
        )
        .await
    }

    async fn update_task_count(&self, id: Uuid, count: i32) -> AppResult<()> {
        if count < 0 {
            return Err(AppError::validation("task count cannot be negative"));
        }
        update_live::<agent::Entity, _>(self.db, id, vec![(agent::Column::TaskCount, Expr::value(count))])
            .await
    }

    async fn update_success_rate(&self, id: Uuid, rate: f64) -> AppResult<()> {
        if !(0.0..=MAX_SUCCESS_RATE).contains(&rate) {
            return Err(AppError::validation("success rate must be between 0 and 100"));
        }
        update_live::<agent::Entity, _>(self.db, id, vec![(agent::Column::SuccessRate, Expr::value(rate))])
            .await
    }

    async fn update_response_time(&self, id: Uuid, millis: f64) -> AppResult<()> {
        if !millis.is_finite() || millis < 0.0 {
            return Err(AppError::validation("response time cannot be negative"));
        }
        update_live::<agent::Entity, _>(
            self.db,
            id,
            vec![(agent::Column::AvgResponseTime, Expr::value(millis))],
        )
        .await
    }

    async fn get_agent_statistics(&self, id: Uuid) -> AppResult<AgentStatistics> {
        let agent = self.find_live(id).await?.ok_or(AppError::NotFound)?;
        let counts = count_by(Self::tasks_of(id), task::Column::Status, self.db).await?;

        let bucket = |status: TaskStatus| counts.get(status.as_str()).copied().unwrap_or(0);
        let task_statistics = AgentTaskCounts {
            total_tasks: counts.values().sum(),
            pending_tasks: bucket(TaskStatus::Pending),
            in_progress_tasks: bucket(TaskStatus::InProgress),
            completed_tasks: bucket(TaskStatus::Completed),
            failed_tasks: bucket(TaskStatus::Failed),
        };

        Ok(AgentStatistics {
            id: agent.id,
            idle_seconds: agent
                .last_active
                .map(|seen| (Utc::now() - seen).num_seconds().max(0)),
            name: agent.name,
            agent_type: agent.agent_type,
            status: agent.status,
            task_count: agent.task_count,
            success_rate: agent.success_rate,
            avg_response_time: agent.avg_response_time,
            created_at: agent.created_at,
            last_active: agent.last_active,
            task_statistics,
        })
    }

    async fn get_agents_by_capabilities(
        &self,
        capabilities: &[String],
    ) -> AppResult<Vec<agent::Model>> {
        let agents = agent::Entity::find_active()
            .filter(json_contains::<agent::Entity>(
                agent::Column::Capabilities,
                serde_json::json!(capabilities),
            ))
            .order_by_asc(agent::Column::Name)
            .all(self.db)
            .await?;
        Ok(agents)
    }

    async fn get_agents_by_last_active(&self, since: DateTime<Utc>) -> AppResult<Vec<agent::Model>> {
        let agents = agent::Entity::find_active()
            .filter(agent::Column::LastActive.gte(since))
            .order_by_desc(agent::Column::LastActive)
            .all(self.db)
            .await?;
        Ok(agents)
    }

    async fn get_top_performing_agents(&self, limit: u64) -> AppResult<Vec<agent::Model>> {
        let agents = agent::Entity::find_active()
            .filter(agent::Column::Status.eq(AgentStatus::Active.as_str()))
            .order_by_desc(agent::Column::SuccessRate)
            .order_by_desc(agent::Column::TaskCount)
            .limit(clamp_limit(limit))
            .all(self.db)
            .await?;
        Ok(agents)
    }

    async fn search_agents(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<agent::Model>> {
        let condition = search_condition::<agent::Entity>(
            query,
            &[
                agent::Column::Name,
                agent::Column::AgentType,
                agent::Column::Capabilities,
            ],
        );
        let pagination = pagination.clone().with_default_sort("name", SortOrder::Asc);
        self.page_where(condition, &pagination).await
    }

    async fn get_agent_workload(&self, id: Uuid) -> AppResult<AgentWorkload> {
        let task_counts = count_by(Self::tasks_of(id), task::Column::Status, self.db).await?;

        let avg_completion_time_minutes = aggregate(
            Self::tasks_of(id)
                .filter(task::Column::Status.eq(TaskStatus::Completed.as_str()))
                .filter(task::Column::StartedAt.is_not_null())
                .filter(task::Column::CompletedAt.is_not_null()),
            "AVG(EXTRACT(EPOCH FROM (completed_at - started_at)) / 60)",
            self.db,
        )
        .await?;

        let estimated_remaining_minutes = aggregate(
            Self::tasks_of(id).filter(task::Column::Status.is_in([
                TaskStatus::Pending.as_str(),
                TaskStatus::Assigned.as_str(),
                TaskStatus::InProgress.as_str(),
            ])),
            "COALESCE(SUM(estimated_time), 0)",
            self.db,
        )
        .await?;

        Ok(AgentWorkload {
            total_tasks: task_counts.values().sum(),
            current_load: bucket_sum(
                &task_counts,
                &[TaskStatus::InProgress.as_str(), TaskStatus::Assigned.as_str()],
            ),
            pending_load: bucket_sum(
                &task_counts,
                &[TaskStatus::Pending.as_str(), TaskStatus::Queued.as_str()],
            ),
            task_counts,
            avg_completion_time_minutes,
            estimated_remaining_minutes: estimated_remaining_minutes.round() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn bucket(key: &str, count: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("key", key.into()), ("count", count.into())])
    }

    fn scalar(value: f64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("value", Value::from(Some(value)))])
    }

    fn agent_row(last_active: Option<DateTime<Utc>>) -> agent::Model {
        let now = Utc::now();
        agent::Model {
            id: Uuid::new_v4(),
            name: "scout".into(),
            agent_type: "researcher".into(),
            status: "active".into(),
            capabilities: Some(serde_json::json!(["search", "summarize"])),
            config: None,
            last_active,
            task_count: 4,
            success_rate: 75.0,
            avg_response_time: 120.0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn metric_updates_are_range_checked() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = AgentStore::new(&db);
        let id = Uuid::new_v4();

        assert!(matches!(
            repo.update_success_rate(id, 100.5).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            repo.update_response_time(id, -1.0).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            repo.update_task_count(id, -3).await,
            Err(AppError::Validation(_))
        ));
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn success_rate_bounds_are_inclusive() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();
        let repo = AgentStore::new(&db);

        repo.update_success_rate(Uuid::new_v4(), 0.0).await.unwrap();
        repo.update_success_rate(Uuid::new_v4(), 100.0).await.unwrap();
    }

    #[tokio::test]
    async fn statistics_of_missing_agent_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<agent::Model>::new()])
            .into_connection();
        let repo = AgentStore::new(&db);

        assert!(matches!(
            repo.get_agent_statistics(Uuid::new_v4()).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn statistics_report_task_breakdown_and_idle_time() {
        let seen = Utc::now() - chrono::Duration::minutes(5);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![agent_row(Some(seen))]])
            .append_query_results([vec![
                bucket("completed", 3),
                bucket("failed", 1),
                bucket("in_progress", 2),
            ]])
            .into_connection();
        let repo = AgentStore::new(&db);

        let stats = repo.get_agent_statistics(Uuid::new_v4()).await.unwrap();
        assert_eq!(stats.task_statistics.total_tasks, 6);
        assert_eq!(stats.task_statistics.completed_tasks, 3);
        assert_eq!(stats.task_statistics.pending_tasks, 0);
        assert!(stats.idle_seconds.unwrap() >= 300);
    }

    #[tokio::test]
    async fn workload_combines_statuses() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                bucket("pending", 2),
                bucket("queued", 1),
                bucket("assigned", 1),
                bucket("in_progress", 2),
                bucket("completed", 5),
            ]])
            .append_query_results([[scalar(42.5)], [scalar(180.0)]])
            .into_connection();
        let repo = AgentStore::new(&db);

        let workload = repo.get_agent_workload(Uuid::new_v4()).await.unwrap();
        assert_eq!(workload.total_tasks, 11);
        assert_eq!(workload.current_load, 3);
        assert_eq!(workload.pending_load, 3);
        assert_eq!(workload.avg_completion_time_minutes, 42.5);
        assert_eq!(workload.estimated_remaining_minutes, 180);
    }

    #[tokio::test]
    async fn capabilities_use_json_containment() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![agent_row(None)]])
            .into_connection();
        let repo = AgentStore::new(&db);

        let agents = repo
            .get_agents_by_capabilities(&["search".to_string()])
            .await
            .unwrap();
        assert_eq!(agents.len(), 1);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("@>"));
        assert!(log.contains("::jsonb"));
    }
}
