//! Task repository: lookups, state transitions and assignment.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, LoaderTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::base::impl_base_repository;
use super::entities::{agent, project, task, user, RecordEntity};
use super::query::{
    count_by, date_range, day_range, fetch_page, numeric_range, search_condition, start_of_day,
    update_live,
};
use crate::types::{Filter, Paginated, Pagination};
use common::{AppError, AppResult};
use domain::{is_valid_progress, Priority, TaskStatistics, TaskStatus, TASK_OVERDUE_DAYS};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// A task with the rows it points at loaded alongside
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWithRelations {
    #[serde(flatten)]
    pub task: task::Model,
    pub project: Option<project::Model>,
    pub agent: Option<agent::Model>,
    pub assignee: Option<user::Model>,
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get_by_project(
        &self,
        project_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    async fn get_by_assignee(
        &self,
        user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    async fn get_by_agent(
        &self,
        agent_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    async fn get_by_status(
        &self,
        status: TaskStatus,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    async fn get_by_priority(
        &self,
        priority: Priority,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    async fn get_by_type(
        &self,
        task_type: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    async fn get_pending_tasks(&self, pagination: &Pagination) -> AppResult<Paginated<task::Model>>;

    async fn get_in_progress_tasks(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    async fn get_completed_tasks(&self, pagination: &Pagination)
        -> AppResult<Paginated<task::Model>>;

    /// Open tasks created more than a week ago
    async fn get_overdue_tasks(&self) -> AppResult<Vec<task::Model>>;

    async fn get_tasks_by_date_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    /// Tasks completed since midnight UTC
    async fn get_tasks_completed_today(&self) -> AppResult<Vec<task::Model>>;

    async fn get_tasks_completed_in_period(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<task::Model>>;

    /// Move a task to `status`, stamping `completed_at` / `started_at`
    async fn update_status(&self, id: Uuid, status: TaskStatus) -> AppResult<()>;

    async fn update_progress(&self, id: Uuid, progress: i32) -> AppResult<()>;

    /// Assign to a user, an agent or both; at least one is required
    async fn assign_task(
        &self,
        id: Uuid,
        assignee_id: Option<Uuid>,
        agent_id: Option<Uuid>,
    ) -> AppResult<()>;

    /// Clear both assignments; an `assigned` task goes back to `pending`
    async fn unassign_task(&self, id: Uuid) -> AppResult<()>;

    async fn get_task_statistics(&self, filter: &Filter) -> AppResult<TaskStatistics>;

    /// Tasks whose estimate (minutes) lies within the inclusive bounds
    async fn get_tasks_by_estimated_time(
        &self,
        min_minutes: Option<i32>,
        max_minutes: Option<i32>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    async fn search_tasks(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>>;

    /// One page of tasks with project, agent and assignee loaded
    async fn get_tasks_with_relations(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<TaskWithRelations>>;
}

pub struct TaskStore<'c, C = DatabaseConnection> {
    db: &'c C,
}

impl<'c, C> TaskStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(db: &'c C) -> Self {
        Self { db }
    }

    async fn page_where(
        &self,
        condition: impl sea_orm::sea_query::IntoCondition,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        fetch_page(task::Entity::find_active().filter(condition), self.db, pagination).await
    }

    async fn completed_where(&self, window: Condition) -> AppResult<Vec<task::Model>> {
        let tasks = task::Entity::find_active()
            .filter(task::Column::Status.eq(TaskStatus::Completed.as_str()))
            .filter(window)
            .order_by_desc(task::Column::CompletedAt)
            .all(self.db)
            .await?;
        Ok(tasks)
    }
}

impl_base_repository!(TaskStore, task::Entity);

fn open_statuses() -> Condition {
    Condition::all().add(
        task::Column::Status.is_not_in([TaskStatus::Completed.as_str(), TaskStatus::Cancelled.as_str()]),
    )
}

/// Column updates for a status change
fn status_columns(status: TaskStatus, now: DateTime<Utc>) -> Vec<(task::Column, SimpleExpr)> {
    let mut columns = vec![(task::Column::Status, Expr::value(status.as_str()))];
    match status {
        TaskStatus::Completed => {
            columns.push((task::Column::CompletedAt, Expr::value(Some(now))));
        }
        TaskStatus::InProgress => {
            // Keep the first start time when a task is resumed
            columns.push((
                task::Column::StartedAt,
                Func::coalesce([Expr::col(task::Column::StartedAt).into(), Expr::value(Some(now))])
                    .into(),
            ));
        }
        _ => {}
    }
    columns
}

#[async_trait]
impl<'c, C> TaskRepository for TaskStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn get_by_project(
        &self,
        project_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.page_where(task::Column::ProjectId.eq(project_id), pagination)
            .await
    }

    async fn get_by_assignee(
        &self,
        user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.page_where(task::Column::AssignedTo.eq(user_id), pagination)
            .await
    }

    async fn get_by_agent(
        &self,
        agent_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.page_where(task::Column::AgentId.eq(agent_id), pagination)
            .await
    }

    async fn get_by_status(
        &self,
        status: TaskStatus,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.page_where(task::Column::Status.eq(status.as_str()), pagination)
            .await
    }

    async fn get_by_priority(
        &self,
        priority: Priority,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.page_where(task::Column::Priority.eq(priority.as_str()), pagination)
            .await
    }

    async fn get_by_type(
        &self,
        task_type: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.page_where(task::Column::TaskType.eq(task_type), pagination)
            .await
    }

    async fn get_pending_tasks(&self, pagination: &Pagination) -> AppResult<Paginated<task::Model>> {
        self.get_by_status(TaskStatus::Pending, pagination).await
    }

    async fn get_in_progress_tasks(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.get_by_status(TaskStatus::InProgress, pagination).await
    }

    async fn get_completed_tasks(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.get_by_status(TaskStatus::Completed, pagination).await
    }

    async fn get_overdue_tasks(&self) -> AppResult<Vec<task::Model>> {
        let cutoff = Utc::now() - Duration::days(TASK_OVERDUE_DAYS);
        let tasks = task::Entity::find_active()
            .filter(task::Column::CreatedAt.lt(cutoff))
            .filter(open_statuses())
            .order_by_asc(task::Column::CreatedAt)
            .all(self.db)
            .await?;
        Ok(tasks)
    }

    async fn get_tasks_by_date_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        self.page_where(date_range(task::Column::CreatedAt, from, to), pagination)
            .await
    }

    async fn get_tasks_completed_today(&self) -> AppResult<Vec<task::Model>> {
        let today = start_of_day(Utc::now());
        self.completed_where(day_range(task::Column::CompletedAt, today))
            .await
    }

    async fn get_tasks_completed_in_period(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<task::Model>> {
        self.completed_where(date_range(task::Column::CompletedAt, Some(from), Some(to)))
            .await
    }

    async fn update_status(&self, id: Uuid, status: TaskStatus) -> AppResult<()> {
        update_live::<task::Entity, _>(self.db, id, status_columns(status, Utc::now())).await?;
        tracing::debug!(task_id = %id, status = %status, "Task status updated");
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, progress: i32) -> AppResult<()> {
        if !is_valid_progress(progress) {
            return Err(AppError::validation("progress must be between 0 and 100"));
        }
        update_live::<task::Entity, _>(self.db, id, vec![(task::Column::Progress, Expr::value(progress))])
            .await
    }

    async fn assign_task(
        &self,
        id: Uuid,
        assignee_id: Option<Uuid>,
        agent_id: Option<Uuid>,
    ) -> AppResult<()> {
        if assignee_id.is_none() && agent_id.is_none() {
            return Err(AppError::validation("no assignment provided"));
        }

        let mut columns = vec![(task::Column::Status, Expr::value(TaskStatus::Assigned.as_str()))];
        if let Some(assignee_id) = assignee_id {
            columns.push((task::Column::AssignedTo, Expr::value(Some(assignee_id))));
        }
        if let Some(agent_id) = agent_id {
            columns.push((task::Column::AgentId, Expr::value(Some(agent_id))));
        }
        update_live::<task::Entity, _>(self.db, id, columns).await
    }

    async fn unassign_task(&self, id: Uuid) -> AppResult<()> {
        let status = Expr::case(
            task::Column::Status.eq(TaskStatus::Assigned.as_str()),
            Expr::value(TaskStatus::Pending.as_str()),
        )
        .finally(Expr::col(task::Column::Status));

        update_live::<task::Entity, _>(
            self.db,
            id,
            vec![
                (task::Column::AssignedTo, Expr::value(None::<Uuid>)),
                (task::Column::AgentId, Expr::value(None::<Uuid>)),
                (task::Column::Status, status.into()),
            ],
        )
        .await
    }

    async fn get_task_statistics(&self, filter: &Filter) -> AppResult<TaskStatistics> {
        let condition = filter.condition::<task::Entity>()?;
        let select = || task::Entity::find_active().filter(condition.clone());

        let total = select().count(self.db).await?;
        let by_status = count_by(select(), task::Column::Status, self.db).await?;
        let by_priority = count_by(select(), task::Column::Priority, self.db).await?;

        Ok(TaskStatistics {
            total,
            by_status,
            by_priority,
        })
    }

    async fn get_tasks_by_estimated_time(
        &self,
        min_minutes: Option<i32>,
        max_minutes: Option<i32>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        if let (Some(min), Some(max)) = (min_minutes, max_minutes) {
            if min > max {
                return Err(AppError::validation("minimum estimate exceeds maximum"));
            }
        }
        self.page_where(
            numeric_range(task::Column::EstimatedTime, min_minutes, max_minutes),
            pagination,
        )
        .await
    }

    async fn search_tasks(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<task::Model>> {
        let condition = search_condition::<task::Entity>(
            query,
            &[task::Column::Title, task::Column::Description, task::Column::TaskType],
        );
        self.page_where(condition, pagination).await
    }

    async fn get_tasks_with_relations(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<TaskWithRelations>> {
        let page = fetch_page(task::Entity::find_active(), self.db, pagination).await?;

        let projects = page.data.load_one(project::Entity::find_active(), self.db).await?;
        let agents = page.data.load_one(agent::Entity::find_active(), self.db).await?;
        let assignees = page.data.load_one(user::Entity::find_active(), self.db).await?;

        let mut related = projects.into_iter().zip(agents).zip(assignees);
        Ok(page.map(|task| {
            let ((project, agent), assignee) = related.next().unwrap_or_default();
            TaskWithRelations {
                task,
                project,
                agent,
                assignee,
            }
        }))
    }
}
