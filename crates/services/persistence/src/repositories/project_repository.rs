//! Project repository: lookups, related rows and cached statistics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::base::impl_base_repository;
use super::entities::{pattern, project, proposal, task, RecordEntity};
use super::query::{
    cache_key, clamp_limit, contains_all, count_by, date_range, fetch_page, search_condition,
};
use crate::cache::{CacheExt, CacheManager};
use crate::config::{CACHE_PREFIX_PROJECT, PROJECT_STATS_CACHE_TTL_SECONDS};
use crate::types::{Paginated, Pagination, SortOrder};
use common::{AppError, AppResult};
use domain::{
    is_valid_progress, percentage, Priority, ProjectStatistics, ProjectStatus, ProjectType,
    ProposalStatus, TaskStatus,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// A project together with the number of live tasks it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectWithTaskCount {
    #[serde(flatten)]
    pub project: project::Model,
    pub task_count: u64,
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get_by_creator(
        &self,
        creator_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>>;

    async fn get_by_status(
        &self,
        status: ProjectStatus,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>>;

    async fn get_by_type(
        &self,
        project_type: ProjectType,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>>;

    async fn get_by_priority(
        &self,
        priority: Priority,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>>;

    /// Project and its live tasks; `None` when the project does not exist
    async fn get_with_tasks(&self, id: Uuid) -> AppResult<Option<(project::Model, Vec<task::Model>)>>;

    async fn get_with_proposals(
        &self,
        id: Uuid,
    ) -> AppResult<Option<(project::Model, Vec<proposal::Model>)>>;

    async fn get_with_patterns(
        &self,
        id: Uuid,
    ) -> AppResult<Option<(project::Model, Vec<pattern::Model>)>>;

    /// Task, proposal and pattern counts, cached for five minutes
    async fn get_project_statistics(&self, id: Uuid) -> AppResult<ProjectStatistics>;

    async fn get_active_projects(&self, pagination: &Pagination)
        -> AppResult<Paginated<project::Model>>;

    /// Newest projects first
    async fn get_recent_projects(&self, limit: u64) -> AppResult<Vec<project::Model>>;

    /// Set completion percentage (0..=100)
    async fn update_progress(&self, id: Uuid, progress: i32) -> AppResult<()>;

    /// Open projects whose end date has passed
    async fn get_overdue_projects(&self) -> AppResult<Vec<project::Model>>;

    async fn get_projects_by_date_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>>;

    /// Projects whose tags mention every entry of `tags`
    async fn get_projects_by_tags(
        &self,
        tags: &[String],
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>>;

    async fn search_projects(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>>;

    async fn get_projects_with_task_counts(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<ProjectWithTaskCount>>;
}

pub struct ProjectStore<'c, C = DatabaseConnection> {
    db: &'c C,
    cache: Arc<dyn CacheManager>,
}

impl<'c, C> ProjectStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(db: &'c C, cache: Arc<dyn CacheManager>) -> Self {
        Self { db, cache }
    }

    async fn find_live(&self, id: Uuid) -> AppResult<Option<project::Model>> {
        let project = project::Entity::find_active()
            .filter(project::Column::Id.eq(id))
            .one(self.db)
            .await?;
        Ok(project)
    }

    async fn page_where(
        &self,
        condition: impl sea_orm::sea_query::IntoCondition,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        fetch_page(
            project::Entity::find_active().filter(condition),
            self.db,
            pagination,
        )
        .await
    }
}

impl_base_repository!(ProjectStore, project::Entity);

fn stats_key(id: Uuid) -> String {
    cache_key(CACHE_PREFIX_PROJECT, ["stats".to_string(), id.to_string()])
}

#[derive(Debug, FromQueryResult)]
struct ProjectTaskCount {
    project_id: Option<Uuid>,
    count: i64,
}

#[async_trait]
impl<'c, C> ProjectRepository for ProjectStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn get_by_creator(
        &self,
        creator_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        self.page_where(project::Column::CreatedBy.eq(creator_id), pagination)
            .await
    }

    async fn get_by_status(
        &self,
        status: ProjectStatus,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        self.page_where(project::Column::Status.eq(status.as_str()), pagination)
            .await
    }

    async fn get_by_type(
        &self,
        project_type: ProjectType,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        self.page_where(project::Column::ProjectType.eq(project_type.as_str()), pagination)
            .await
    }

    async fn get_by_priority(
        &self,
        priority: Priority,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        self.page_where(project::Column::Priority.eq(priority.as_str()), pagination)
            .await
    }

    async fn get_with_tasks(&self, id: Uuid) -> AppResult<Option<(project::Model, Vec<task::Model>)>> {
        let Some(project) = self.find_live(id).await? else {
            return Ok(None);
        };
        let tasks = project
            .find_related(task::Entity)
            .filter(task::Column::DeletedAt.is_null())
            .all(self.db)
            .await?;
        Ok(Some((project, tasks)))
    }

    async fn get_with_proposals(
        &self,
        id: Uuid,
    ) -> AppResult<Option<(project::Model, Vec<proposal::Model>)>> {
        let Some(project) = self.find_live(id).await? else {
            return Ok(None);
        };
        let proposals = project
            .find_related(proposal::Entity)
            .filter(proposal::Column::DeletedAt.is_null())
            .all(self.db)
            .await?;
        Ok(Some((project, proposals)))
    }

    async fn get_with_patterns(
        &self,
        id: Uuid,
    ) -> AppResult<Option<(project::Model, Vec<pattern::Model>)>> {
        let Some(project) = self.find_live(id).await? else {
            return Ok(None);
        };
        let patterns = project
            .find_related(pattern::Entity)
            .filter(pattern::Column::DeletedAt.is_null())
            .all(self.db)
            .await?;
        Ok(Some((project, patterns)))
    }

    async fn get_project_statistics(&self, id: Uuid) -> AppResult<ProjectStatistics> {
        let key = stats_key(id);
        match self.cache.get_as::<ProjectStatistics>(&key).await {
            Ok(Some(stats)) => return Ok(stats),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "Project stats cache read failed"),
        }

        let tasks = count_by(
            task::Entity::find_active().filter(task::Column::ProjectId.eq(id)),
            task::Column::Status,
            self.db,
        )
        .await?;
        let proposals = count_by(
            proposal::Entity::find_active().filter(proposal::Column::ProjectId.eq(id)),
            proposal::Column::Status,
            self.db,
        )
        .await?;
        let pattern_count = pattern::Entity::find_active()
            .filter(pattern::Column::ProjectId.eq(id))
            .count(self.db)
            .await?;

        let bucket = |counts: &domain::CountBuckets, key: &str| counts.get(key).copied().unwrap_or(0);
        let total_tasks: u64 = tasks.values().sum();
        let completed_tasks = bucket(&tasks, TaskStatus::Completed.as_str());

        let stats = ProjectStatistics {
            project_id: id,
            total_tasks,
            pending_tasks: bucket(&tasks, TaskStatus::Pending.as_str()),
            in_progress_tasks: bucket(&tasks, TaskStatus::InProgress.as_str()),
            completed_tasks,
            total_proposals: proposals.values().sum(),
            pending_proposals: bucket(&proposals, ProposalStatus::Pending.as_str()),
            approved_proposals: bucket(&proposals, ProposalStatus::Approved.as_str()),
            rejected_proposals: bucket(&proposals, ProposalStatus::Rejected.as_str()),
            pattern_count,
            completion_rate: percentage(completed_tasks, total_tasks),
        };

        let ttl = Some(Duration::from_secs(PROJECT_STATS_CACHE_TTL_SECONDS));
        if let Err(e) = self.cache.set_as(&key, &stats, ttl).await {
            tracing::warn!(key = %key, error = %e, "Project stats cache write failed");
        }
        Ok(stats)
    }

    async fn get_active_projects(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        self.get_by_status(ProjectStatus::Active, pagination).await
    }

    async fn get_recent_projects(&self, limit: u64) -> AppResult<Vec<project::Model>> {
        let projects = project::Entity::find_active()
            .order_by_desc(project::Column::CreatedAt)
            .limit(clamp_limit(limit))
            .all(self.db)
            .await?;
        Ok(projects)
    }

    async fn update_progress(&self, id: Uuid, progress: i32) -> AppResult<()> {
        if !is_valid_progress(progress) {
            return Err(AppError::validation("progress must be between 0 and 100"));
        }

        let result = project::Entity::update_many()
            .col_expr(project::Column::Progress, Expr::value(progress))
            .col_expr(project::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(project::Column::Id.eq(id))
            .filter(project::Column::DeletedAt.is_null())
            .exec(self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }

        let key = stats_key(id);
        if let Err(e) = self.cache.delete(&key).await {
            tracing::warn!(key = %key, error = %e, "Project stats invalidation failed");
        }
        Ok(())
    }

    async fn get_overdue_projects(&self) -> AppResult<Vec<project::Model>> {
        let projects = project::Entity::find_active()
            .filter(project::Column::EndDate.lt(Utc::now()))
            .filter(project::Column::Status.is_not_in([
                ProjectStatus::Completed.as_str(),
                ProjectStatus::Cancelled.as_str(),
            ]))
            .order_by_asc(project::Column::EndDate)
            .all(self.db)
            .await?;
        Ok(projects)
    }

    async fn get_projects_by_date_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        self.page_where(date_range(project::Column::CreatedAt, from, to), pagination)
            .await
    }

    async fn get_projects_by_tags(
        &self,
        tags: &[String],
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        self.page_where(
            contains_all::<project::Entity, _>(project::Column::Tags, tags),
            pagination,
        )
        .await
    }

    async fn search_projects(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<project::Model>> {
        let condition = search_condition::<project::Entity>(
            query,
            &[
                project::Column::Name,
                project::Column::Description,
                project::Column::Tags,
            ],
        );
        let pagination = pagination.clone().with_default_sort("name", SortOrder::Asc);
        self.page_where(condition, &pagination).await
    }

    async fn get_projects_with_task_counts(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<ProjectWithTaskCount>> {
        let page = fetch_page(project::Entity::find_active(), self.db, pagination).await?;
        if page.data.is_empty() {
            return Ok(page.map(|project| ProjectWithTaskCount {
                project,
                task_count: 0,
            }));
        }

        let ids: Vec<Uuid> = page.data.iter().map(|project| project.id).collect();
        let counts: HashMap<Uuid, u64> = task::Entity::find_active()
            .select_only()
            .column(task::Column::ProjectId)
            .column_as(Expr::col((task::Entity, task::Column::Id)).count(), "count")
            .filter(task::Column::ProjectId.is_in(ids))
            .group_by(task::Column::ProjectId)
            .into_model::<ProjectTaskCount>()
            .all(self.db)
            .await?
            .into_iter()
            .filter_map(|row| row.project_id.map(|id| (id, row.count.max(0) as u64)))
            .collect();

        Ok(page.map(|project| ProjectWithTaskCount {
            task_count: counts.get(&project.id).copied().unwrap_or(0),
            project,
        }))
    }
}
