//! Proposal repository: review workflow and proposal statistics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, IntoCondition, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

use super::base::impl_base_repository;
use super::entities::{proposal, RecordEntity};
use super::query::{
    clamp_limit, count_by, date_range, fetch_page, numeric_range, search_condition, update_live,
};
use crate::types::{Filter, Paginated, Pagination};
use common::{AppError, AppResult};
use domain::{Priority, ProposalStatistics, ProposalStatus};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn get_by_submitter(
        &self,
        submitter_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_by_status(
        &self,
        status: ProposalStatus,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_by_category(
        &self,
        category: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_by_priority(
        &self,
        priority: Priority,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_by_project(
        &self,
        project_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_by_reviewer(
        &self,
        reviewer_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_pending_proposals(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_approved_proposals(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_rejected_proposals(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_under_review_proposals(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn get_proposals_by_date_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    async fn approve_proposal(&self, id: Uuid, reviewer_id: Uuid, notes: String) -> AppResult<()>;

    async fn reject_proposal(&self, id: Uuid, reviewer_id: Uuid, notes: String) -> AppResult<()>;

    /// Claim a proposal for review; `reviewed_at` stays unset until a decision
    async fn set_under_review(&self, id: Uuid, reviewer_id: Uuid) -> AppResult<()>;

    async fn get_proposal_statistics(&self, filter: &Filter) -> AppResult<ProposalStatistics>;

    async fn get_recent_proposals(&self, limit: u64) -> AppResult<Vec<proposal::Model>>;

    async fn search_proposals(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;

    /// Proposals whose estimated effort (hours) lies within the inclusive bounds
    async fn get_proposals_by_effort_range(
        &self,
        min_hours: Option<i32>,
        max_hours: Option<i32>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>>;
}

pub struct ProposalStore<'c, C = DatabaseConnection> {
    db: &'c C,
}

impl<'c, C> ProposalStore<'c, C>
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
    ) -> AppResult<Paginated<proposal::Model>> {
        fetch_page(
            proposal::Entity::find_active().filter(condition),
            self.db,
            pagination,
        )
        .await
    }

    async fn decide(
        &self,
        id: Uuid,
        status: ProposalStatus,
        reviewer_id: Uuid,
        notes: Option<String>,
    ) -> AppResult<()> {
        update_live::<proposal::Entity, _>(self.db, id, review_columns(status, reviewer_id, notes))
            .await?;
        tracing::info!(proposal_id = %id, reviewer_id = %reviewer_id, status = %status, "Proposal reviewed");
        Ok(())
    }
}

impl_base_repository!(ProposalStore, proposal::Entity);

/// Column updates for a review step; only decisions carry notes and a timestamp
fn review_columns(
    status: ProposalStatus,
    reviewer_id: Uuid,
    notes: Option<String>,
) -> Vec<(proposal::Column, SimpleExpr)> {
    let mut columns = vec![
        (proposal::Column::Status, Expr::value(status.as_str())),
        (proposal::Column::ReviewedBy, Expr::value(Some(reviewer_id))),
    ];
    if let Some(notes) = notes {
        columns.push((proposal::Column::ReviewedAt, Expr::value(Some(Utc::now()))));
        columns.push((proposal::Column::ReviewNotes, Expr::value(notes)));
    }
    columns
}

#[async_trait]
impl<'c, C> ProposalRepository for ProposalStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn get_by_submitter(
        &self,
        submitter_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.page_where(proposal::Column::SubmittedBy.eq(submitter_id), pagination)
            .await
    }

    async fn get_by_status(
        &self,
        status: ProposalStatus,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.page_where(proposal::Column::Status.eq(status.as_str()), pagination)
            .await
    }

    async fn get_by_category(
        &self,
        category: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.page_where(proposal::Column::Category.eq(category), pagination)
            .await
    }

    async fn get_by_priority(
        &self,
        priority: Priority,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.page_where(proposal::Column::Priority.eq(priority.as_str()), pagination)
            .await
    }

    async fn get_by_project(
        &self,
        project_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.page_where(proposal::Column::ProjectId.eq(project_id), pagination)
            .await
    }

    async fn get_by_reviewer(
        &self,
        reviewer_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.page_where(proposal::Column::ReviewedBy.eq(reviewer_id), pagination)
            .await
    }

    async fn get_pending_proposals(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.get_by_status(ProposalStatus::Pending, pagination).await
    }

    async fn get_approved_proposals(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.get_by_status(ProposalStatus::Approved, pagination).await
    }

    async fn get_rejected_proposals(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.get_by_status(ProposalStatus::Rejected, pagination).await
    }

    async fn get_under_review_proposals(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.get_by_status(ProposalStatus::UnderReview, pagination)
            .await
    }

    async fn get_proposals_by_date_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        self.page_where(date_range(proposal::Column::CreatedAt, from, to), pagination)
            .await
    }

    async fn approve_proposal(&self, id: Uuid, reviewer_id: Uuid, notes: String) -> AppResult<()> {
        self.decide(id, ProposalStatus::Approved, reviewer_id, Some(notes))
            .await
    }

    async fn reject_proposal(&self, id: Uuid, reviewer_id: Uuid, notes: String) -> AppResult<()> {
        self.decide(id, ProposalStatus::Rejected, reviewer_id, Some(notes))
            .await
    }

    async fn set_under_review(&self, id: Uuid, reviewer_id: Uuid) -> AppResult<()> {
        self.decide(id, ProposalStatus::UnderReview, reviewer_id, None)
            .await
    }

    async fn get_proposal_statistics(&self, filter: &Filter) -> AppResult<ProposalStatistics> {
        let condition = filter.condition::<proposal::Entity>()?;
        let select = || proposal::Entity::find_active().filter(condition.clone());

        Ok(ProposalStatistics {
            total: select().count(self.db).await?,
            by_status: count_by(select(), proposal::Column::Status, self.db).await?,
            by_category: count_by(select(), proposal::Column::Category, self.db).await?,
            by_priority: count_by(select(), proposal::Column::Priority, self.db).await?,
        })
    }

    async fn get_recent_proposals(&self, limit: u64) -> AppResult<Vec<proposal::Model>> {
        let proposals = proposal::Entity::find_active()
            .order_by_desc(proposal::Column::CreatedAt)
            .limit(clamp_limit(limit))
            .all(self.db)
            .await?;
        Ok(proposals)
    }

    async fn search_proposals(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        let condition = search_condition::<proposal::Entity>(
            query,
            &[
                proposal::Column::Title,
                proposal::Column::Description,
                proposal::Column::Category,
                proposal::Column::ExpectedOutcome,
                proposal::Column::Justification,
            ],
        );
        self.page_where(condition, pagination).await
    }

    async fn get_proposals_by_effort_range(
        &self,
        min_hours: Option<i32>,
        max_hours: Option<i32>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<proposal::Model>> {
        if let (Some(min), Some(max)) = (min_hours, max_hours) {
            if min > max {
                return Err(AppError::validation("minimum effort exceeds maximum"));
            }
        }
        self.page_where(
            numeric_range(proposal::Column::EstimatedEffort, min_hours, max_hours),
            pagination,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, QueryTrait, Value};
    use std::collections::BTreeMap;

    fn render(columns: Vec<(proposal::Column, SimpleExpr)>) -> String {
        let mut update = proposal::Entity::update_many();
        for (column, value) in columns {
            update = update.col_expr(column, value);
        }
        update.build(DatabaseBackend::Postgres).to_string()
    }

    #[test]
    fn decisions_record_notes_and_time() {
        let sql = render(review_columns(
            ProposalStatus::Approved,
            Uuid::nil(),
            Some("ship it".into()),
        ));
        assert!(sql.contains("\"status\" = 'approved'"));
        assert!(sql.contains("\"reviewed_by\" = '00000000-0000-0000-0000-000000000000'"));
        assert!(sql.contains("\"review_notes\" = 'ship it'"));
        assert!(sql.contains("\"reviewed_at\" ="));
    }

    #[test]
    fn claiming_for_review_leaves_decision_fields() {
        let sql = render(review_columns(ProposalStatus::UnderReview, Uuid::nil(), None));
        assert!(sql.contains("'under_review'"));
        assert!(!sql.contains("reviewed_at"));
        assert!(!sql.contains("review_notes"));
    }

    #[tokio::test]
    async fn rejecting_a_missing_proposal_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let repo = ProposalStore::new(&db);

        let result = repo
            .reject_proposal(Uuid::new_v4(), Uuid::new_v4(), "out of scope".into())
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn statistics_break_down_by_status_category_and_priority() {
        let bucket = |key: &str, count: i64| -> BTreeMap<&'static str, Value> {
            BTreeMap::from([("key", key.into()), ("count", count.into())])
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([("num_items", Value::from(5i64))])]])
            .append_query_results([
                vec![bucket("pending", 3), bucket("approved", 2)],
                vec![bucket("tooling", 5)],
                vec![bucket("medium", 4), bucket("high", 1)],
            ])
            .into_connection();
        let repo = ProposalStore::new(&db);

        let stats = repo.get_proposal_statistics(&Filter::new()).await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.by_status.get("approved"), Some(&2));
        assert_eq!(stats.by_category.get("tooling"), Some(&5));
        assert_eq!(stats.by_priority.len(), 2);
    }

    #[tokio::test]
    async fn unknown_filter_key_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = ProposalStore::new(&db);

        let filter = Filter::new().eq("status; DROP TABLE proposals", "x");
        assert!(matches!(
            repo.get_proposal_statistics(&filter).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn effort_bounds_must_be_ordered() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = ProposalStore::new(&db);

        let result = repo
            .get_proposals_by_effort_range(Some(40), Some(8), &Pagination::default())
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
