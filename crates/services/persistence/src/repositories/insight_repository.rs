//! Insight repository: implementation tracking, trends and effectiveness.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, IntoCondition};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, FromQueryResult, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use super::base::impl_base_repository;
use super::entities::{insight, pattern, RecordEntity};
use super::query::{
    aggregate, clamp_limit, contains_all, count_by, fetch_page, numeric_range, search_condition,
    trend_bucket, update_live,
};
use crate::types::{Filter, Paginated, Pagination, SortOrder};
use common::{AppError, AppResult};
use domain::{
    is_valid_confidence, percentage, InsightEffectiveness, InsightImpact, InsightStatistics,
    InsightTrendPoint, TrendPeriod,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait InsightRepository: Send + Sync {
    async fn get_by_type(
        &self,
        insight_type: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_by_impact(
        &self,
        impact: InsightImpact,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_by_pattern(
        &self,
        pattern_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_by_confidence_range(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_actionable_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_non_actionable_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_implemented_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_unimplemented_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    /// High and critical impact
    async fn get_high_impact_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_critical_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_recent_insights(&self, limit: u64) -> AppResult<Vec<insight::Model>>;

    async fn mark_as_implemented(&self, id: Uuid) -> AppResult<()>;

    async fn mark_as_unimplemented(&self, id: Uuid) -> AppResult<()>;

    async fn update_confidence(&self, id: Uuid, confidence: f64) -> AppResult<()>;

    async fn get_insight_statistics(&self, filter: &Filter) -> AppResult<InsightStatistics>;

    /// Created and implemented counts per period, oldest bucket first
    async fn get_insight_trends(&self, period: TrendPeriod) -> AppResult<Vec<InsightTrendPoint>>;

    async fn search_insights(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    /// Insights whose action items mention every entry of `items`
    async fn get_insights_by_action_items(
        &self,
        items: &[String],
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>>;

    async fn get_insight_effectiveness(&self, id: Uuid) -> AppResult<InsightEffectiveness>;
}

pub struct InsightStore<'c, C = DatabaseConnection> {
    db: &'c C,
}

impl<'c, C> InsightStore<'c, C>
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
    ) -> AppResult<Paginated<insight::Model>> {
        fetch_page(
            insight::Entity::find_active().filter(condition),
            self.db,
            pagination,
        )
        .await
    }
}

impl_base_repository!(InsightStore, insight::Entity);

#[derive(Debug, FromQueryResult)]
struct TrendRow {
    bucket: DateTime<Utc>,
    created: i64,
    implemented: i64,
}

#[async_trait]
impl<'c, C> InsightRepository for InsightStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn get_by_type(
        &self,
        insight_type: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(insight::Column::InsightType.eq(insight_type), pagination)
            .await
    }

    async fn get_by_impact(
        &self,
        impact: InsightImpact,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(insight::Column::Impact.eq(impact.as_str()), pagination)
            .await
    }

    async fn get_by_pattern(
        &self,
        pattern_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(insight::Column::PatternId.eq(pattern_id), pagination)
            .await
    }

    async fn get_by_confidence_range(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(AppError::validation("minimum confidence exceeds maximum"));
            }
        }
        self.page_where(numeric_range(insight::Column::Confidence, min, max), pagination)
            .await
    }

    async fn get_actionable_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(insight::Column::IsActionable.eq(true), pagination)
            .await
    }

    async fn get_non_actionable_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(insight::Column::IsActionable.eq(false), pagination)
            .await
    }

    async fn get_implemented_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(insight::Column::IsImplemented.eq(true), pagination)
            .await
    }

    async fn get_unimplemented_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(insight::Column::IsImplemented.eq(false), pagination)
            .await
    }

    async fn get_high_impact_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(
            insight::Column::Impact.is_in([
                InsightImpact::High.as_str(),
                InsightImpact::Critical.as_str(),
            ]),
            pagination,
        )
        .await
    }

    async fn get_critical_insights(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.get_by_impact(InsightImpact::Critical, pagination).await
    }

    async fn get_recent_insights(&self, limit: u64) -> AppResult<Vec<insight::Model>> {
        let insights = insight::Entity::find_active()
            .order_by_desc(insight::Column::CreatedAt)
            .limit(clamp_limit(limit))
            .all(self.db)
            .await?;
        Ok(insights)
    }

    async fn mark_as_implemented(&self, id: Uuid) -> AppResult<()> {
        update_live::<insight::Entity, _>(
            self.db,
            id,
            vec![
                (insight::Column::IsImplemented, Expr::value(true)),
                (insight::Column::ImplementedAt, Expr::value(Some(Utc::now()))),
            ],
        )
        .await?;
        tracing::info!(insight_id = %id, "Insight marked as implemented");
        Ok(())
    }

    async fn mark_as_unimplemented(&self, id: Uuid) -> AppResult<()> {
        update_live::<insight::Entity, _>(
            self.db,
            id,
            vec![
                (insight::Column::IsImplemented, Expr::value(false)),
                (insight::Column::ImplementedAt, Expr::value(None::<DateTime<Utc>>)),
            ],
        )
        .await
    }

    async fn update_confidence(&self, id: Uuid, confidence: f64) -> AppResult<()> {
        if !is_valid_confidence(confidence) {
            return Err(AppError::validation("confidence must be between 0 and 1"));
        }
        update_live::<insight::Entity, _>(
            self.db,
            id,
            vec![(insight::Column::Confidence, Expr::value(confidence))],
        )
        .await
    }

    async fn get_insight_statistics(&self, filter: &Filter) -> AppResult<InsightStatistics> {
        let condition = filter.condition::<insight::Entity>()?;
        let select = || insight::Entity::find_active().filter(condition.clone());

        let total = select().count(self.db).await?;
        let by_type = count_by(select(), insight::Column::InsightType, self.db).await?;
        let by_impact = count_by(select(), insight::Column::Impact, self.db).await?;
        let actionable = select()
            .filter(insight::Column::IsActionable.eq(true))
            .count(self.db)
            .await?;
        let implemented = select()
            .filter(insight::Column::IsImplemented.eq(true))
            .count(self.db)
            .await?;
        let avg_confidence = aggregate(select(), "AVG(confidence)", self.db).await?;

        Ok(InsightStatistics {
            total,
            by_type,
            by_impact,
            actionable,
            non_actionable: total.saturating_sub(actionable),
            implemented,
            not_implemented: total.saturating_sub(implemented),
            avg_confidence,
            implementation_rate: percentage(implemented, total),
        })
    }

    async fn get_insight_trends(&self, period: TrendPeriod) -> AppResult<Vec<InsightTrendPoint>> {
        let bucket = trend_bucket(period, "created_at");
        let rows = insight::Entity::find_active()
            .select_only()
            .column_as(bucket.clone(), "bucket")
            .column_as(Expr::cust("COUNT(*)"), "created")
            .column_as(
                Expr::cust("COUNT(*) FILTER (WHERE is_implemented)"),
                "implemented",
            )
            .group_by(bucket.clone())
            .order_by(bucket, Order::Asc)
            .into_model::<TrendRow>()
            .all(self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| InsightTrendPoint {
                bucket: row.bucket,
                created: row.created.max(0) as u64,
                implemented: row.implemented.max(0) as u64,
            })
            .collect())
    }

    async fn search_insights(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        let condition = search_condition::<insight::Entity>(
            query,
            &[
                insight::Column::Title,
                insight::Column::Description,
                insight::Column::InsightType,
            ],
        );
        let pagination = pagination
            .clone()
            .with_default_sort("confidence", SortOrder::Desc);
        self.page_where(condition, &pagination).await
    }

    async fn get_insights_by_action_items(
        &self,
        items: &[String],
        pagination: &Pagination,
    ) -> AppResult<Paginated<insight::Model>> {
        self.page_where(
            contains_all::<insight::Entity, _>(insight::Column::ActionItems, items),
            pagination,
        )
        .await
    }

    async fn get_insight_effectiveness(&self, id: Uuid) -> AppResult<InsightEffectiveness> {
        let insight = insight::Entity::find_active()
            .filter(insight::Column::Id.eq(id))
            .one(self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let pattern = match insight.pattern_id {
            Some(pattern_id) => {
                pattern::Entity::find_active()
                    .filter(pattern::Column::Id.eq(pattern_id))
                    .one(self.db)
                    .await?
            }
            None => None,
        };

        Ok(effectiveness(insight, pattern.as_ref()))
    }
}

fn effectiveness(insight: insight::Model, pattern: Option<&pattern::Model>) -> InsightEffectiveness {
    let time_to_implementation_seconds = match (insight.is_implemented, insight.implemented_at) {
        (true, Some(done)) => Some((done - insight.created_at).num_seconds().max(0)),
        _ => None,
    };

    InsightEffectiveness {
        id: insight.id,
        title: insight.title,
        insight_type: insight.insight_type,
        impact: insight.impact,
        confidence: insight.confidence,
        is_actionable: insight.is_actionable,
        is_implemented: insight.is_implemented,
        created_at: insight.created_at,
        time_to_implementation_seconds,
        pattern_confidence: pattern.map(|p| p.confidence),
        pattern_correlation: pattern.map(|p| insight.confidence * p.confidence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn insight_row(pattern_id: Option<Uuid>) -> insight::Model {
        let created = Utc::now() - Duration::hours(2);
        insight::Model {
            id: Uuid::new_v4(),
            title: "Cache project stats".into(),
            description: String::new(),
            insight_type: "optimization".into(),
            impact: "high".into(),
            confidence: 0.8,
            action_items: Some(serde_json::json!(["add cache", "measure"])),
            data: None,
            is_actionable: true,
            is_implemented: true,
            implemented_at: Some(created + Duration::hours(1)),
            pattern_id,
            created_at: created,
            updated_at: created,
            deleted_at: None,
        }
    }

    fn pattern_row(id: Uuid) -> pattern::Model {
        let now = Utc::now();
        pattern::Model {
            id,
            name: "slow dashboards".into(),
            pattern_type: "system_usage".into(),
            description: String::new(),
            confidence: 0.5,
            frequency: 12,
            significance: 0.9,
            data: None,
            context: None,
            last_seen: now,
            project_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn effectiveness_correlates_with_pattern_confidence() {
        let pattern_id = Uuid::new_v4();
        let report = effectiveness(insight_row(Some(pattern_id)), Some(&pattern_row(pattern_id)));

        assert_eq!(report.time_to_implementation_seconds, Some(3600));
        assert_eq!(report.pattern_confidence, Some(0.5));
        assert_eq!(report.pattern_correlation, Some(0.4));
    }

    #[test]
    fn unimplemented_insights_have_no_lead_time() {
        let mut insight = insight_row(None);
        insight.is_implemented = false;

        let report = effectiveness(insight, None);
        assert_eq!(report.time_to_implementation_seconds, None);
        assert_eq!(report.pattern_correlation, None);
    }

    #[tokio::test]
    async fn effectiveness_loads_the_source_pattern() {
        let pattern_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![insight_row(Some(pattern_id))]])
            .append_query_results([vec![pattern_row(pattern_id)]])
            .into_connection();
        let repo = InsightStore::new(&db);

        let report = repo.get_insight_effectiveness(Uuid::new_v4()).await.unwrap();
        assert_eq!(report.pattern_correlation, Some(0.4));
        assert_eq!(db.into_transaction_log().len(), 2);
    }

    #[tokio::test]
    async fn statistics_derive_rates_from_counts() {
        let count = |n: i64| BTreeMap::from([("num_items", Value::from(n))]);
        let bucket = |key: &str, n: i64| BTreeMap::from([("key", Value::from(key)), ("count", Value::from(n))]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count(4)]])
            .append_query_results([
                vec![bucket("optimization", 3), bucket("warning", 1)],
                vec![bucket("high", 4)],
            ])
            .append_query_results([[count(3)], [count(1)]])
            .append_query_results([[BTreeMap::from([("value", Value::from(Some(0.75f64)))])]])
            .into_connection();
        let repo = InsightStore::new(&db);

        let stats = repo.get_insight_statistics(&Filter::new()).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.actionable, 3);
        assert_eq!(stats.non_actionable, 1);
        assert_eq!(stats.implemented, 1);
        assert_eq!(stats.not_implemented, 3);
        assert_eq!(stats.implementation_rate, 25.0);
        assert_eq!(stats.avg_confidence, 0.75);
    }

    #[tokio::test]
    async fn trends_count_implemented_separately() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([
                ("bucket", Value::from(Utc::now())),
                ("created", Value::from(5i64)),
                ("implemented", Value::from(2i64)),
            ])]])
            .into_connection();
        let repo = InsightStore::new(&db);

        let trends = repo.get_insight_trends(TrendPeriod::Daily).await.unwrap();
        assert_eq!(trends[0].created, 5);
        assert_eq!(trends[0].implemented, 2);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FILTER (WHERE is_implemented)"));
    }
}
