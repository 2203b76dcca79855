//! Pattern repository: detection metrics, similarity and trends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, IntoCondition};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, FromQueryResult, ModelTrait,
    Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use super::base::impl_base_repository;
use super::entities::{insight, pattern, RecordEntity};
use super::query::{
    aggregate, clamp_limit, count_by, fetch_page, json_contains, numeric_range, search_condition,
    trend_bucket, update_live,
};
use crate::types::{Filter, Paginated, Pagination, SortOrder};
use common::{AppError, AppResult};
use domain::{
    is_valid_confidence, PatternStatistics, PatternTrendPoint, TrendPeriod,
    DEFAULT_SIMILARITY_THRESHOLD, MAX_SIMILAR_PATTERNS,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait PatternRepository: Send + Sync {
    async fn get_by_type(
        &self,
        pattern_type: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;

    async fn get_by_project(
        &self,
        project_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;

    async fn get_by_confidence_range(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;

    async fn get_by_significance_range(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;

    async fn get_by_frequency_range(
        &self,
        min: Option<i32>,
        max: Option<i32>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;

    /// Most recently observed patterns
    async fn get_recent_patterns(&self, limit: u64) -> AppResult<Vec<pattern::Model>>;

    async fn get_high_confidence_patterns(
        &self,
        threshold: f64,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;

    async fn get_frequent_patterns(
        &self,
        threshold: i32,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;

    async fn get_pattern_with_insights(
        &self,
        id: Uuid,
    ) -> AppResult<Option<(pattern::Model, Vec<insight::Model>)>>;

    async fn update_confidence(&self, id: Uuid, confidence: f64) -> AppResult<()>;

    async fn update_frequency(&self, id: Uuid, frequency: i32) -> AppResult<()>;

    async fn update_significance(&self, id: Uuid, significance: f64) -> AppResult<()>;

    async fn update_last_seen(&self, id: Uuid) -> AppResult<()>;

    async fn get_pattern_statistics(&self, filter: &Filter) -> AppResult<PatternStatistics>;

    /// Creation count and mean confidence per period, oldest bucket first
    async fn get_pattern_trends(&self, period: TrendPeriod) -> AppResult<Vec<PatternTrendPoint>>;

    async fn search_patterns(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;

    /// Patterns of the same type whose confidence is within `threshold`
    /// (default 0.1) of the reference pattern
    async fn get_similar_patterns(
        &self,
        id: Uuid,
        threshold: Option<f64>,
    ) -> AppResult<Vec<pattern::Model>>;

    /// Patterns whose context contains every key/value pair given
    async fn get_patterns_by_context(
        &self,
        context: &serde_json::Map<String, serde_json::Value>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>>;
}

pub struct PatternStore<'c, C = DatabaseConnection> {
    db: &'c C,
}

impl<'c, C> PatternStore<'c, C>
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
    ) -> AppResult<Paginated<pattern::Model>> {
        fetch_page(
            pattern::Entity::find_active().filter(condition),
            self.db,
            pagination,
        )
        .await
    }

    async fn find_live(&self, id: Uuid) -> AppResult<Option<pattern::Model>> {
        let pattern = pattern::Entity::find_active()
            .filter(pattern::Column::Id.eq(id))
            .one(self.db)
            .await?;
        Ok(pattern)
    }
}

impl_base_repository!(PatternStore, pattern::Entity);

fn ordered<V: PartialOrd>(min: Option<V>, max: Option<V>, what: &str) -> AppResult<()> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(AppError::validation(format!(
            "minimum {} exceeds maximum",
            what
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, FromQueryResult)]
struct TrendRow {
    bucket: DateTime<Utc>,
    count: i64,
    avg_confidence: Option<f64>,
}

#[async_trait]
impl<'c, C> PatternRepository for PatternStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn get_by_type(
        &self,
        pattern_type: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        self.page_where(pattern::Column::PatternType.eq(pattern_type), pagination)
            .await
    }

    async fn get_by_project(
        &self,
        project_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        self.page_where(pattern::Column::ProjectId.eq(project_id), pagination)
            .await
    }

    async fn get_by_confidence_range(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        ordered(min, max, "confidence")?;
        self.page_where(numeric_range(pattern::Column::Confidence, min, max), pagination)
            .await
    }

    async fn get_by_significance_range(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        ordered(min, max, "significance")?;
        self.page_where(numeric_range(pattern::Column::Significance, min, max), pagination)
            .await
    }

    async fn get_by_frequency_range(
        &self,
        min: Option<i32>,
        max: Option<i32>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        ordered(min, max, "frequency")?;
        self.page_where(numeric_range(pattern::Column::Frequency, min, max), pagination)
            .await
    }

    async fn get_recent_patterns(&self, limit: u64) -> AppResult<Vec<pattern::Model>> {
        let patterns = pattern::Entity::find_active()
            .order_by_desc(pattern::Column::LastSeen)
            .limit(clamp_limit(limit))
            .all(self.db)
            .await?;
        Ok(patterns)
    }

    async fn get_high_confidence_patterns(
        &self,
        threshold: f64,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        let pagination = pagination
            .clone()
            .with_default_sort("confidence", SortOrder::Desc);
        self.page_where(pattern::Column::Confidence.gte(threshold), &pagination)
            .await
    }

    async fn get_frequent_patterns(
        &self,
        threshold: i32,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        let pagination = pagination
            .clone()
            .with_default_sort("frequency", SortOrder::Desc);
        self.page_where(pattern::Column::Frequency.gte(threshold), &pagination)
            .await
    }

    async fn get_pattern_with_insights(
        &self,
        id: Uuid,
    ) -> AppResult<Option<(pattern::Model, Vec<insight::Model>)>> {
        let Some(pattern) = self.find_live(id).await? else {
            return Ok(None);
        };
        let insights = pattern
            .find_related(insight::Entity)
            .filter(insight::Column::DeletedAt.is_null())
            .order_by_desc(insight::Column::CreatedAt)
            .all(self.db)
            .await?;
        Ok(Some((pattern, insights)))
    }

    async fn update_confidence(&self, id: Uuid, confidence: f64) -> AppResult<()> {
        if !is_valid_confidence(confidence) {
            return Err(AppError::validation("confidence must be between 0 and 1"));
        }
        update_live::<pattern::Entity, _>(
            self.db,
            id,
            vec![(pattern::Column::Confidence, Expr::value(confidence))],
        )
        .await
    }

    async fn update_frequency(&self, id: Uuid, frequency: i32) -> AppResult<()> {
        if frequency < 0 {
            return Err(AppError::validation("frequency cannot be negative"));
        }
        update_live::<pattern::Entity, _>(
            self.db,
            id,
            vec![(pattern::Column::Frequency, Expr::value(frequency))],
        )
        .await
    }

    async fn update_significance(&self, id: Uuid, significance: f64) -> AppResult<()> {
        if !significance.is_finite() || significance < 0.0 {
            return Err(AppError::validation("significance cannot be negative"));
        }
        update_live::<pattern::Entity, _>(
            self.db,
            id,
            vec![(pattern::Column::Significance, Expr::value(significance))],
        )
        .await
    }

    async fn update_last_seen(&self, id: Uuid) -> AppResult<()> {
        update_live::<pattern::Entity, _>(
            self.db,
            id,
            vec![(pattern::Column::LastSeen, Expr::value(Utc::now()))],
        )
        .await
    }

    async fn get_pattern_statistics(&self, filter: &Filter) -> AppResult<PatternStatistics> {
        let condition = filter.condition::<pattern::Entity>()?;
        let select = || pattern::Entity::find_active().filter(condition.clone());

        Ok(PatternStatistics {
            total: select().count(self.db).await?,
            by_type: count_by(select(), pattern::Column::PatternType, self.db).await?,
            avg_confidence: aggregate(select(), "AVG(confidence)", self.db).await?,
            avg_significance: aggregate(select(), "AVG(significance)", self.db).await?,
            avg_frequency: aggregate(select(), "AVG(frequency)", self.db).await?,
        })
    }

    async fn get_pattern_trends(&self, period: TrendPeriod) -> AppResult<Vec<PatternTrendPoint>> {
        let bucket = trend_bucket(period, "created_at");
        let rows = pattern::Entity::find_active()
            .select_only()
            .column_as(bucket.clone(), "bucket")
            .column_as(Expr::cust("COUNT(*)"), "count")
            .column_as(Expr::cust("AVG(confidence)::float8"), "avg_confidence")
            .group_by(bucket.clone())
            .order_by(bucket, Order::Asc)
            .into_model::<TrendRow>()
            .all(self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| PatternTrendPoint {
                bucket: row.bucket,
                count: row.count.max(0) as u64,
                avg_confidence: row.avg_confidence.unwrap_or(0.0),
            })
            .collect())
    }

    async fn search_patterns(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        let condition = search_condition::<pattern::Entity>(
            query,
            &[
                pattern::Column::Name,
                pattern::Column::PatternType,
                pattern::Column::Description,
            ],
        );
        let pagination = pagination
            .clone()
            .with_default_sort("confidence", SortOrder::Desc);
        self.page_where(condition, &pagination).await
    }

    async fn get_similar_patterns(
        &self,
        id: Uuid,
        threshold: Option<f64>,
    ) -> AppResult<Vec<pattern::Model>> {
        let threshold = threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(AppError::validation("similarity threshold cannot be negative"));
        }

        let reference = self.find_live(id).await?.ok_or(AppError::NotFound)?;
        let patterns = pattern::Entity::find_active()
            .filter(pattern::Column::Id.ne(id))
            .filter(pattern::Column::PatternType.eq(reference.pattern_type.as_str()))
            .filter(pattern::Column::Confidence.between(
                reference.confidence - threshold,
                reference.confidence + threshold,
            ))
            .order_by_desc(pattern::Column::Confidence)
            .limit(MAX_SIMILAR_PATTERNS)
            .all(self.db)
            .await?;
        Ok(patterns)
    }

    async fn get_patterns_by_context(
        &self,
        context: &serde_json::Map<String, serde_json::Value>,
        pagination: &Pagination,
    ) -> AppResult<Paginated<pattern::Model>> {
        self.page_where(
            json_contains::<pattern::Entity>(
                pattern::Column::Context,
                serde_json::Value::Object(context.clone()),
            ),
            pagination,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn pattern_row(pattern_type: &str, confidence: f64) -> pattern::Model {
        let now = Utc::now();
        pattern::Model {
            id: Uuid::new_v4(),
            name: "weekend deploys".into(),
            pattern_type: pattern_type.into(),
            description: String::new(),
            confidence,
            frequency: 3,
            significance: 0.4,
            data: None,
            context: None,
            last_seen: now,
            project_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn confidence_must_be_a_probability() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = PatternStore::new(&db);

        assert!(matches!(
            repo.update_confidence(Uuid::new_v4(), 1.2).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            repo.update_confidence(Uuid::new_v4(), -0.1).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn similar_patterns_share_type_and_confidence_band() {
        let reference = pattern_row("user_behavior", 0.5);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![reference.clone()]])
            .append_query_results([vec![pattern_row("user_behavior", 0.55)]])
            .into_connection();
        let repo = PatternStore::new(&db);

        let similar = repo.get_similar_patterns(reference.id, None).await.unwrap();
        assert_eq!(similar.len(), 1);

        let log = db.into_transaction_log();
        let sql = format!("{:?}", log[1]);
        assert!(sql.contains("\\\"id\\\" <> $"));
        assert!(sql.contains("BETWEEN"));
        assert!(sql.contains("LIMIT"));
    }

    #[tokio::test]
    async fn similar_patterns_of_missing_reference_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<pattern::Model>::new()])
            .into_connection();
        let repo = PatternStore::new(&db);

        assert!(matches!(
            repo.get_similar_patterns(Uuid::new_v4(), Some(0.2)).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn negative_similarity_threshold_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = PatternStore::new(&db);

        assert!(matches!(
            repo.get_similar_patterns(Uuid::new_v4(), Some(-0.5)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn statistics_average_the_metrics() {
        let scalar = |value: f64| BTreeMap::from([("value", Value::from(Some(value)))]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([("num_items", Value::from(4i64))])]])
            .append_query_results([vec![
                BTreeMap::from([("key", Value::from("user_behavior")), ("count", Value::from(3i64))]),
                BTreeMap::from([("key", Value::from("system_usage")), ("count", Value::from(1i64))]),
            ]])
            .append_query_results([[scalar(0.7)], [scalar(0.25)], [scalar(6.5)]])
            .into_connection();
        let repo = PatternStore::new(&db);

        let stats = repo.get_pattern_statistics(&Filter::new()).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_type.get("user_behavior"), Some(&3));
        assert_eq!(stats.avg_confidence, 0.7);
        assert_eq!(stats.avg_significance, 0.25);
        assert_eq!(stats.avg_frequency, 6.5);
    }

    #[tokio::test]
    async fn trends_carry_count_and_confidence() {
        let day = Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([
                ("bucket", Value::from(day)),
                ("count", Value::from(2i64)),
                ("avg_confidence", Value::from(Some(0.6f64))),
            ])]])
            .into_connection();
        let repo = PatternStore::new(&db);

        let trends = repo.get_pattern_trends(TrendPeriod::Monthly).await.unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].count, 2);
        assert_eq!(trends[0].avg_confidence, 0.6);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("DATE_TRUNC('month', created_at)"));
    }
}
