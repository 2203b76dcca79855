//! Query building helpers shared by the repositories.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, FromQueryResult, IdenStatic,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Value,
};
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::{CountBuckets, TrendPeriod};

use super::entities::RecordEntity;
use crate::config::{DEFAULT_LIST_LIMIT, MAX_PAGE_SIZE};
use crate::types::{resolve_column, Paginated, Pagination};

/// Case-insensitive `%query%` match OR'd across `columns`.
///
/// Non-text columns are cast to text first, so JSON columns can be searched
/// too. An empty query yields an empty condition that matches every row.
pub fn search_condition<E: EntityTrait>(query: &str, columns: &[E::Column]) -> Condition {
    let query = query.trim();
    if query.is_empty() {
        return Condition::all();
    }

    let pattern = format!("%{}%", query.to_lowercase());
    columns.iter().fold(Condition::any(), |condition, column| {
        condition.add(text_like::<E>(*column, &pattern))
    })
}

/// Every `item` must appear somewhere in `column` (case-insensitive)
pub fn contains_all<E, S>(column: E::Column, items: &[S]) -> Condition
where
    E: EntityTrait,
    S: AsRef<str>,
{
    items
        .iter()
        .map(|item| item.as_ref().trim())
        .filter(|item| !item.is_empty())
        .fold(Condition::all(), |condition, item| {
            condition.add(text_like::<E>(column, &format!("%{}%", item.to_lowercase())))
        })
}

/// JSONB containment: `column @> value`
pub fn json_contains<E: EntityTrait>(column: E::Column, value: serde_json::Value) -> SimpleExpr {
    Expr::cust_with_values(
        format!(
            "\"{}\".\"{}\" @> $1::jsonb",
            E::default().table_name(),
            column.as_str()
        ),
        [value],
    )
}

fn text_like<E: EntityTrait>(column: E::Column, pattern: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Func::cast_as(
        Expr::col((E::default(), column)),
        Alias::new("text"),
    )))
    .like(pattern)
}

/// `DATE_TRUNC(unit, column)` for grouping rows into trend buckets
pub fn trend_bucket(period: TrendPeriod, column: &str) -> SimpleExpr {
    Expr::cust(format!("DATE_TRUNC('{}', {})", period.trunc_unit(), column))
}

/// Inclusive bounds on a timestamp column; missing bounds are open
pub fn date_range<C: ColumnTrait>(
    column: C,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Condition {
    numeric_range(column, from, to)
}

/// Midnight UTC of the day `now` falls in
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// `[start, start + 1 day)` on a timestamp column
pub fn day_range<C: ColumnTrait>(column: C, start: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(column.gte(start))
        .add(column.lt(start + chrono::Duration::days(1)))
}

/// Inclusive bounds on an ordered column; missing bounds are open
pub fn numeric_range<C, V>(column: C, min: Option<V>, max: Option<V>) -> Condition
where
    C: ColumnTrait,
    V: Into<Value>,
{
    let mut condition = Condition::all();
    if let Some(min) = min {
        condition = condition.add(column.gte(min));
    }
    if let Some(max) = max {
        condition = condition.add(column.lte(max));
    }
    condition
}

/// Join a prefix and key parts with `:`
pub fn cache_key<I, S>(prefix: &str, parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Display,
{
    parts.into_iter().fold(prefix.to_string(), |mut key, part| {
        key.push(':');
        key.push_str(&part.to_string());
        key
    })
}

/// Limit for "top N" and "recent N" queries
pub fn clamp_limit(limit: u64) -> u64 {
    match limit {
        0 => DEFAULT_LIST_LIMIT,
        n => n.min(MAX_PAGE_SIZE),
    }
}

/// Order `select` by the requested column and fetch one page of it.
///
/// The sort column is resolved against the entity, so an unknown name is
/// rejected before any SQL runs.
pub async fn fetch_page<E, C>(
    select: Select<E>,
    conn: &C,
    pagination: &Pagination,
) -> AppResult<Paginated<E::Model>>
where
    E: EntityTrait,
    E::Column: FromStr,
    E::Model: Sync,
    C: ConnectionTrait,
{
    let column = resolve_column::<E>(pagination.sort_column())?;
    let page_size = pagination.limit();

    let paginator = select
        .order_by(column, pagination.sort_order().into())
        .paginate(conn, page_size);
    let total = paginator.num_items().await?;
    let data = paginator.fetch_page(pagination.page() - 1).await?;

    Ok(Paginated::new(data, pagination.page(), page_size, total))
}

#[derive(Debug, FromQueryResult)]
struct GroupCount {
    key: Option<String>,
    count: i64,
}

/// `UPDATE ... SET columns` on one live row, refreshing `updated_at`.
///
/// Returns `NotFound` when no live row has `id`.
pub async fn update_live<E, C>(
    conn: &C,
    id: Uuid,
    columns: Vec<(E::Column, SimpleExpr)>,
) -> AppResult<()>
where
    E: RecordEntity,
    C: ConnectionTrait,
{
    let mut update = E::update_many()
        .col_expr(E::updated_at_column(), Expr::value(Utc::now()))
        .filter(E::id_column().eq(id))
        .filter(E::deleted_at_column().is_null());
    for (column, value) in columns {
        update = update.col_expr(column, value);
    }

    let result = update.exec(conn).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

#[derive(Debug, FromQueryResult)]
struct Aggregate {
    value: Option<f64>,
}

/// Evaluate one aggregate SQL expression over `select`; NULL becomes 0
pub async fn aggregate<E, C>(select: Select<E>, expression: &str, conn: &C) -> AppResult<f64>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let row = select
        .select_only()
        .column_as(Expr::cust(format!("({})::float8", expression)), "value")
        .into_model::<Aggregate>()
        .one(conn)
        .await?;
    Ok(row.and_then(|row| row.value).unwrap_or(0.0))
}

/// `SELECT column, COUNT(*) ... GROUP BY column` over `select`
pub async fn count_by<E, C>(select: Select<E>, column: E::Column, conn: &C) -> AppResult<CountBuckets>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let rows = select
        .select_only()
        .column_as(column, "key")
        .column_as(Expr::col((E::default(), column)).count(), "count")
        .group_by(column)
        .into_model::<GroupCount>()
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.key.unwrap_or_default(), row.count.max(0) as u64))
        .collect())
}

/// Sum of the buckets named in `keys`
pub fn bucket_sum(buckets: &CountBuckets, keys: &[&str]) -> u64 {
    keys.iter().filter_map(|key| buckets.get(*key)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::entities::task;
    use crate::types::SortOrder;
    use sea_orm::{DatabaseBackend, MockDatabase, QueryFilter, QueryTrait};

    #[test]
    fn empty_search_matches_everything() {
        let sql = task::Entity::find()
            .filter(search_condition::<task::Entity>("   ", &[task::Column::Title]))
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(!sql.contains("LIKE"));
    }

    #[test]
    fn search_is_case_insensitive_across_columns() {
        let sql = task::Entity::find()
            .filter(search_condition::<task::Entity>(
                "Deploy",
                &[task::Column::Title, task::Column::Description],
            ))
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains("LOWER(CAST("));
        assert!(sql.contains("LIKE '%deploy%'"));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn contains_all_requires_every_item() {
        let sql = task::Entity::find()
            .filter(contains_all::<task::Entity, _>(task::Column::Result, &["api", "", "db"]))
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains("'%api%'"));
        assert!(sql.contains("'%db%'"));
        assert!(sql.contains(" AND "));
    }

    #[test]
    fn ranges_are_inclusive_and_open_ended() {
        let sql = task::Entity::find()
            .filter(numeric_range(task::Column::EstimatedTime, Some(30), None::<i32>))
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains("\"estimated_time\" >= 30"));
        assert!(!sql.contains("<="));
    }

    #[test]
    fn a_day_excludes_the_next_midnight() {
        let start = start_of_day(Utc::now());
        let sql = task::Entity::find()
            .filter(day_range(task::Column::CompletedAt, start))
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains("\"completed_at\" >= "));
        assert!(sql.contains("\"completed_at\" < "));
        assert!(!sql.contains("<="));
        assert_eq!(start_of_day(start + chrono::Duration::hours(23)), start);
    }

    #[test]
    fn trend_buckets_truncate_to_the_period() {
        let sql = task::Entity::find()
            .select_only()
            .column_as(trend_bucket(TrendPeriod::Weekly, "created_at"), "bucket")
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains("DATE_TRUNC('week', created_at) AS \"bucket\""));
    }

    #[test]
    fn cache_keys_are_colon_joined() {
        assert_eq!(cache_key("user", ["username", "alice"]), "user:username:alice");
        assert_eq!(cache_key("project", Vec::<String>::new()), "project");
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(0), 10);
        assert_eq!(clamp_limit(25), 25);
        assert_eq!(clamp_limit(1000), 100);
    }

    #[tokio::test]
    async fn unknown_sort_column_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let pagination = Pagination::new(1, 10).sorted_by("nope", SortOrder::Asc);

        let result = fetch_page(task::Entity::find(), &db, &pagination).await;
        assert!(matches!(result, Err(common::AppError::Validation(_))));
    }
}
