//! Base repository traits following Interface Segregation Principle (ISP).
//!
//! These traits provide a foundation for all repositories with
//! common CRUD operations that can be composed as needed. They are generic
//! over the connection, so the same store works on the pool or inside a
//! transaction.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, IdenStatic, IntoActiveModel, Iterable,
    PaginatorTrait, QueryFilter,
};
use uuid::Uuid;

use common::{AppError, AppResult};

use super::entities::{stamp, RecordEntity};
use super::query::fetch_page;
use crate::config::BATCH_CHUNK_SIZE;
use crate::types::{Filter, Paginated, Pagination};

/// Access to the connection a repository runs its statements on
pub trait RepositoryConnection: Send + Sync {
    type Conn: ConnectionTrait + Send + Sync;

    fn conn(&self) -> &Self::Conn;
}

/// Read operations (Query) - Single Responsibility
#[async_trait]
pub trait ReadRepository<E>: RepositoryConnection
where
    E: RecordEntity,
    E::Model: Sync,
    E::Column: FromStr,
{
    /// Find a live record by id; soft-deleted rows are not returned
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<E::Model>> {
        E::find_active()
            .filter(E::id_column().eq(id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// All live records matching `filter`
    async fn list(&self, filter: &Filter) -> AppResult<Vec<E::Model>> {
        E::find_active()
            .filter(filter.condition::<E>()?)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// One page of live records matching `filter`
    async fn list_paginated(
        &self,
        pagination: &Pagination,
        filter: &Filter,
    ) -> AppResult<Paginated<E::Model>> {
        let select = E::find_active().filter(filter.condition::<E>()?);
        fetch_page(select, self.conn(), pagination).await
    }

    /// Count live records matching `filter`
    async fn count(&self, filter: &Filter) -> AppResult<u64> {
        E::find_active()
            .filter(filter.condition::<E>()?)
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn exists(&self, id: Uuid) -> AppResult<bool> {
        let count = E::find_active()
            .filter(E::id_column().eq(id))
            .count(self.conn())
            .await?;
        Ok(count > 0)
    }
}

/// Write operations (Command) - Single Responsibility
#[async_trait]
pub trait WriteRepository<E>: RepositoryConnection
where
    E: RecordEntity,
    E::Model: IntoActiveModel<E::ActiveModel> + Sync,
    E::ActiveModel: Send,
{
    /// Insert a record; id and timestamps are filled by the save hook
    async fn create(&self, model: E::ActiveModel) -> AppResult<E::Model> {
        model.insert(self.conn()).await.map_err(Into::into)
    }

    /// Save the changed columns of an existing record
    async fn update(&self, model: E::ActiveModel) -> AppResult<E::Model> {
        update_record::<E, _>(self.conn(), model).await
    }

    /// Insert many records in chunks; returns the number of rows written
    async fn batch_create(&self, models: Vec<E::ActiveModel>) -> AppResult<u64> {
        if models.is_empty() {
            return Ok(0);
        }

        let mut rows = models
            .into_iter()
            .map(|mut model| {
                stamp(&mut model, true);
                model
            })
            .peekable();

        let mut written = 0;
        while rows.peek().is_some() {
            let chunk: Vec<E::ActiveModel> = rows.by_ref().take(BATCH_CHUNK_SIZE).collect();
            written += E::insert_many(chunk)
                .exec_without_returning(self.conn())
                .await?;
        }
        Ok(written)
    }

    /// Upsert many records keyed on id, overwriting every column except the
    /// key and the creation time
    async fn batch_update(&self, models: Vec<E::ActiveModel>) -> AppResult<u64> {
        batch_update_records::<E, _>(self.conn(), models).await
    }
}

/// Delete operations - Single Responsibility
#[async_trait]
pub trait DeleteRepository<E>: RepositoryConnection
where
    E: RecordEntity,
{
    /// Remove the row permanently
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        delete_record::<E, _>(self.conn(), id).await
    }

    /// Set `deleted_at` on a live row
    async fn soft_delete(&self, id: Uuid) -> AppResult<()> {
        let now = Utc::now();
        let result = E::update_many()
            .col_expr(E::deleted_at_column(), Expr::value(now))
            .col_expr(E::updated_at_column(), Expr::value(now))
            .filter(E::id_column().eq(id))
            .filter(E::deleted_at_column().is_null())
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Soft delete every live row in `ids`; returns the number of rows touched
    async fn batch_delete(&self, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let result = E::update_many()
            .col_expr(E::deleted_at_column(), Expr::value(now))
            .col_expr(E::updated_at_column(), Expr::value(now))
            .filter(E::id_column().is_in(ids.iter().copied()))
            .filter(E::deleted_at_column().is_null())
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }
}

/// Full CRUD repository - Combines all operations
pub trait CrudRepository<E>: ReadRepository<E> + WriteRepository<E> + DeleteRepository<E>
where
    E: RecordEntity,
    E::Model: IntoActiveModel<E::ActiveModel> + Sync,
    E::ActiveModel: Send,
    E::Column: FromStr,
{
}

// Auto-implement CrudRepository for types implementing all traits
impl<T, E> CrudRepository<E> for T
where
    T: ReadRepository<E> + WriteRepository<E> + DeleteRepository<E>,
    E: RecordEntity,
    E::Model: IntoActiveModel<E::ActiveModel> + Sync,
    E::ActiveModel: Send,
    E::Column: FromStr,
{
}

/// Save the changed columns of an existing record
pub(crate) async fn update_record<E, C>(conn: &C, model: E::ActiveModel) -> AppResult<E::Model>
where
    E: RecordEntity,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: Send,
    C: ConnectionTrait,
{
    match model.update(conn).await {
        Ok(model) => Ok(model),
        Err(DbErr::RecordNotFound(_)) | Err(DbErr::RecordNotUpdated) => Err(AppError::NotFound),
        Err(e) => Err(e.into()),
    }
}

/// Upsert `models` keyed on id in chunks, leaving the key and creation time alone
pub(crate) async fn batch_update_records<E, C>(conn: &C, models: Vec<E::ActiveModel>) -> AppResult<u64>
where
    E: RecordEntity,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: Send,
    C: ConnectionTrait,
{
    if models.is_empty() {
        return Ok(0);
    }

    let id = E::id_column();
    let created_at = E::created_at_column();
    let update_columns: Vec<E::Column> = E::Column::iter()
        .filter(|column| column.as_str() != id.as_str() && column.as_str() != created_at.as_str())
        .collect();

    let mut rows = models
        .into_iter()
        .map(|mut model| {
            stamp(&mut model, true);
            model
        })
        .peekable();

    let mut written = 0;
    while rows.peek().is_some() {
        let chunk: Vec<E::ActiveModel> = rows.by_ref().take(BATCH_CHUNK_SIZE).collect();
        written += E::insert_many(chunk)
            .on_conflict(
                OnConflict::column(id)
                    .update_columns(update_columns.clone())
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
    }
    Ok(written)
}

/// Remove the row permanently; `NotFound` when nothing matched
pub(crate) async fn delete_record<E, C>(conn: &C, id: Uuid) -> AppResult<()>
where
    E: RecordEntity,
    C: ConnectionTrait,
{
    let result = E::delete_many()
        .filter(E::id_column().eq(id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Wire a connection-borrowing store into the base repository traits.
///
/// `read_only` wires the connection and reads, for stores that write with
/// side effects of their own.
macro_rules! impl_base_repository {
    ($store:ident, $entity:ty, read_only) => {
        impl<'c, C> $crate::repositories::base::RepositoryConnection for $store<'c, C>
        where
            C: sea_orm::ConnectionTrait + Send + Sync,
        {
            type Conn = C;

            fn conn(&self) -> &C {
                self.db
            }
        }

        impl<'c, C> $crate::repositories::base::ReadRepository<$entity> for $store<'c, C> where
            C: sea_orm::ConnectionTrait + Send + Sync
        {
        }
    };
    ($store:ident, $entity:ty) => {
        $crate::repositories::base::impl_base_repository!($store, $entity, read_only);

        impl<'c, C> $crate::repositories::base::WriteRepository<$entity> for $store<'c, C> where
            C: sea_orm::ConnectionTrait + Send + Sync
        {
        }

        impl<'c, C> $crate::repositories::base::DeleteRepository<$entity> for $store<'c, C> where
            C: sea_orm::ConnectionTrait + Send + Sync
        {
        }
    };
}

pub(crate) use impl_base_repository;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::entities::project;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult, Set};

    struct ProjectTable<'c> {
        db: &'c DatabaseConnection,
    }

    impl RepositoryConnection for ProjectTable<'_> {
        type Conn = DatabaseConnection;

        fn conn(&self) -> &DatabaseConnection {
            self.db
        }
    }

    impl ReadRepository<project::Entity> for ProjectTable<'_> {}
    impl WriteRepository<project::Entity> for ProjectTable<'_> {}
    impl DeleteRepository<project::Entity> for ProjectTable<'_> {}

    fn draft(name: &str) -> project::ActiveModel {
        project::ActiveModel {
            name: Set(name.to_string()),
            created_by: Set(Uuid::new_v4()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_batches_do_not_touch_the_database() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = ProjectTable { db: &db };

        assert_eq!(repo.batch_create(vec![]).await.unwrap(), 0);
        assert_eq!(repo.batch_update(vec![]).await.unwrap(), 0);
        assert_eq!(repo.batch_delete(&[]).await.unwrap(), 0);
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn batch_create_splits_into_chunks() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 100,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 50,
                },
            ])
            .into_connection();
        let repo = ProjectTable { db: &db };

        let models = (0..150).map(|i| draft(&format!("project {}", i))).collect();
        assert_eq!(repo.batch_create(models).await.unwrap(), 150);
        assert_eq!(db.into_transaction_log().len(), 2);
    }

    #[tokio::test]
    async fn batch_update_upserts_on_id() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let repo = ProjectTable { db: &db };

        repo.batch_update(vec![draft("renamed")]).await.unwrap();

        let sql = format!("{:?}", db.into_transaction_log());
        assert!(sql.contains("ON CONFLICT (\\\"id\\\") DO UPDATE"));
        assert!(!sql.contains("\\\"created_at\\\" = \\\"excluded\\\""));
    }

    #[tokio::test]
    async fn deleting_a_missing_row_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let repo = ProjectTable { db: &db };

        assert!(matches!(repo.delete(Uuid::new_v4()).await, Err(AppError::NotFound)));
        assert!(matches!(
            repo.soft_delete(Uuid::new_v4()).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn exists_counts_live_rows() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(1)]])
            .into_connection();
        let repo = ProjectTable { db: &db };

        assert!(repo.exists(Uuid::new_v4()).await.unwrap());
    }

    fn count_row(n: i64) -> std::collections::BTreeMap<&'static str, sea_orm::Value> {
        std::collections::BTreeMap::from([("num_items", n.into())])
    }
}
