//! Migration: Create the auxiliary tables.
//!
//! These tables have no repository of their own, so their schema is derived
//! straight from the entity definitions.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{EntityName, EntityTrait, Schema};

use crate::repositories::entities::{
    git_repository, project_asset, project_state, project_template, system_metric,
    workflow_execution,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

fn create<E>(schema: &Schema, entity: E) -> TableCreateStatement
where
    E: EntityTrait,
{
    schema.create_table_from_entity(entity).if_not_exists().to_owned()
}

fn drop_table<E>(entity: E) -> TableDropStatement
where
    E: EntityName,
{
    Table::drop().table(entity).if_exists().to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());

        let tables = [
            create(&schema, system_metric::Entity),
            create(&schema, git_repository::Entity),
            create(&schema, project_asset::Entity),
            create(&schema, project_state::Entity),
            create(&schema, workflow_execution::Entity),
            create(&schema, project_template::Entity),
        ];
        for table in tables {
            manager.create_table(table).await?;
        }

        manager
            .create_index(
                Index::create()
                    .name("idx_system_metrics_type_timestamp")
                    .table(system_metric::Entity)
                    .col(system_metric::Column::MetricType)
                    .col(system_metric::Column::Timestamp)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_executions_project_id")
                    .table(workflow_execution::Entity)
                    .col(workflow_execution::Column::ProjectId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let tables = [
            drop_table(project_template::Entity),
            drop_table(workflow_execution::Entity),
            drop_table(project_state::Entity),
            drop_table(project_asset::Entity),
            drop_table(git_repository::Entity),
            drop_table(system_metric::Entity),
        ];
        for table in tables {
            manager.drop_table(table).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm_migration::sea_orm::DbBackend;

    #[test]
    fn auxiliary_tables_reference_projects() {
        let schema = Schema::new(DbBackend::Postgres);
        let sql = create(&schema, git_repository::Entity).to_string(PostgresQueryBuilder);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"git_repositories\""));
        assert!(sql.contains("REFERENCES \"projects\""));
    }
}
