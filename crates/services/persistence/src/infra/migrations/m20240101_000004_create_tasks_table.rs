//! Migration: Create tasks table.

use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_users_table::Users;
use super::m20240101_000002_create_projects_table::Projects;
use super::m20240101_000003_create_agents_table::Agents;
use super::{index, record_table, reference};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                record_table(Tasks::Table)
                    .col(ColumnDef::new(Tasks::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Tasks::Description).text().not_null().default(""))
                    .col(ColumnDef::new(Tasks::TaskType).string_len(50).not_null())
                    .col(
                        ColumnDef::new(Tasks::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Tasks::Priority)
                            .string_len(20)
                            .not_null()
                            .default("medium"),
                    )
                    .col(ColumnDef::new(Tasks::Progress).integer().not_null().default(0))
                    .col(ColumnDef::new(Tasks::EstimatedTime).integer().not_null().default(0))
                    .col(ColumnDef::new(Tasks::ActualTime).integer().not_null().default(0))
                    .col(ColumnDef::new(Tasks::StartedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Tasks::CompletedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Tasks::Result).text().not_null().default(""))
                    .col(ColumnDef::new(Tasks::ErrorMessage).text().not_null().default(""))
                    .col(ColumnDef::new(Tasks::ProjectId).uuid().null())
                    .col(ColumnDef::new(Tasks::AssignedTo).uuid().null())
                    .col(ColumnDef::new(Tasks::AgentId).uuid().null())
                    .foreign_key(&mut reference(
                        Tasks::Table,
                        Tasks::ProjectId,
                        Projects::Table,
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        Tasks::Table,
                        Tasks::AssignedTo,
                        Users::Table,
                        ForeignKeyAction::SetNull,
                    ))
                    .foreign_key(&mut reference(
                        Tasks::Table,
                        Tasks::AgentId,
                        Agents::Table,
                        ForeignKeyAction::SetNull,
                    ))
                    .to_owned(),
            )
            .await?;

        for column in [
            Tasks::Status,
            Tasks::Priority,
            Tasks::TaskType,
            Tasks::ProjectId,
            Tasks::AssignedTo,
            Tasks::AgentId,
            Tasks::DeletedAt,
        ] {
            manager.create_index(index(Tasks::Table, column)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tasks::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
enum Tasks {
    Table,
    Title,
    Description,
    TaskType,
    Status,
    Priority,
    Progress,
    EstimatedTime,
    ActualTime,
    StartedAt,
    CompletedAt,
    Result,
    ErrorMessage,
    ProjectId,
    AssignedTo,
    AgentId,
    DeletedAt,
}
