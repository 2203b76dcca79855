//! Migration: Create projects table.

use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_users_table::Users;
use super::{index, record_table, reference};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                record_table(Projects::Table)
                    .col(ColumnDef::new(Projects::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Projects::Description).text().not_null().default(""))
                    .col(
                        ColumnDef::new(Projects::ProjectType)
                            .string_len(50)
                            .not_null()
                            .default("development"),
                    )
                    .col(
                        ColumnDef::new(Projects::Status)
                            .string_len(20)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Projects::Priority)
                            .string_len(20)
                            .not_null()
                            .default("medium"),
                    )
                    .col(ColumnDef::new(Projects::Progress).integer().not_null().default(0))
                    .col(ColumnDef::new(Projects::StartDate).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Projects::EndDate).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Projects::EstimatedHours).integer().not_null().default(0))
                    .col(ColumnDef::new(Projects::ActualHours).integer().not_null().default(0))
                    .col(ColumnDef::new(Projects::Budget).double().not_null().default(0.0))
                    .col(ColumnDef::new(Projects::Tags).text().not_null().default(""))
                    .col(ColumnDef::new(Projects::Metadata).json_binary().null())
                    .col(ColumnDef::new(Projects::CreatedBy).uuid().not_null())
                    .foreign_key(&mut reference(
                        Projects::Table,
                        Projects::CreatedBy,
                        Users::Table,
                        ForeignKeyAction::Restrict,
                    ))
                    .to_owned(),
            )
            .await?;

        for column in [
            Projects::Status,
            Projects::ProjectType,
            Projects::Priority,
            Projects::CreatedBy,
            Projects::DeletedAt,
        ] {
            manager.create_index(index(Projects::Table, column)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Projects::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
pub(crate) enum Projects {
    Table,
    Name,
    Description,
    ProjectType,
    Status,
    Priority,
    Progress,
    StartDate,
    EndDate,
    EstimatedHours,
    ActualHours,
    Budget,
    Tags,
    Metadata,
    CreatedBy,
    DeletedAt,
}
