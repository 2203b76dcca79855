//! Migration: Create proposals table.

use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_users_table::Users;
use super::m20240101_000002_create_projects_table::Projects;
use super::{index, record_table, reference};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                record_table(Proposals::Table)
                    .col(ColumnDef::new(Proposals::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Proposals::Description).text().not_null().default(""))
                    .col(ColumnDef::new(Proposals::Category).string_len(50).not_null())
                    .col(
                        ColumnDef::new(Proposals::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Proposals::Priority)
                            .string_len(20)
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(Proposals::EstimatedEffort)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Proposals::ExpectedOutcome)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Proposals::Justification)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Proposals::ReviewedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Proposals::ReviewedBy).uuid().null())
                    .col(ColumnDef::new(Proposals::ReviewNotes).text().not_null().default(""))
                    .col(ColumnDef::new(Proposals::ProjectId).uuid().null())
                    .col(ColumnDef::new(Proposals::SubmittedBy).uuid().not_null())
                    .foreign_key(&mut reference(
                        Proposals::Table,
                        Proposals::ProjectId,
                        Projects::Table,
                        ForeignKeyAction::SetNull,
                    ))
                    .foreign_key(&mut reference(
                        Proposals::Table,
                        Proposals::SubmittedBy,
                        Users::Table,
                        ForeignKeyAction::Restrict,
                    ))
                    .foreign_key(&mut reference(
                        Proposals::Table,
                        Proposals::ReviewedBy,
                        Users::Table,
                        ForeignKeyAction::SetNull,
                    ))
                    .to_owned(),
            )
            .await?;

        for column in [
            Proposals::Status,
            Proposals::Category,
            Proposals::SubmittedBy,
            Proposals::ProjectId,
            Proposals::DeletedAt,
        ] {
            manager.create_index(index(Proposals::Table, column)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Proposals::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
enum Proposals {
    Table,
    Title,
    Description,
    Category,
    Status,
    Priority,
    EstimatedEffort,
    ExpectedOutcome,
    Justification,
    ReviewedAt,
    ReviewedBy,
    ReviewNotes,
    ProjectId,
    SubmittedBy,
    DeletedAt,
}
