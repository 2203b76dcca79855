//! Migration: Create patterns table.

use sea_orm_migration::prelude::*;

use super::m20240101_000002_create_projects_table::Projects;
use super::{index, record_table, reference};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                record_table(Patterns::Table)
                    .col(ColumnDef::new(Patterns::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Patterns::PatternType).string_len(50).not_null())
                    .col(ColumnDef::new(Patterns::Description).text().not_null().default(""))
                    .col(ColumnDef::new(Patterns::Confidence).double().not_null().default(0.0))
                    .col(ColumnDef::new(Patterns::Frequency).integer().not_null().default(1))
                    .col(ColumnDef::new(Patterns::Significance).double().not_null().default(0.0))
                    .col(ColumnDef::new(Patterns::Data).json_binary().null())
                    .col(ColumnDef::new(Patterns::Context).json_binary().null())
                    .col(
                        ColumnDef::new(Patterns::LastSeen)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Patterns::ProjectId).uuid().null())
                    .foreign_key(&mut reference(
                        Patterns::Table,
                        Patterns::ProjectId,
                        Projects::Table,
                        ForeignKeyAction::SetNull,
                    ))
                    .to_owned(),
            )
            .await?;

        for column in [
            Patterns::PatternType,
            Patterns::Confidence,
            Patterns::ProjectId,
            Patterns::LastSeen,
            Patterns::DeletedAt,
        ] {
            manager.create_index(index(Patterns::Table, column)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Patterns::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
pub(crate) enum Patterns {
    Table,
    Name,
    PatternType,
    Description,
    Confidence,
    Frequency,
    Significance,
    Data,
    Context,
    LastSeen,
    ProjectId,
    DeletedAt,
}
