//! Migration: Create insights table.

use sea_orm_migration::prelude::*;

use super::m20240101_000006_create_patterns_table::Patterns;
use super::{index, record_table, reference};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                record_table(Insights::Table)
                    .col(ColumnDef::new(Insights::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Insights::Description).text().not_null().default(""))
                    .col(ColumnDef::new(Insights::InsightType).string_len(50).not_null())
                    .col(
                        ColumnDef::new(Insights::Impact)
                            .string_len(20)
                            .not_null()
                            .default("medium"),
                    )
                    .col(ColumnDef::new(Insights::Confidence).double().not_null().default(0.0))
                    .col(ColumnDef::new(Insights::ActionItems).json_binary().null())
                    .col(ColumnDef::new(Insights::Data).json_binary().null())
                    .col(
                        ColumnDef::new(Insights::IsActionable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Insights::IsImplemented)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Insights::ImplementedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Insights::PatternId).uuid().null())
                    .foreign_key(&mut reference(
                        Insights::Table,
                        Insights::PatternId,
                        Patterns::Table,
                        ForeignKeyAction::SetNull,
                    ))
                    .to_owned(),
            )
            .await?;

        for column in [
            Insights::InsightType,
            Insights::Impact,
            Insights::IsImplemented,
            Insights::PatternId,
            Insights::DeletedAt,
        ] {
            manager.create_index(index(Insights::Table, column)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Insights::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
enum Insights {
    Table,
    Title,
    Description,
    InsightType,
    Impact,
    Confidence,
    ActionItems,
    Data,
    IsActionable,
    IsImplemented,
    ImplementedAt,
    PatternId,
    DeletedAt,
}
