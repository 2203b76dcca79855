//! Migration: Create agents table.

use sea_orm_migration::prelude::*;

use super::{index, record_table};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                record_table(Agents::Table)
                    .col(ColumnDef::new(Agents::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Agents::AgentType).string_len(50).not_null())
                    .col(
                        ColumnDef::new(Agents::Status)
                            .string_len(20)
                            .not_null()
                            .default("inactive"),
                    )
                    .col(ColumnDef::new(Agents::Capabilities).json_binary().null())
                    .col(ColumnDef::new(Agents::Config).json_binary().null())
                    .col(ColumnDef::new(Agents::LastActive).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Agents::TaskCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Agents::SuccessRate).double().not_null().default(0.0))
                    .col(
                        ColumnDef::new(Agents::AvgResponseTime)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .to_owned(),
            )
            .await?;

        for column in [Agents::AgentType, Agents::Status, Agents::DeletedAt] {
            manager.create_index(index(Agents::Table, column)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Agents::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
pub(crate) enum Agents {
    Table,
    Name,
    AgentType,
    Status,
    Capabilities,
    Config,
    LastActive,
    TaskCount,
    SuccessRate,
    AvgResponseTime,
    DeletedAt,
}
