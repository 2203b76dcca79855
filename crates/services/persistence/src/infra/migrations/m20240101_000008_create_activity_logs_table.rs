//! Migration: Create activity_logs table.

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
                record_table(ActivityLogs::Table)
                    .col(ColumnDef::new(ActivityLogs::Action).string_len(100).not_null())
                    .col(ColumnDef::new(ActivityLogs::Resource).string_len(100).not_null())
                    .col(ColumnDef::new(ActivityLogs::ResourceId).uuid().null())
                    .col(ColumnDef::new(ActivityLogs::Details).json_binary().null())
                    .col(
                        ColumnDef::new(ActivityLogs::IpAddress)
                            .string_len(45)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(ActivityLogs::UserAgent).text().not_null().default(""))
                    .col(ColumnDef::new(ActivityLogs::Success).boolean().not_null().default(true))
                    .col(ColumnDef::new(ActivityLogs::ErrorMessage).text().not_null().default(""))
                    .col(ColumnDef::new(ActivityLogs::UserId).uuid().null())
                    .foreign_key(&mut reference(
                        ActivityLogs::Table,
                        ActivityLogs::UserId,
                        Users::Table,
                        ForeignKeyAction::SetNull,
                    ))
                    .to_owned(),
            )
            .await?;

        for column in [
            ActivityLogs::UserId,
            ActivityLogs::Action,
            ActivityLogs::Resource,
            ActivityLogs::ResourceId,
            ActivityLogs::CreatedAt,
            ActivityLogs::DeletedAt,
        ] {
            manager.create_index(index(ActivityLogs::Table, column)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActivityLogs::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
enum ActivityLogs {
    Table,
    Action,
    Resource,
    ResourceId,
    Details,
    IpAddress,
    UserAgent,
    Success,
    ErrorMessage,
    UserId,
    CreatedAt,
    DeletedAt,
}
