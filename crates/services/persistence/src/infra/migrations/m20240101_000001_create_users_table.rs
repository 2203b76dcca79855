//! Migration: Create users table.

use sea_orm_migration::prelude::*;

use super::{index, record_table};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                record_table(Users::Table)
                    .col(
                        ColumnDef::new(Users::Username)
                            .string_len(50)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Email)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::FirstName).string_len(50).not_null().default(""))
                    .col(ColumnDef::new(Users::LastName).string_len(50).not_null().default(""))
                    .col(ColumnDef::new(Users::Role).string_len(20).not_null().default("user"))
                    .col(ColumnDef::new(Users::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Users::IsVerified).boolean().not_null().default(false))
                    .col(ColumnDef::new(Users::LastLoginAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Users::LoginAttempts).integer().not_null().default(0))
                    .col(ColumnDef::new(Users::LockedUntil).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        for column in [Users::Role, Users::IsActive, Users::DeletedAt] {
            manager.create_index(index(Users::Table, column)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
pub(crate) enum Users {
    Table,
    Username,
    Email,
    PasswordHash,
    FirstName,
    LastName,
    Role,
    IsActive,
    IsVerified,
    LastLoginAt,
    LoginAttempts,
    LockedUntil,
    DeletedAt,
}
