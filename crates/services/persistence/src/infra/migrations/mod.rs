//! Database migrations.
//!
//! Each migration is a separate module following SeaORM conventions.
//! Migration names follow the pattern: m{YYYYMMDD}_{NNNNNN}_{description}

use sea_orm_migration::prelude::*;

mod m20240101_000001_create_users_table;
mod m20240101_000002_create_projects_table;
mod m20240101_000003_create_agents_table;
mod m20240101_000004_create_tasks_table;
mod m20240101_000005_create_proposals_table;
mod m20240101_000006_create_patterns_table;
mod m20240101_000007_create_insights_table;
mod m20240101_000008_create_activity_logs_table;
mod m20240101_000009_create_auxiliary_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_projects_table::Migration),
            Box::new(m20240101_000003_create_agents_table::Migration),
            Box::new(m20240101_000004_create_tasks_table::Migration),
            Box::new(m20240101_000005_create_proposals_table::Migration),
            Box::new(m20240101_000006_create_patterns_table::Migration),
            Box::new(m20240101_000007_create_insights_table::Migration),
            Box::new(m20240101_000008_create_activity_logs_table::Migration),
            Box::new(m20240101_000009_create_auxiliary_tables::Migration),
        ]
    }
}

/// Columns every record table carries
#[derive(Iden)]
pub(crate) enum Record {
    Id,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

/// `CREATE TABLE IF NOT EXISTS` with the uuid key, timestamps and
/// soft-delete column already in place.
pub(crate) fn record_table<T>(table: T) -> TableCreateStatement
where
    T: IntoTableRef,
{
    Table::create()
        .table(table)
        .if_not_exists()
        .col(ColumnDef::new(Record::Id).uuid().not_null().primary_key())
        .col(
            ColumnDef::new(Record::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(Record::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(Record::DeletedAt)
                .timestamp_with_time_zone()
                .null(),
        )
        .to_owned()
}

/// Single-column index named `idx_{table}_{column}`
pub(crate) fn index<T, C>(table: T, column: C) -> IndexCreateStatement
where
    T: Iden + 'static,
    C: Iden + 'static,
{
    Index::create()
        .name(format!("idx_{}_{}", table.to_string(), column.to_string()))
        .table(table)
        .col(column)
        .if_not_exists()
        .to_owned()
}

/// Foreign key from `table.column` to `target.id`
pub(crate) fn reference<T, C, R>(
    table: T,
    column: C,
    target: R,
    on_delete: ForeignKeyAction,
) -> ForeignKeyCreateStatement
where
    T: Iden + 'static,
    C: Iden + 'static,
    R: Iden + 'static,
{
    ForeignKey::create()
        .name(format!("fk_{}_{}", table.to_string(), column.to_string()))
        .from(table, column)
        .to(target, Record::Id)
        .on_delete(on_delete)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Iden)]
    enum Widgets {
        Table,
        OwnerId,
    }

    #[test]
    fn migrations_are_ordered_by_name() {
        let names: Vec<String> = Migrator::migrations()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn record_tables_carry_soft_delete() {
        let sql = record_table(Widgets::Table).to_string(PostgresQueryBuilder);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"widgets\""));
        assert!(sql.contains("\"id\" uuid NOT NULL PRIMARY KEY"));
        assert!(sql.contains("\"deleted_at\" timestamp with time zone NULL"));
    }

    #[test]
    fn helper_names_follow_table_and_column() {
        let sql = index(Widgets::Table, Widgets::OwnerId).to_string(PostgresQueryBuilder);
        assert!(sql.contains("\"idx_widgets_owner_id\""));

        let sql = Table::create()
            .table(Widgets::Table)
            .col(ColumnDef::new(Widgets::OwnerId).uuid())
            .foreign_key(&mut reference(
                Widgets::Table,
                Widgets::OwnerId,
                Widgets::Table,
                ForeignKeyAction::Cascade,
            ))
            .to_string(PostgresQueryBuilder);
        assert!(sql.contains("\"fk_widgets_owner_id\""));
        assert!(sql.contains("ON DELETE CASCADE"));
    }
}
