//! SeaORM entity definitions
//!
//! Every table carries `id`, `created_at`, `updated_at` and `deleted_at`.
//! [`RecordEntity`] exposes those columns to the generic repository code and
//! the shared save hook stamps them.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Select};
use uuid::Uuid;

pub mod activity_log;
pub mod agent;
pub mod git_repository;
pub mod insight;
pub mod pattern;
pub mod project;
pub mod project_asset;
pub mod project_state;
pub mod project_template;
pub mod proposal;
pub mod system_metric;
pub mod task;
pub mod user;
pub mod workflow_execution;

// Re-exports for public API convenience
pub use activity_log::{Entity as ActivityLogEntity, Model as ActivityLogModel};
pub use agent::{Entity as AgentEntity, Model as AgentModel};
pub use insight::{Entity as InsightEntity, Model as InsightModel};
pub use pattern::{Entity as PatternEntity, Model as PatternModel};
pub use project::{Entity as ProjectEntity, Model as ProjectModel};
pub use proposal::{Entity as ProposalEntity, Model as ProposalModel};
pub use task::{Entity as TaskEntity, Model as TaskModel};
pub use user::{Entity as UserEntity, Model as UserModel};

/// Entity with the shared bookkeeping columns.
pub trait RecordEntity: EntityTrait {
    fn id_column() -> Self::Column;
    fn created_at_column() -> Self::Column;
    fn updated_at_column() -> Self::Column;
    fn deleted_at_column() -> Self::Column;

    /// Select rows that have not been soft deleted
    fn find_active() -> Select<Self> {
        Self::find().filter(Self::deleted_at_column().is_null())
    }
}

/// Fill `id` and `created_at` on insert when the caller left them unset,
/// and refresh `updated_at` on every save.
pub(crate) fn stamp<A>(model: &mut A, insert: bool)
where
    A: ActiveModelTrait,
    A::Entity: RecordEntity,
{
    let now = Utc::now();
    if insert {
        if model.is_not_set(<A::Entity as RecordEntity>::id_column()) {
            model.set(<A::Entity as RecordEntity>::id_column(), Uuid::new_v4().into());
        }
        if model.is_not_set(<A::Entity as RecordEntity>::created_at_column()) {
            model.set(<A::Entity as RecordEntity>::created_at_column(), now.into());
        }
    }
    model.set(<A::Entity as RecordEntity>::updated_at_column(), now.into());
}

macro_rules! record_entities {
    ($($module:ident),+ $(,)?) => {
        $(
            impl RecordEntity for $module::Entity {
                fn id_column() -> $module::Column {
                    $module::Column::Id
                }

                fn created_at_column() -> $module::Column {
                    $module::Column::CreatedAt
                }

                fn updated_at_column() -> $module::Column {
                    $module::Column::UpdatedAt
                }

                fn deleted_at_column() -> $module::Column {
                    $module::Column::DeletedAt
                }
            }

            #[async_trait]
            impl sea_orm::ActiveModelBehavior for $module::ActiveModel {
                async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
                where
                    C: ConnectionTrait,
                {
                    stamp(&mut self, insert);
                    Ok(self)
                }
            }
        )+
    };
}

record_entities!(
    activity_log,
    agent,
    git_repository,
    insight,
    pattern,
    project,
    project_asset,
    project_state,
    project_template,
    proposal,
    system_metric,
    task,
    user,
    workflow_execution,
);
