//! Latest health snapshot of a project's build pipeline.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub build_status: String,
    pub test_status: String,
    pub lint_status: String,
    pub security_status: String,
    pub deployment_status: String,
    #[sea_orm(column_type = "Double")]
    pub coverage: f64,
    pub last_check_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Text")]
    pub check_errors: String,
    /// 0 to 100
    pub health_score: i32,
    #[sea_orm(column_type = "Text")]
    pub next_steps: String,
    pub readme_path: String,
    pub demo_url: String,
    pub documentation_url: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
}
