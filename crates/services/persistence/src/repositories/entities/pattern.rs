//! Pattern database entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "patterns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// user_behavior, system_usage, project_trend, ...
    pub pattern_type: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// 0.0 to 1.0
    #[sea_orm(column_type = "Double")]
    pub confidence: f64,
    pub frequency: i32,
    #[sea_orm(column_type = "Double")]
    pub significance: f64,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub data: Option<Json>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub context: Option<Json>,
    pub last_seen: DateTimeUtc,
    pub project_id: Option<Uuid>,
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
    #[sea_orm(has_many = "super::insight::Entity")]
    Insights,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::insight::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Insights.def()
    }
}
