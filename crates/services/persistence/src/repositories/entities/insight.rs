//! Insight database entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "insights")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// optimization, recommendation, warning, trend
    pub insight_type: String,
    pub impact: String,
    #[sea_orm(column_type = "Double")]
    pub confidence: f64,
    /// JSON array of action descriptions
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub action_items: Option<Json>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub data: Option<Json>,
    pub is_actionable: bool,
    pub is_implemented: bool,
    pub implemented_at: Option<DateTimeUtc>,
    pub pattern_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pattern::Entity",
        from = "Column::PatternId",
        to = "super::pattern::Column::Id"
    )]
    Pattern,
}

impl Related<super::pattern::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pattern.def()
    }
}
