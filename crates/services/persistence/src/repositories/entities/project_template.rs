//! Reusable project templates.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub category: String,
    pub project_type: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub template: Json,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub workflows: Option<Json>,
    pub is_public: bool,
    pub usage_count: i32,
    #[sea_orm(column_type = "Double")]
    pub rating: f64,
    pub created_by: Uuid,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}
