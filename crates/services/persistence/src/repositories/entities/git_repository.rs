//! Git repository linked to a project.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "git_repositories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub repository_url: String,
    pub branch: String,
    pub last_commit_sha: String,
    pub last_sync_at: Option<DateTimeUtc>,
    pub status: String,
    #[serde(skip_serializing, default)]
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub credentials: Option<Json>,
    #[serde(skip_serializing, default)]
    pub webhook_secret: String,
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
