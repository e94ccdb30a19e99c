//! Role permission entries loaded by the database permission provider.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "mimir_permission")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub role: String,
    pub collection: String,
    /// `create`, `read`, `update` or `delete`
    pub action: String,
    /// JSON array of allowed field patterns, null allows every field
    pub fields: Option<Json>,
    /// JSON filter object AND-ed into queries
    pub filter: Option<Json>,
    /// JSON object of default values
    pub presets: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
