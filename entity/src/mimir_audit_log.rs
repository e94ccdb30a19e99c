//! One row per committed item mutation.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "mimir_audit_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Collection of the mutated item
    pub collection: String,
    /// Primary key of the mutated item, as text
    pub item: String,
    /// `create`, `update` or `delete`
    pub action: String,
    pub before: Option<Json>,
    pub after: Option<Json>,
    /// User id of the caller
    pub actor: Option<String>,
    pub tenant: Option<String>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
