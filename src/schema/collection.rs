use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::{field::Field, relation::Relation};

/// Soft-delete marker column.
pub const DELETED_AT: &str = "deleted_at";
/// Tenant column of multi-tenant collections.
pub const TENANT_ID: &str = "tenant_id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const CREATED_BY: &str = "created_by";
pub const UPDATED_BY: &str = "updated_by";
/// Manual ordering column of `sortEnabled` collections.
pub const SORT: &str = "sort";

/// Schema of one collection, backed by one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub name: String,
    /// Table name, defaults to the collection name.
    #[serde(default)]
    pub table: String,
    /// Primary key field, defaults to the field flagged `primaryKey` or `id`.
    #[serde(default)]
    pub primary_key: String,
    pub fields: IndexMap<String, Field>,
    #[serde(default)]
    pub relations: IndexMap<String, Relation>,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default)]
    pub multi_tenant: bool,
    /// Rows without a tenant are visible to every tenant.
    #[serde(default)]
    pub public_rows: bool,
    #[serde(default)]
    pub usertrack: bool,
    #[serde(default)]
    pub sort_enabled: bool,
}

impl Collection {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn primary_key_field(&self) -> Option<&Field> {
        self.fields.get(&self.primary_key)
    }

    /// Column that orders rows when the caller gave no sort.
    pub fn default_sort_field(&self) -> &str {
        if self.sort_enabled && self.has_field(SORT) {
            SORT
        } else {
            &self.primary_key
        }
    }

    /// Whether `field` is written by the engine rather than the caller.
    pub fn is_system_field(&self, field: &str) -> bool {
        match field {
            DELETED_AT => self.soft_delete,
            TENANT_ID => self.multi_tenant,
            CREATED_BY | UPDATED_BY => self.usertrack,
            _ => false,
        }
    }

    /// Timestamp columns stamped on create and update.
    pub fn has_timestamp(&self, field: &str) -> bool {
        self.field(field)
            .map(|f| f.field_type.is_temporal())
            .unwrap_or(false)
    }
}
