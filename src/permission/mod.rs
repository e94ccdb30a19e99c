//! Role based permissions.
//!
//! A [`PermissionProvider`] answers "may role R perform action A on collection C, and under
//! which row filter, field allow-list and presets". Per request, [`Access`] combines the
//! provider with the caller's [`Accountability`] and the resolved tenant scope.

pub mod access;
pub mod database;
pub mod pattern;
pub mod placeholder;
pub mod static_provider;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

pub use access::{Access, TenantScope};
pub use database::DatabasePermissionProvider;
pub use pattern::FieldPatterns;
pub use static_provider::StaticPermissionProvider;

use crate::{
    error::Error,
    model::{
        accountability::Accountability,
        filter::Filter,
        permission::{Action, Permission},
    },
};

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Loads whatever the provider needs before the first lookup.
    async fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Permission entry of `role` for `action` on `collection`.
    fn permission(&self, role: &str, collection: &str, action: Action) -> Option<Permission>;

    fn can_access(&self, role: &str, collection: &str, action: Action) -> bool {
        self.permission(role, collection, action).is_some()
    }

    /// Row filter with placeholders resolved against `identity`.
    fn get_filter(
        &self,
        role: &str,
        collection: &str,
        action: Action,
        identity: &Accountability,
    ) -> Option<Filter> {
        self.permission(role, collection, action)?
            .filter
            .map(|filter| placeholder::resolve_filter(&filter, identity))
    }

    /// Allowed field patterns, `None` when every field is allowed.
    fn get_allowed_fields(&self, role: &str, collection: &str, action: Action) -> Option<Vec<String>> {
        self.permission(role, collection, action)?.fields
    }

    fn get_default_values(
        &self,
        role: &str,
        collection: &str,
        action: Action,
        identity: &Accountability,
    ) -> Map<String, JsonValue> {
        self.permission(role, collection, action)
            .map(|p| placeholder::resolve_presets(&p.presets, identity))
            .unwrap_or_default()
    }
}
