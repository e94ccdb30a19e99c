use std::{collections::HashMap, path::Path};

use async_trait::async_trait;

use crate::{
    error::{Error, SchemaError},
    model::permission::{Action, Permission},
    permission::{pattern::FieldPatterns, PermissionProvider},
};

type PermissionKey = (String, String, Action);

/// Validated permission entries keyed by role, collection and action.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    entries: HashMap<PermissionKey, Permission>,
}

impl PermissionSet {
    /// Builds the set, rejecting malformed field patterns. A later entry for the same
    /// role, collection and action replaces an earlier one.
    pub fn new(permissions: Vec<Permission>) -> Result<Self, SchemaError> {
        let mut entries = HashMap::with_capacity(permissions.len());
        for permission in permissions {
            if let Some(fields) = &permission.fields {
                FieldPatterns::parse(fields)?;
            }
            let key = (
                permission.role.clone(),
                permission.collection.clone(),
                permission.action,
            );
            if entries.insert(key, permission).is_some() {
                tracing::warn!("duplicate permission entry, the later one wins");
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, role: &str, collection: &str, action: Action) -> Option<&Permission> {
        self.entries
            .get(&(role.to_string(), collection.to_string(), action))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Permissions fixed at construction, from code or a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionProvider {
    set: PermissionSet,
}

impl StaticPermissionProvider {
    pub fn new(permissions: Vec<Permission>) -> Result<Self, SchemaError> {
        Ok(Self {
            set: PermissionSet::new(permissions)?,
        })
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        let permissions: Vec<Permission> = serde_json::from_value(value)?;
        Ok(Self::new(permissions)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        let permissions: Vec<Permission> = serde_json::from_str(&raw)?;
        Ok(Self::new(permissions)?)
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissionProvider {
    fn permission(&self, role: &str, collection: &str, action: Action) -> Option<Permission> {
        self.set.get(role, collection, action).cloned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::accountability::Accountability;

    fn provider() -> StaticPermissionProvider {
        StaticPermissionProvider::from_json(json!([
            {
                "role": "editor",
                "collection": "posts",
                "action": "read",
                "fields": ["id", "title"],
                "filter": {"author_id": {"eq": "$CURRENT_USER"}}
            },
            {
                "role": "editor",
                "collection": "posts",
                "action": "create",
                "presets": {"status": "draft", "created_by": "$CURRENT_USER"}
            }
        ]))
        .unwrap()
    }

    #[test]
    fn answers_capability_lookups() {
        let provider = provider();
        assert!(provider.can_access("editor", "posts", Action::Read));
        assert!(!provider.can_access("editor", "posts", Action::Delete));
        assert!(!provider.can_access("viewer", "posts", Action::Read));
        assert_eq!(
            provider.get_allowed_fields("editor", "posts", Action::Read),
            Some(vec!["id".to_string(), "title".to_string()])
        );
        assert_eq!(provider.get_allowed_fields("editor", "posts", Action::Create), None);
    }

    #[test]
    fn resolves_filter_and_preset_placeholders() {
        let provider = provider();
        let identity = Accountability::user("42", "editor");

        let filter = provider
            .get_filter("editor", "posts", Action::Read, &identity)
            .unwrap();
        assert_eq!(filter.to_json(), json!({"author_id": {"eq": "42"}}));

        let presets = provider.get_default_values("editor", "posts", Action::Create, &identity);
        assert_eq!(presets.get("created_by"), Some(&json!("42")));
        assert_eq!(presets.get("status"), Some(&json!("draft")));
    }

    #[test]
    fn rejects_invalid_field_patterns() {
        let result = StaticPermissionProvider::from_json(json!([
            {"role": "r", "collection": "posts", "action": "read", "fields": ["**.title"]}
        ]));
        assert!(matches!(result, Err(Error::SchemaError(_))));
    }
}
