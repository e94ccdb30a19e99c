//! JSON catalog definition and its structural validation.

use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, SchemaError},
    schema::{
        collection::{Collection, DELETED_AT, SORT, TENANT_ID},
        relation::RelationKind,
    },
};

/// Catalog definition as stored in the file referenced by `SCHEMA_PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub collections: Vec<Collection>,
}

impl SchemaDefinition {
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Normalises defaults and validates every collection and relation.
    ///
    /// # Returns
    /// - `Ok(IndexMap)` - Collections keyed by name, in definition order
    /// - `Err(SchemaError)` - First structural problem found
    pub fn into_collections(self) -> Result<IndexMap<String, Collection>, SchemaError> {
        let mut collections: IndexMap<String, Collection> = IndexMap::new();

        for mut collection in self.collections {
            validate_identifier(&collection.name)?;
            if collections.contains_key(&collection.name) {
                return Err(SchemaError::DuplicateCollection(collection.name));
            }
            normalise_collection(&mut collection)?;
            collections.insert(collection.name.clone(), collection);
        }

        for collection in collections.values() {
            validate_relations(collection, &collections)?;
        }

        Ok(collections)
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

fn invalid(collection: &Collection, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidCollection {
        collection: collection.name.clone(),
        reason: reason.into(),
    }
}

fn normalise_collection(collection: &mut Collection) -> Result<(), SchemaError> {
    if collection.table.is_empty() {
        collection.table = collection.name.clone();
    }
    validate_identifier(&collection.table)?;

    for (name, field) in collection.fields.iter_mut() {
        validate_identifier(name)?;
        field.name = name.clone();
    }

    if collection.primary_key.is_empty() {
        collection.primary_key = collection
            .fields
            .values()
            .find(|f| f.primary_key)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| "id".to_string());
    }
    let pk = collection.primary_key.clone();
    match collection.fields.get_mut(&pk) {
        Some(field) => {
            field.primary_key = true;
            field.nullable = false;
        }
        None => {
            return Err(SchemaError::MissingPrimaryKey {
                collection: collection.name.clone(),
                field: pk,
            })
        }
    }

    let flags = [
        (collection.soft_delete, DELETED_AT, "softDelete"),
        (collection.multi_tenant, TENANT_ID, "multiTenant"),
        (collection.sort_enabled, SORT, "sortEnabled"),
    ];
    for (enabled, column, flag) in flags {
        if enabled && !collection.has_field(column) {
            return Err(invalid(
                collection,
                format!("{} requires a \"{}\" field", flag, column),
            ));
        }
    }

    let mut patterns = Vec::new();
    for field in collection.fields.values() {
        if let Some(pattern) = &field.rules.pattern {
            let compiled = Regex::new(pattern).map_err(|e| {
                invalid(
                    collection,
                    format!("pattern of field \"{}\" does not compile: {}", field.name, e),
                )
            })?;
            patterns.push((field.name.clone(), compiled));
        }
    }
    for (name, compiled) in patterns {
        if let Some(field) = collection.fields.get_mut(&name) {
            field.rules.compiled_pattern = Some(compiled);
        }
    }

    let names: Vec<String> = collection.relations.keys().cloned().collect();
    for name in names {
        validate_identifier(&name)?;
        if name.contains("__") {
            return Err(relation_error(collection, &name, "name may not contain \"__\""));
        }
        if collection.has_field(&name) {
            return Err(relation_error(collection, &name, "name collides with a field"));
        }
        if let Some(relation) = collection.relations.get_mut(&name) {
            relation.name = name.clone();
        }
    }

    Ok(())
}

fn relation_error(collection: &Collection, relation: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidRelation {
        collection: collection.name.clone(),
        relation: relation.to_string(),
        reason: reason.into(),
    }
}

fn validate_relations(
    collection: &Collection,
    collections: &IndexMap<String, Collection>,
) -> Result<(), SchemaError> {
    for relation in collection.relations.values() {
        let fail = |reason: String| relation_error(collection, &relation.name, reason);

        let lookup = |name: &str| {
            collections
                .get(name)
                .ok_or_else(|| fail(format!("unknown collection \"{}\"", name)))
        };
        let require_field = |owner: &Collection, field: &str| {
            if owner.has_field(field) {
                Ok(())
            } else {
                Err(fail(format!(
                    "field \"{}\" does not exist in \"{}\"",
                    field, owner.name
                )))
            }
        };

        match relation.kind {
            RelationKind::BelongsTo => {
                let target = lookup(relation.related().unwrap_or_default())?;
                require_field(collection, &relation.foreign_key)?;
                require_field(
                    target,
                    relation.target_key.as_deref().unwrap_or(&target.primary_key),
                )?;
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                let target = lookup(relation.related().unwrap_or_default())?;
                require_field(target, &relation.foreign_key)?;
                require_field(
                    collection,
                    relation.target_key.as_deref().unwrap_or(&collection.primary_key),
                )?;
            }
            RelationKind::BelongsToMany => {
                let target = lookup(relation.related().unwrap_or_default())?;
                let junction = lookup(relation.junction().unwrap_or_default())?;
                let junction_target_key = relation
                    .junction_target_key
                    .as_deref()
                    .ok_or_else(|| fail("junctionTargetKey is required".to_string()))?;
                require_field(junction, &relation.foreign_key)?;
                require_field(junction, junction_target_key)?;
                require_field(
                    collection,
                    relation.target_key.as_deref().unwrap_or(&collection.primary_key),
                )?;
                require_field(target, &target.primary_key)?;
            }
            RelationKind::ManyToAny => {
                if relation.related_collections.is_empty() {
                    return Err(fail("relatedCollections may not be empty".to_string()));
                }
                for name in &relation.related_collections {
                    lookup(name)?;
                }
                let junction = lookup(relation.junction().unwrap_or_default())?;
                require_field(junction, &relation.foreign_key)?;
                require_field(junction, &relation.discriminator)?;
                require_field(junction, &relation.item_key)?;
                require_field(
                    collection,
                    relation.target_key.as_deref().unwrap_or(&collection.primary_key),
                )?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn definition(value: serde_json::Value) -> SchemaDefinition {
        SchemaDefinition::from_json(value).unwrap()
    }

    #[test]
    fn fills_table_and_primary_key_defaults() {
        let collections = definition(json!({
            "collections": [{
                "name": "tags",
                "fields": {"id": {"type": "integer"}, "name": {"type": "string"}}
            }]
        }))
        .into_collections()
        .unwrap();

        let tags = &collections["tags"];
        assert_eq!(tags.table, "tags");
        assert_eq!(tags.primary_key, "id");
        assert!(!tags.fields["id"].nullable);
        assert_eq!(tags.fields["name"].name, "name");
    }

    #[test]
    fn rejects_relation_to_unknown_collection() {
        let result = definition(json!({
            "collections": [{
                "name": "posts",
                "fields": {"id": {"type": "integer"}, "author_id": {"type": "integer"}},
                "relations": {"author": {"type": "belongsTo", "related": "users", "foreignKey": "author_id"}}
            }]
        }))
        .into_collections();

        assert!(matches!(result, Err(SchemaError::InvalidRelation { .. })));
    }

    #[test]
    fn rejects_double_underscore_relation_names() {
        let result = definition(json!({
            "collections": [{
                "name": "departments",
                "fields": {"id": {"type": "integer"}, "parent_id": {"type": "integer"}},
                "relations": {"parent__dept": {"type": "belongsTo", "related": "departments", "foreignKey": "parent_id"}}
            }]
        }))
        .into_collections();

        assert!(matches!(result, Err(SchemaError::InvalidRelation { .. })));
    }

    #[test]
    fn rejects_soft_delete_without_marker_column() {
        let result = definition(json!({
            "collections": [{
                "name": "posts",
                "softDelete": true,
                "fields": {"id": {"type": "integer"}}
            }]
        }))
        .into_collections();

        assert!(matches!(result, Err(SchemaError::InvalidCollection { .. })));
    }

    #[test]
    fn rejects_invalid_identifiers() {
        assert!(is_identifier("post_tags"));
        assert!(!is_identifier("posts; drop table"));
        assert!(!is_identifier("1posts"));
        assert!(!is_identifier(""));
    }
}
