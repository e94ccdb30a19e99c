//! Schema catalog.
//!
//! Holds every collection's fields, primary key, relations and behaviour flags. The
//! catalog is built once at startup, validated, and then shared read-only between all
//! requests.

pub mod collection;
pub mod definition;
pub mod field;
pub mod relation;

use std::{collections::BTreeSet, path::Path};

use indexmap::IndexMap;

pub use collection::Collection;
pub use definition::SchemaDefinition;
pub use field::{Field, FieldRules, FieldType};
pub use relation::{Relation, RelationKind};

use crate::error::{Error, QueryError, SchemaError};

#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    collections: IndexMap<String, Collection>,
}

impl SchemaCatalog {
    /// Builds a catalog from a definition, validating its structure.
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self, SchemaError> {
        Ok(Self {
            collections: definition.into_collections()?,
        })
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        Ok(Self::from_definition(SchemaDefinition::from_json(value)?)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self::from_definition(SchemaDefinition::from_file(path)?)?)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    /// Full schema of `collection`.
    pub fn get_schema_definition(&self, collection: &str) -> Result<&Collection, QueryError> {
        self.collections
            .get(collection)
            .ok_or_else(|| QueryError::UnknownCollection(collection.to_string()))
    }

    /// Table backing `collection`.
    pub fn get_table(&self, collection: &str) -> Result<&str, QueryError> {
        Ok(self.get_schema_definition(collection)?.table.as_str())
    }

    pub fn get_primary_key(&self, collection: &str) -> Result<&str, QueryError> {
        Ok(self.get_schema_definition(collection)?.primary_key.as_str())
    }

    pub fn get_relation(&self, collection: &str, name: &str) -> Result<&Relation, QueryError> {
        self.get_schema_definition(collection)?
            .relation(name)
            .ok_or_else(|| QueryError::UnknownRelation {
                collection: collection.to_string(),
                relation: name.to_string(),
            })
    }

    pub fn get_field(&self, collection: &str, name: &str) -> Result<&Field, QueryError> {
        self.get_schema_definition(collection)?
            .field(name)
            .ok_or_else(|| QueryError::UnknownField {
                collection: collection.to_string(),
                field: name.to_string(),
            })
    }

    /// Whether reads of `collection` hide soft-deleted rows by default.
    pub fn is_paranoid(&self, collection: &str) -> bool {
        self.collections
            .get(collection)
            .map(|c| c.soft_delete)
            .unwrap_or(false)
    }

    /// Tables a relation of `collection` reads or writes besides the source table.
    pub fn relation_tables(&self, collection: &str, relation: &str) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();
        let Ok(relation) = self.get_relation(collection, relation) else {
            return tables;
        };
        let targets = relation
            .related()
            .into_iter()
            .chain(relation.related_collections.iter().map(String::as_str))
            .chain(relation.junction());
        for name in targets {
            if let Ok(table) = self.get_table(name) {
                tables.insert(table.to_string());
            }
        }
        tables
    }

    /// `BelongsTo` relation on `collection` pointing at `target`, if any.
    pub fn belongs_to_back(&self, collection: &str, target: &str) -> Option<&Relation> {
        self.collections.get(collection)?.relations.values().find(|r| {
            r.kind == RelationKind::BelongsTo && r.related() == Some(target)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_json(json!({
            "collections": [
                {
                    "name": "users",
                    "fields": {"id": {"type": "integer"}, "name": {"type": "string"}}
                },
                {
                    "name": "posts",
                    "softDelete": true,
                    "fields": {
                        "id": {"type": "integer"},
                        "author_id": {"type": "integer"},
                        "deleted_at": {"type": "dateTime"}
                    },
                    "relations": {
                        "author": {"type": "belongsTo", "related": "users", "foreignKey": "author_id"}
                    }
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn looks_up_tables_keys_and_relations() {
        let catalog = catalog();
        assert_eq!(catalog.get_table("posts").unwrap(), "posts");
        assert_eq!(catalog.get_primary_key("users").unwrap(), "id");
        assert_eq!(
            catalog.get_relation("posts", "author").unwrap().kind,
            RelationKind::BelongsTo
        );
        assert!(catalog.is_paranoid("posts"));
        assert!(!catalog.is_paranoid("users"));
    }

    #[test]
    fn unknown_names_are_query_errors() {
        let catalog = catalog();
        assert!(matches!(
            catalog.get_table("missing"),
            Err(QueryError::UnknownCollection(_))
        ));
        assert!(matches!(
            catalog.get_relation("posts", "editor"),
            Err(QueryError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn relation_tables_include_targets() {
        let catalog = catalog();
        let tables = catalog.relation_tables("posts", "author");
        assert!(tables.contains("users"));
    }
}
