//! Splitting a write payload into row fields and relation operations.

use serde_json::Value as JsonValue;

use crate::{
    error::{FieldViolation, ValidationError},
    model::item::Item,
    schema::{Collection, Relation, RelationKind},
};

const CREATE: &str = "create";
const UPDATE: &str = "update";
const DELETE: &str = "delete";

/// Changes to the children of a `HasOne`/`HasMany` relation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildChange {
    /// The listed keys or objects become the full child set.
    Replace(Vec<JsonValue>),
    /// Only the listed changes are applied.
    Detailed {
        create: Vec<Item>,
        update: Vec<Item>,
        delete: Vec<JsonValue>,
    },
}

/// Polymorphic link target of a `ManyToAny` relation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnyLink {
    pub collection: String,
    /// Target key, or an object to create or update in `collection`.
    pub item: JsonValue,
}

/// Relation operation of one payload.
#[derive(Debug, Clone)]
pub enum RelationWrite {
    /// `BelongsTo`: a key, `null`, or an object to create or update first.
    Parent { relation: Relation, value: JsonValue },
    /// `HasOne`/`HasMany`.
    Children { relation: Relation, change: ChildChange },
    /// `BelongsToMany` link set, keys or objects of the target collection.
    Links { relation: Relation, targets: Vec<JsonValue> },
    /// `ManyToAny` link set.
    AnyLinks { relation: Relation, targets: Vec<AnyLink> },
}

impl RelationWrite {
    pub fn relation(&self) -> &Relation {
        match self {
            RelationWrite::Parent { relation, .. }
            | RelationWrite::Children { relation, .. }
            | RelationWrite::Links { relation, .. }
            | RelationWrite::AnyLinks { relation, .. } => relation,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Decomposed {
    /// Columns of the collection's own row.
    pub fields: Item,
    /// Relation operations, ordered by relation name.
    pub relations: Vec<RelationWrite>,
}

/// Splits `payload` into the row's fields and its relation operations.
///
/// Keys that are neither fields nor relations, and relation values of the wrong shape,
/// are collected into one [`ValidationError`].
pub fn decompose(schema: &Collection, payload: Item) -> Result<Decomposed, ValidationError> {
    let mut out = Decomposed::default();
    let mut violations = Vec::new();

    for (key, value) in payload {
        if schema.has_field(&key) {
            out.fields.insert(key, value);
            continue;
        }
        let Some(relation) = schema.relation(&key) else {
            violations.push(FieldViolation::new(
                &key,
                "unknown",
                format!("\"{}\" is not a field of \"{}\"", key, schema.name),
            ));
            continue;
        };
        match relation_write(relation, value) {
            Ok(write) => out.relations.push(write),
            Err(message) => violations.push(FieldViolation::new(&key, "relation", message)),
        }
    }

    if violations.is_empty() {
        Ok(out)
    } else {
        Err(ValidationError::new(schema.name.clone(), violations))
    }
}

fn relation_write(relation: &Relation, value: JsonValue) -> Result<RelationWrite, String> {
    let relation = relation.clone();
    match relation.kind {
        RelationKind::BelongsTo => match value {
            JsonValue::Array(_) => Err("expected a key or an object".to_string()),
            value => Ok(RelationWrite::Parent { relation, value }),
        },
        RelationKind::HasOne | RelationKind::HasMany => {
            let change = child_change(value)?;
            if relation.kind == RelationKind::HasOne {
                if let ChildChange::Replace(items) = &change {
                    if items.len() > 1 {
                        return Err("expected at most one related item".to_string());
                    }
                }
            }
            Ok(RelationWrite::Children { relation, change })
        }
        RelationKind::BelongsToMany => match value {
            JsonValue::Null => Ok(RelationWrite::Links {
                relation,
                targets: Vec::new(),
            }),
            JsonValue::Array(targets) => Ok(RelationWrite::Links { relation, targets }),
            _ => Err("expected an array of keys or objects".to_string()),
        },
        RelationKind::ManyToAny => {
            let items = match value {
                JsonValue::Null => Vec::new(),
                JsonValue::Array(items) => items,
                _ => return Err("expected an array of {collection, item} objects".to_string()),
            };
            let mut targets = Vec::with_capacity(items.len());
            for item in items {
                targets.push(any_link(&relation, item)?);
            }
            Ok(RelationWrite::AnyLinks { relation, targets })
        }
    }
}

fn child_change(value: JsonValue) -> Result<ChildChange, String> {
    match value {
        JsonValue::Null => Ok(ChildChange::Replace(Vec::new())),
        JsonValue::Array(items) => Ok(ChildChange::Replace(items)),
        JsonValue::Object(object) if is_detailed(&object) => {
            let mut create = Vec::new();
            let mut update = Vec::new();
            let mut delete = Vec::new();
            for (key, list) in object {
                let JsonValue::Array(list) = list else {
                    return Err(format!("\"{}\" must be an array", key));
                };
                match key.as_str() {
                    CREATE => create = objects(list, CREATE)?,
                    UPDATE => update = objects(list, UPDATE)?,
                    _ => delete = list,
                }
            }
            Ok(ChildChange::Detailed {
                create,
                update,
                delete,
            })
        }
        value => Ok(ChildChange::Replace(vec![value])),
    }
}

fn is_detailed(object: &Item) -> bool {
    !object.is_empty()
        && object
            .keys()
            .all(|k| k == CREATE || k == UPDATE || k == DELETE)
}

fn objects(list: Vec<JsonValue>, key: &str) -> Result<Vec<Item>, String> {
    list.into_iter()
        .map(|value| match value {
            JsonValue::Object(object) => Ok(object),
            _ => Err(format!("\"{}\" must only contain objects", key)),
        })
        .collect()
}

fn any_link(relation: &Relation, value: JsonValue) -> Result<AnyLink, String> {
    let JsonValue::Object(mut object) = value else {
        return Err("expected {collection, item} objects".to_string());
    };
    let collection = match object.remove("collection") {
        Some(JsonValue::String(collection)) => collection,
        _ => return Err("\"collection\" must name the target collection".to_string()),
    };
    if !relation.related_collections.iter().any(|c| c == &collection) {
        return Err(format!("\"{}\" is not a target of this relation", collection));
    }
    let item = object.remove("item").unwrap_or(JsonValue::Null);
    if item.is_null() || item.is_array() {
        return Err("\"item\" must be a key or an object".to_string());
    }
    Ok(AnyLink { collection, item })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::SchemaCatalog;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_json(json!({
            "collections": [
                {
                    "name": "posts",
                    "fields": {"id": {"type": "integer"}, "title": {"type": "string"}, "author_id": {"type": "integer"}},
                    "relations": {
                        "author": {"type": "belongsTo", "related": "users", "foreignKey": "author_id"},
                        "comments": {"type": "hasMany", "related": "comments", "foreignKey": "post_id"},
                        "attachments": {
                            "type": "manyToAny", "junction": "post_attachments", "foreignKey": "post_id",
                            "relatedCollections": ["images"]
                        }
                    }
                },
                {"name": "users", "fields": {"id": {"type": "integer"}}},
                {"name": "comments", "fields": {"id": {"type": "integer"}, "post_id": {"type": "integer"}}},
                {"name": "images", "fields": {"id": {"type": "integer"}}},
                {
                    "name": "post_attachments",
                    "fields": {
                        "id": {"type": "integer"}, "post_id": {"type": "integer"},
                        "collection": {"type": "string"}, "item": {"type": "string"}
                    }
                }
            ]
        }))
        .unwrap()
    }

    fn item(value: JsonValue) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn splits_fields_from_relations() {
        let catalog = catalog();
        let schema = catalog.get_schema_definition("posts").unwrap();
        let decomposed = decompose(
            schema,
            item(json!({
                "title": "Hello",
                "author": {"name": "Ada"},
                "comments": {"create": [{"body": "x"}], "delete": [3]}
            })),
        )
        .unwrap();

        assert_eq!(decomposed.fields, item(json!({"title": "Hello"})));
        assert_eq!(decomposed.relations.len(), 2);
        match &decomposed.relations[1] {
            RelationWrite::Children { change, .. } => assert_eq!(
                change,
                &ChildChange::Detailed {
                    create: vec![item(json!({"body": "x"}))],
                    update: vec![],
                    delete: vec![json!(3)],
                }
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn gathers_every_shape_problem() {
        let catalog = catalog();
        let schema = catalog.get_schema_definition("posts").unwrap();
        let error = decompose(
            schema,
            item(json!({
                "subtitle": "x",
                "author": [1, 2],
                "attachments": [{"collection": "videos", "item": 1}]
            })),
        )
        .unwrap_err();

        let rules: Vec<&str> = error.violations.iter().map(|v| v.rule.as_str()).collect();
        assert_eq!(rules, vec!["relation", "relation", "unknown"]);
    }
}
