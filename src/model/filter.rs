//! Filter AST.
//!
//! Caller filters arrive as JSON objects mapping a field (or dotted relation path) to either
//! a literal value, an operator object, or a logical `AND`/`OR` group. They are parsed once
//! into [`Filter`] so the compiler can match exhaustively instead of probing JSON shapes.
//! Raw SQL fragments are a separate variant that can only be built in code.

use std::fmt;

use sea_orm::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::error::QueryError;

/// Boolean condition tree over collection fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All children must hold. An empty group is vacuous.
    And(Vec<Filter>),
    /// At least one child must hold. An empty group is vacuous.
    Or(Vec<Filter>),
    /// Condition on a field or dotted relation path such as `author.role.name`.
    Field { path: String, condition: Condition },
    /// Pre-built SQL fragment, only constructible in code.
    Raw(RawExpression),
}

/// Right hand side of a field condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Implicit equality (`null` means `IS NULL`, arrays mean `IN`).
    Literal(JsonValue),
    /// Explicit operators, all of which must hold.
    Operators(Vec<(Operator, JsonValue)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    NotLike,
    Ilike,
    NotIlike,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Between,
    NotBetween,
    IsNull,
    IsNotNull,
    Empty,
    NotEmpty,
}

impl Operator {
    const ALL: [Operator; 22] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::NotIn,
        Operator::Like,
        Operator::NotLike,
        Operator::Ilike,
        Operator::NotIlike,
        Operator::Contains,
        Operator::NotContains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Between,
        Operator::NotBetween,
        Operator::IsNull,
        Operator::IsNotNull,
        Operator::Empty,
        Operator::NotEmpty,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Like => "like",
            Operator::NotLike => "notLike",
            Operator::Ilike => "ilike",
            Operator::NotIlike => "notIlike",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::Between => "between",
            Operator::NotBetween => "notBetween",
            Operator::IsNull => "isNull",
            Operator::IsNotNull => "isNotNull",
            Operator::Empty => "empty",
            Operator::NotEmpty => "notEmpty",
        }
    }

    /// Parses an operator key, accepting an optional leading `_` or `$`.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim_start_matches(['_', '$']);
        Self::ALL.iter().copied().find(|op| op.name() == key)
    }

    /// Operators whose value is ignored (`{"isNull": true}`).
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            Operator::IsNull | Operator::IsNotNull | Operator::Empty | Operator::NotEmpty
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SQL fragment with `?` placeholders. `{table}` is replaced by the quoted alias of the
/// table the expression is compiled against.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExpression {
    pub sql: String,
    pub values: Vec<Value>,
}

impl RawExpression {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }
}

const AND_KEYS: [&str; 3] = ["AND", "_and", "and"];
const OR_KEYS: [&str; 3] = ["OR", "_or", "or"];

impl Filter {
    /// Condition on a single field.
    pub fn field(path: impl Into<String>, operator: Operator, value: JsonValue) -> Self {
        Filter::Field {
            path: path.into(),
            condition: Condition::Operators(vec![(operator, value)]),
        }
    }

    /// Implicit-equality condition on a single field.
    pub fn eq(path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Filter::Field {
            path: path.into(),
            condition: Condition::Literal(value.into()),
        }
    }

    /// Parses a caller supplied JSON filter.
    pub fn from_json(value: &JsonValue) -> Result<Self, QueryError> {
        parse_object(value, None)
    }

    /// Conjunction of two optional filters, flattening nested `And` groups.
    pub fn merge_and(left: Option<Filter>, right: Option<Filter>) -> Option<Filter> {
        match (left, right) {
            (None, None) => None,
            (Some(f), None) | (None, Some(f)) => Some(f),
            (Some(l), Some(r)) => {
                let mut children = Vec::new();
                for f in [l, r] {
                    match f {
                        Filter::And(inner) => children.extend(inner),
                        other => children.push(other),
                    }
                }
                Some(Filter::And(children))
            }
        }
    }

    /// Whether the filter holds vacuously (no conditions at all).
    pub fn is_empty(&self) -> bool {
        match self {
            Filter::And(children) | Filter::Or(children) => children.iter().all(Filter::is_empty),
            _ => false,
        }
    }

    /// Every field path referenced by the filter, in order of appearance.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
            Filter::Field { path, .. } => out.push(path),
            Filter::Raw(_) => {}
        }
    }

    /// Whether any condition crosses a relation boundary.
    pub fn has_relation_paths(&self) -> bool {
        self.paths().iter().any(|p| p.contains('.'))
    }

    /// Whether the filter contains raw SQL fragments.
    pub fn has_raw(&self) -> bool {
        match self {
            Filter::And(children) | Filter::Or(children) => children.iter().any(Filter::has_raw),
            Filter::Field { .. } => false,
            Filter::Raw(_) => true,
        }
    }

    /// Returns a copy with every condition value passed through `f`.
    pub fn map_values<F>(&self, f: &F) -> Filter
    where
        F: Fn(&JsonValue) -> JsonValue,
    {
        match self {
            Filter::And(children) => Filter::And(children.iter().map(|c| c.map_values(f)).collect()),
            Filter::Or(children) => Filter::Or(children.iter().map(|c| c.map_values(f)).collect()),
            Filter::Field { path, condition } => Filter::Field {
                path: path.clone(),
                condition: match condition {
                    Condition::Literal(v) => Condition::Literal(map_json(v, f)),
                    Condition::Operators(ops) => Condition::Operators(
                        ops.iter().map(|(op, v)| (*op, map_json(v, f))).collect(),
                    ),
                },
            },
            Filter::Raw(raw) => Filter::Raw(raw.clone()),
        }
    }

    /// Canonical JSON form, used for cache keys and logging.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Filter::And(children) => {
                let mut map = Map::new();
                map.insert(
                    "AND".to_string(),
                    JsonValue::Array(children.iter().map(Filter::to_json).collect()),
                );
                JsonValue::Object(map)
            }
            Filter::Or(children) => {
                let mut map = Map::new();
                map.insert(
                    "OR".to_string(),
                    JsonValue::Array(children.iter().map(Filter::to_json).collect()),
                );
                JsonValue::Object(map)
            }
            Filter::Field { path, condition } => {
                let rhs = match condition {
                    Condition::Literal(v) => v.clone(),
                    Condition::Operators(ops) => {
                        let mut map = Map::new();
                        for (op, v) in ops {
                            map.insert(op.name().to_string(), v.clone());
                        }
                        JsonValue::Object(map)
                    }
                };
                let mut map = Map::new();
                map.insert(path.clone(), rhs);
                JsonValue::Object(map)
            }
            Filter::Raw(raw) => {
                let mut map = Map::new();
                map.insert("$raw".to_string(), JsonValue::String(raw.sql.clone()));
                map.insert(
                    "values".to_string(),
                    JsonValue::Array(
                        raw.values
                            .iter()
                            .map(|v| JsonValue::String(format!("{:?}", v)))
                            .collect(),
                    ),
                );
                JsonValue::Object(map)
            }
        }
    }
}

fn map_json<F>(value: &JsonValue, f: &F) -> JsonValue
where
    F: Fn(&JsonValue) -> JsonValue,
{
    match value {
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(|v| map_json(v, f)).collect()),
        other => f(other),
    }
}

fn join_path(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}.{}", prefix, key),
        None => key.to_string(),
    }
}

fn parse_object(value: &JsonValue, prefix: Option<&str>) -> Result<Filter, QueryError> {
    let JsonValue::Object(map) = value else {
        return Err(QueryError::InvalidFilter(format!(
            "expected an object, found {}",
            value
        )));
    };

    let mut children = Vec::with_capacity(map.len());

    // object keys form an unordered conjunction; sorting keeps the compiled SQL and
    // cache keys independent of how the caller wrote them
    for (key, value) in sorted_entries(map) {
        if AND_KEYS.contains(&key.as_str()) || OR_KEYS.contains(&key.as_str()) {
            let JsonValue::Array(items) = value else {
                return Err(QueryError::InvalidFilter(format!(
                    "logical group \"{}\" must hold an array",
                    key
                )));
            };
            let group = items
                .iter()
                .map(|item| parse_object(item, prefix))
                .collect::<Result<Vec<_>, _>>()?;
            if AND_KEYS.contains(&key.as_str()) {
                children.push(Filter::And(group));
            } else {
                children.push(Filter::Or(group));
            }
            continue;
        }

        if key.is_empty() {
            return Err(QueryError::InvalidFilter("empty field name".to_string()));
        }

        let path = join_path(prefix, key);

        match value {
            JsonValue::Object(inner) if !inner.is_empty() => {
                let operator_keys = inner.keys().filter(|k| Operator::parse(k).is_some()).count();

                if operator_keys == inner.len() {
                    let mut ops = Vec::with_capacity(inner.len());
                    for (op_key, op_value) in sorted_entries(inner) {
                        // counted above, parse cannot fail here
                        if let Some(op) = Operator::parse(op_key) {
                            validate_operand(&path, op, op_value)?;
                            ops.push((op, op_value.clone()));
                        }
                    }
                    children.push(Filter::Field {
                        path,
                        condition: Condition::Operators(ops),
                    });
                } else if operator_keys == 0 {
                    // nested relation object, e.g. {"author": {"role": {"eq": "x"}}}
                    children.push(parse_object(value, Some(&path))?);
                } else {
                    return Err(QueryError::InvalidFilter(format!(
                        "\"{}\" mixes operators and nested fields",
                        path
                    )));
                }
            }
            JsonValue::Object(_) => {
                return Err(QueryError::InvalidFilter(format!(
                    "\"{}\" has an empty condition",
                    path
                )))
            }
            literal => children.push(Filter::Field {
                path,
                condition: Condition::Literal(literal.clone()),
            }),
        }
    }

    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Filter::And(children))
    }
}

fn sorted_entries(map: &Map<String, JsonValue>) -> Vec<(&String, &JsonValue)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn validate_operand(path: &str, op: Operator, value: &JsonValue) -> Result<(), QueryError> {
    match op {
        Operator::In | Operator::NotIn => {
            if !value.is_array() {
                return Err(QueryError::InvalidFilter(format!(
                    "\"{}\": operator {} expects an array",
                    path, op
                )));
            }
        }
        Operator::Between | Operator::NotBetween => {
            let ok = value.as_array().map(|a| a.len() == 2).unwrap_or(false);
            if !ok {
                return Err(QueryError::InvalidFilter(format!(
                    "\"{}\": operator {} expects a two element array",
                    path, op
                )));
            }
        }
        _ => {}
    }
    Ok(())
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Filter::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_literal_as_implicit_equality() {
        let filter = Filter::from_json(&json!({"title": "hello"})).unwrap();
        assert_eq!(filter, Filter::eq("title", "hello"));
    }

    #[test]
    fn key_order_does_not_change_the_filter() {
        let a = Filter::from_json(&json!({"views": {"lt": 5, "gt": 1}, "title": "x"})).unwrap();
        let b = Filter::from_json(&json!({"title": "x", "views": {"gt": 1, "lt": 5}})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.paths(), vec!["title", "views"]);
    }

    #[test]
    fn flattens_nested_relation_objects() {
        let filter = Filter::from_json(&json!({"author": {"role": {"name": {"eq": "editor"}}}}))
            .unwrap();
        assert_eq!(filter.paths(), vec!["author.role.name"]);
        assert!(filter.has_relation_paths());
    }

    #[test]
    fn parses_logical_groups() {
        let filter = Filter::from_json(&json!({
            "OR": [{"status": "draft"}, {"views": {"gt": 10}}]
        }))
        .unwrap();
        let Filter::Or(children) = filter else {
            panic!("expected OR group");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn rejects_mixed_operator_and_field_keys() {
        let result = Filter::from_json(&json!({"author": {"eq": 1, "name": "x"}}));
        assert!(matches!(result, Err(QueryError::InvalidFilter(_))));
    }

    #[test]
    fn rejects_in_without_array() {
        let result = Filter::from_json(&json!({"id": {"in": 3}}));
        assert!(result.is_err());
    }

    #[test]
    fn empty_object_is_vacuous() {
        let filter = Filter::from_json(&json!({})).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn accepts_prefixed_operator_names() {
        assert_eq!(Operator::parse("_eq"), Some(Operator::Eq));
        assert_eq!(Operator::parse("$notIn"), Some(Operator::NotIn));
        assert_eq!(Operator::parse("name"), None);
    }

    #[test]
    fn merge_and_flattens_groups() {
        let merged = Filter::merge_and(
            Some(Filter::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)])),
            Some(Filter::eq("c", 3)),
        )
        .unwrap();
        let Filter::And(children) = merged else {
            panic!("expected AND group");
        };
        assert_eq!(children.len(), 3);
    }
}
