use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Storage type of a collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Integer,
    BigInteger,
    Float,
    Boolean,
    String,
    Text,
    DateTime,
    Date,
    Json,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::BigInteger | FieldType::Float
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::BigInteger)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Text)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::DateTime | FieldType::Date)
    }
}

/// Validation rules applied by the mutation pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldRules {
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub choices: Option<Vec<JsonValue>>,
    /// Compiled `pattern`, filled in when the catalog is built.
    #[serde(skip)]
    pub compiled_pattern: Option<Regex>,
}

/// A column of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Filled from the key of the collection's field map.
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Value generated by the database (serial/identity keys).
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub default: Option<JsonValue>,
    #[serde(flatten)]
    pub rules: FieldRules,
}

fn default_true() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            default: None,
            rules: FieldRules::default(),
        }
    }

    /// Whether a create payload must supply a value for this field.
    pub fn is_required_on_create(&self) -> bool {
        if self.auto_increment || self.default.is_some() {
            return false;
        }
        self.rules.required || !self.nullable
    }
}
