//! Permission entries as supplied by a [`PermissionProvider`](crate::permission::PermissionProvider).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::model::filter::Filter;

/// Capability a permission entry grants on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Action::Create),
            "read" => Some(Action::Read),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role's capability on one collection for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub role: String,
    pub collection: String,
    pub action: Action,
    /// Allowed field patterns; `None` allows every field.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Row condition AND-ed into every query for this action.
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Default values applied on create/update for fields the caller did not submit.
    #[serde(default)]
    pub presets: Map<String, JsonValue>,
}

impl Permission {
    pub fn new(role: impl Into<String>, collection: impl Into<String>, action: Action) -> Self {
        Self {
            role: role.into(),
            collection: collection.into(),
            action,
            fields: None,
            filter: None,
            presets: Map::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_preset(mut self, field: impl Into<String>, value: JsonValue) -> Self {
        self.presets.insert(field.into(), value);
        self
    }
}
