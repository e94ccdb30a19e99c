use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::permission::Action;

/// One committed mutation of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub collection: String,
    /// Primary key of the item, as text.
    pub item: String,
    pub action: Action,
    pub before: Option<JsonValue>,
    pub after: Option<JsonValue>,
    pub actor: Option<String>,
    pub tenant: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<entity::mimir_audit_log::Model> for AuditEntry {
    fn from(model: entity::mimir_audit_log::Model) -> Self {
        Self {
            collection: model.collection,
            item: model.item,
            action: Action::parse(&model.action).unwrap_or(Action::Update),
            before: model.before,
            after: model.after,
            actor: model.actor,
            tenant: model.tenant,
            created_at: model.created_at,
        }
    }
}
