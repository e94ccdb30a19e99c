use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::{accountability::Accountability, permission::Action};

/// Change notification broadcast after a mutation commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub action: Action,
    /// Primary keys of the affected items.
    pub keys: Vec<JsonValue>,
    /// Committed state of created and updated items, `null` for deletes.
    pub payload: JsonValue,
    pub accountability: Option<Accountability>,
}
