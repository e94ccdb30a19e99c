use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One item of a collection as returned to callers.
pub type Item = Map<String, JsonValue>;

/// Result of a read query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResult {
    pub data: Vec<Item>,
    /// Number of matching items before pagination.
    pub total_count: u64,
}
