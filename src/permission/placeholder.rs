//! Dynamic values in permission filters and presets.

use serde_json::{Map, Value as JsonValue};

use crate::{
    model::{accountability::Accountability, filter::Filter},
    sql::value::format_datetime,
    util::time,
};

pub const CURRENT_USER: &str = "$CURRENT_USER";
pub const CURRENT_ROLE: &str = "$CURRENT_ROLE";
pub const CURRENT_TENANT: &str = "$CURRENT_TENANT";
pub const NOW: &str = "$NOW";

fn optional(value: &Option<String>) -> JsonValue {
    value
        .as_ref()
        .map(|v| JsonValue::String(v.clone()))
        .unwrap_or(JsonValue::Null)
}

/// Replaces a placeholder string with its value for `identity`; other values pass through.
pub fn resolve_value(value: &JsonValue, identity: &Accountability) -> JsonValue {
    match value.as_str() {
        Some(CURRENT_USER) => optional(&identity.user),
        Some(CURRENT_ROLE) => optional(&identity.role),
        Some(CURRENT_TENANT) => optional(&identity.tenant),
        Some(NOW) => JsonValue::String(format_datetime(&time::now())),
        _ => value.clone(),
    }
}

pub fn resolve_filter(filter: &Filter, identity: &Accountability) -> Filter {
    filter.map_values(&|value| resolve_value(value, identity))
}

pub fn resolve_presets(presets: &Map<String, JsonValue>, identity: &Accountability) -> Map<String, JsonValue> {
    presets
        .iter()
        .map(|(field, value)| (field.clone(), resolve_value(value, identity)))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_identity_placeholders() {
        let identity = Accountability::user("7", "editor").with_tenant("acme");
        let filter = Filter::from_json(&json!({
            "author_id": {"eq": "$CURRENT_USER"},
            "tenant_id": {"in": ["$CURRENT_TENANT", "shared"]}
        }))
        .unwrap();

        let resolved = resolve_filter(&filter, &identity);
        assert_eq!(
            resolved.to_json(),
            json!({"AND": [
                {"author_id": {"eq": "7"}},
                {"tenant_id": {"in": ["acme", "shared"]}}
            ]})
        );
    }

    #[test]
    fn missing_identity_values_become_null() {
        let identity = Accountability::anonymous("public");
        assert_eq!(resolve_value(&json!("$CURRENT_USER"), &identity), json!(null));
        assert_eq!(resolve_value(&json!("$CURRENT_ROLE"), &identity), json!("public"));
        assert!(resolve_value(&json!("$NOW"), &identity).is_string());
    }
}
