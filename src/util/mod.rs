pub mod time;

use serde_json::Value as JsonValue;

/// Canonical string for matching key values across sources, so that `1` read from an
/// integer column and `"1"` read from a polymorphic item column compare equal.
pub fn key_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Some(format!("{}", f as i64))
            }
            _ => Some(n.to_string()),
        },
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// JSON text with object keys sorted at every level.
pub fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn key_strings_match_across_representations() {
        assert_eq!(key_string(&json!(1)), key_string(&json!("1")));
        assert_eq!(key_string(&json!(1.0)), Some("1".to_string()));
        assert_eq!(key_string(&json!(null)), None);
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let a = canonical_json(&json!({"b": 1, "a": {"d": [1, 2], "c": null}}));
        assert_eq!(a, r#"{"a":{"c":null,"d":[1,2]},"b":1}"#);
    }
}
