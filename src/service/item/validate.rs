//! Field coercion and rule checks of write payloads.

use std::collections::HashSet;

use serde_json::Value as JsonValue;

use crate::{
    error::{FieldViolation, ValidationError},
    model::item::Item,
    schema::{Collection, Field},
    sql::value::coerce,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

/// Coerces every value of `fields` to its field type and checks the field rules.
///
/// On create, fields required by the schema must be present unless listed in
/// `deferred` (filled in after the insert). All violations are reported together.
pub fn validate(
    schema: &Collection,
    fields: &mut Item,
    mode: Mode,
    deferred: &HashSet<String>,
) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    for (name, value) in fields.iter_mut() {
        let Some(field) = schema.field(name) else {
            violations.push(FieldViolation::new(name, "unknown", "unknown field"));
            continue;
        };
        match coerce(field.field_type, value) {
            Ok(coerced) => *value = coerced,
            Err(reason) => {
                violations.push(FieldViolation::new(name, "type", reason));
                continue;
            }
        }
        check_rules(field, value, &mut violations);
    }

    if mode == Mode::Create {
        for field in schema.fields.values() {
            if !field.is_required_on_create() || deferred.contains(&field.name) {
                continue;
            }
            if !fields.contains_key(&field.name) {
                violations.push(FieldViolation::new(&field.name, "required", "value is required"));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(schema.name.clone(), violations))
    }
}

fn check_rules(field: &Field, value: &JsonValue, violations: &mut Vec<FieldViolation>) {
    let name = field.name.as_str();
    let rules = &field.rules;

    if value.is_null() {
        if rules.required {
            violations.push(FieldViolation::new(name, "required", "value is required"));
        } else if !field.nullable && !field.auto_increment {
            violations.push(FieldViolation::new(name, "nullable", "value cannot be null"));
        }
        return;
    }

    if let Some(number) = value.as_f64().filter(|_| field.field_type.is_numeric()) {
        if let Some(min) = rules.min.filter(|min| number < *min) {
            violations.push(FieldViolation::new(name, "min", format!("must be at least {}", min)));
        }
        if let Some(max) = rules.max.filter(|max| number > *max) {
            violations.push(FieldViolation::new(name, "max", format!("must be at most {}", max)));
        }
    }

    if let Some(text) = value.as_str().filter(|_| field.field_type.is_textual()) {
        let length = text.chars().count();
        if let Some(min) = rules.min_length.filter(|min| length < *min) {
            violations.push(FieldViolation::new(
                name,
                "minLength",
                format!("must be at least {} characters long", min),
            ));
        }
        if let Some(max) = rules.max_length.filter(|max| length > *max) {
            violations.push(FieldViolation::new(
                name,
                "maxLength",
                format!("must be at most {} characters long", max),
            ));
        }
        if let Some(pattern) = &rules.compiled_pattern {
            if !pattern.is_match(text) {
                violations.push(FieldViolation::new(
                    name,
                    "pattern",
                    format!("must match {}", pattern.as_str()),
                ));
            }
        }
    }

    if let Some(choices) = &rules.choices {
        let allowed = choices
            .iter()
            .any(|choice| coerce(field.field_type, choice).as_ref() == Ok(value));
        if !allowed {
            violations.push(FieldViolation::new(name, "choices", "value is not one of the allowed choices"));
        }
    }
}
