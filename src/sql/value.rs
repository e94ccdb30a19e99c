//! Conversion between caller JSON, bound SQL values and decoded rows.

use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::{DbErr, QueryResult, TryGetable, Value};
use serde_json::Value as JsonValue;

use crate::{
    schema::FieldType,
    sql::Dialect,
    util::time::{parse_date, parse_datetime},
};

/// How a selected column is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Field(FieldType),
    /// `COUNT(...)` results.
    Count,
    /// Numeric aggregates cast to double precision.
    Float,
    /// Text expressions such as date buckets.
    Text,
}

pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

pub fn format_date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// Coerces caller JSON into the canonical JSON shape of `field_type`.
///
/// # Returns
/// - `Ok(JsonValue)` - Normalised value (`null` stays `null`)
/// - `Err(String)` - Reason the value does not fit the type
pub fn coerce(field_type: FieldType, value: &JsonValue) -> Result<JsonValue, String> {
    if value.is_null() {
        return Ok(JsonValue::Null);
    }

    match field_type {
        FieldType::Integer | FieldType::BigInteger => {
            let parsed = match value {
                JsonValue::Number(n) => n.as_i64().or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e18)
                        .map(|f| f as i64)
                }),
                JsonValue::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(|| format!("expected an integer, found {}", value))?;
            if field_type == FieldType::Integer && i32::try_from(parsed).is_err() {
                return Err(format!("{} is out of range for a 32-bit integer", parsed));
            }
            Ok(JsonValue::from(parsed))
        }
        FieldType::Float => {
            let parsed = match value {
                JsonValue::Number(n) => n.as_f64(),
                JsonValue::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|f| f.is_finite())
            .ok_or_else(|| format!("expected a number, found {}", value))?;
            Ok(JsonValue::from(parsed))
        }
        FieldType::Boolean => match value {
            JsonValue::Bool(b) => Ok(JsonValue::Bool(*b)),
            JsonValue::Number(n) if n.as_i64() == Some(0) => Ok(JsonValue::Bool(false)),
            JsonValue::Number(n) if n.as_i64() == Some(1) => Ok(JsonValue::Bool(true)),
            JsonValue::String(s) => match s.trim() {
                "true" | "1" => Ok(JsonValue::Bool(true)),
                "false" | "0" => Ok(JsonValue::Bool(false)),
                _ => Err(format!("expected a boolean, found \"{}\"", s)),
            },
            other => Err(format!("expected a boolean, found {}", other)),
        },
        FieldType::String | FieldType::Text => match value {
            JsonValue::String(s) => Ok(JsonValue::String(s.clone())),
            JsonValue::Number(n) => Ok(JsonValue::String(n.to_string())),
            JsonValue::Bool(b) => Ok(JsonValue::String(b.to_string())),
            other => Err(format!("expected a string, found {}", other)),
        },
        FieldType::DateTime => value
            .as_str()
            .and_then(parse_datetime)
            .map(|dt| JsonValue::String(format_datetime(&dt)))
            .ok_or_else(|| format!("expected a timestamp, found {}", value)),
        FieldType::Date => value
            .as_str()
            .and_then(parse_date)
            .map(|d| JsonValue::String(format_date(&d)))
            .ok_or_else(|| format!("expected a date, found {}", value)),
        FieldType::Json => Ok(value.clone()),
    }
}

/// Typed SQL `NULL` for `field_type`.
pub fn null_value(field_type: FieldType, dialect: Dialect) -> Value {
    match field_type {
        FieldType::Integer => Option::<i32>::None.into(),
        FieldType::BigInteger => Option::<i64>::None.into(),
        FieldType::Float => Option::<f64>::None.into(),
        FieldType::Boolean => Option::<bool>::None.into(),
        FieldType::String | FieldType::Text => Option::<String>::None.into(),
        FieldType::DateTime => Option::<NaiveDateTime>::None.into(),
        FieldType::Date => Option::<NaiveDate>::None.into(),
        FieldType::Json => match dialect {
            Dialect::Postgres => Option::<JsonValue>::None.into(),
            Dialect::Sqlite => Option::<String>::None.into(),
        },
    }
}

/// Coerces caller JSON and converts it into a bindable value.
pub fn to_db_value(
    field_type: FieldType,
    value: &JsonValue,
    dialect: Dialect,
) -> Result<Value, String> {
    let coerced = coerce(field_type, value)?;
    if coerced.is_null() {
        return Ok(null_value(field_type, dialect));
    }

    let invalid = || format!("cannot bind {} as {:?}", coerced, field_type);
    let value = match field_type {
        FieldType::Integer => {
            let n = coerced.as_i64().ok_or_else(invalid)?;
            Value::from(i32::try_from(n).map_err(|_| invalid())?)
        }
        FieldType::BigInteger => Value::from(coerced.as_i64().ok_or_else(invalid)?),
        FieldType::Float => Value::from(coerced.as_f64().ok_or_else(invalid)?),
        FieldType::Boolean => Value::from(coerced.as_bool().ok_or_else(invalid)?),
        FieldType::String | FieldType::Text => {
            Value::from(coerced.as_str().ok_or_else(invalid)?.to_string())
        }
        FieldType::DateTime => Value::from(
            coerced
                .as_str()
                .and_then(parse_datetime)
                .ok_or_else(invalid)?,
        ),
        FieldType::Date => Value::from(coerced.as_str().and_then(parse_date).ok_or_else(invalid)?),
        FieldType::Json => dialect.json_value(&coerced),
    };
    Ok(value)
}

fn get<T: TryGetable>(row: &QueryResult, alias: &str) -> Result<Option<T>, DbErr> {
    row.try_get::<Option<T>>("", alias)
}

fn float_json(value: Option<f64>) -> JsonValue {
    value.map(JsonValue::from).unwrap_or(JsonValue::Null)
}

/// Decodes column `alias` of `row` into JSON.
///
/// Backends disagree on the storage class of some values (SQLite keeps whole-valued
/// reals as integers, booleans as integers, timestamps as text), so every kind falls
/// back to the neighbouring representation before giving up.
pub fn decode(row: &QueryResult, alias: &str, kind: ColumnKind) -> Result<JsonValue, DbErr> {
    let value = match kind {
        ColumnKind::Field(FieldType::Integer) => get::<i32>(row, alias)
            .map(|v| v.map(i64::from))
            .or_else(|_| get::<i64>(row, alias))?
            .map(JsonValue::from),
        ColumnKind::Field(FieldType::BigInteger) | ColumnKind::Count => get::<i64>(row, alias)
            .or_else(|_| get::<i32>(row, alias).map(|v| v.map(i64::from)))?
            .map(JsonValue::from),
        ColumnKind::Field(FieldType::Float) | ColumnKind::Float => {
            let value = get::<f64>(row, alias)
                .or_else(|_| get::<i64>(row, alias).map(|v| v.map(|n| n as f64)))
                .or_else(|_| get::<f32>(row, alias).map(|v| v.map(f64::from)))?;
            Some(float_json(value))
        }
        ColumnKind::Field(FieldType::Boolean) => get::<bool>(row, alias)
            .or_else(|_| get::<i64>(row, alias).map(|v| v.map(|n| n != 0)))?
            .map(JsonValue::Bool),
        ColumnKind::Field(FieldType::String) | ColumnKind::Field(FieldType::Text) | ColumnKind::Text => {
            get::<String>(row, alias)?.map(JsonValue::String)
        }
        ColumnKind::Field(FieldType::DateTime) => match get::<NaiveDateTime>(row, alias) {
            Ok(value) => value.map(|dt| JsonValue::String(format_datetime(&dt))),
            Err(_) => get::<String>(row, alias)?.map(|raw| {
                parse_datetime(&raw)
                    .map(|dt| JsonValue::String(format_datetime(&dt)))
                    .unwrap_or(JsonValue::String(raw))
            }),
        },
        ColumnKind::Field(FieldType::Date) => match get::<NaiveDate>(row, alias) {
            Ok(value) => value.map(|d| JsonValue::String(format_date(&d))),
            Err(_) => get::<String>(row, alias)?.map(|raw| {
                parse_date(&raw)
                    .map(|d| JsonValue::String(format_date(&d)))
                    .unwrap_or(JsonValue::String(raw))
            }),
        },
        ColumnKind::Field(FieldType::Json) => match get::<JsonValue>(row, alias) {
            Ok(value) => value,
            Err(_) => get::<String>(row, alias)?
                .map(|raw| serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw))),
        },
    };
    Ok(value.unwrap_or(JsonValue::Null))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn coerces_numbers_and_booleans() {
        assert_eq!(coerce(FieldType::Integer, &json!("42")).unwrap(), json!(42));
        assert_eq!(coerce(FieldType::Integer, &json!(3.0)).unwrap(), json!(3));
        assert!(coerce(FieldType::Integer, &json!(3.5)).is_err());
        assert!(coerce(FieldType::Integer, &json!(4_000_000_000i64)).is_err());
        assert_eq!(coerce(FieldType::Float, &json!("1.5")).unwrap(), json!(1.5));
        assert_eq!(coerce(FieldType::Boolean, &json!("true")).unwrap(), json!(true));
        assert_eq!(coerce(FieldType::Boolean, &json!(0)).unwrap(), json!(false));
        assert!(coerce(FieldType::Boolean, &json!("maybe")).is_err());
    }

    #[test]
    fn normalises_dates() {
        assert_eq!(
            coerce(FieldType::DateTime, &json!("2024-03-01 10:30:00")).unwrap(),
            json!("2024-03-01T10:30:00")
        );
        assert_eq!(
            coerce(FieldType::Date, &json!("2024-03-01T10:30:00")).unwrap(),
            json!("2024-03-01")
        );
        assert!(coerce(FieldType::DateTime, &json!(12)).is_err());
    }

    #[test]
    fn keeps_nulls_and_json() {
        assert_eq!(coerce(FieldType::String, &json!(null)).unwrap(), json!(null));
        assert_eq!(
            coerce(FieldType::Json, &json!({"a": [1]})).unwrap(),
            json!({"a": [1]})
        );
        assert!(coerce(FieldType::String, &json!({"a": 1})).is_err());
    }

    #[test]
    fn binds_json_as_text_on_sqlite() {
        let value = to_db_value(FieldType::Json, &json!({"a": 1}), Dialect::Sqlite).unwrap();
        assert_eq!(value, Value::from("{\"a\":1}".to_string()));
    }
}
