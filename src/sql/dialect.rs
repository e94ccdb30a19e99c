use sea_orm::{DbBackend, Value};
use serde_json::Value as JsonValue;

use crate::{error::ConfigError, sql::Fragment};

/// SQL flavour of the connected backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// Truncation unit of a `date:<unit>:<field>` pseudo-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
}

impl DateUnit {
    pub fn parse(unit: &str) -> Option<Self> {
        match unit {
            "year" => Some(DateUnit::Year),
            "month" => Some(DateUnit::Month),
            "week" => Some(DateUnit::Week),
            "day" => Some(DateUnit::Day),
            "hour" => Some(DateUnit::Hour),
            "minute" => Some(DateUnit::Minute),
            _ => None,
        }
    }
}

impl Dialect {
    pub fn from_backend(backend: DbBackend) -> Result<Self, ConfigError> {
        match backend {
            DbBackend::Postgres => Ok(Dialect::Postgres),
            DbBackend::Sqlite => Ok(Dialect::Sqlite),
            other => Err(ConfigError::UnsupportedBackend(format!("{:?}", other))),
        }
    }

    pub fn backend(&self) -> DbBackend {
        match self {
            Dialect::Postgres => DbBackend::Postgres,
            Dialect::Sqlite => DbBackend::Sqlite,
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Case-insensitive `LIKE` with `\` as escape character.
    pub fn ilike(&self, expr: Fragment, pattern: Fragment, negate: bool) -> Fragment {
        let not = if negate { "NOT " } else { "" };
        match self {
            Dialect::Postgres => {
                let mut out = expr;
                out.push_sql(format!(" {}ILIKE ", not));
                out.push(pattern);
                out.push_sql(" ESCAPE '\\'");
                out
            }
            Dialect::Sqlite => {
                let mut out = Fragment::sql("LOWER(");
                out.push(expr);
                out.push_sql(format!(") {}LIKE LOWER(", not));
                out.push(pattern);
                out.push_sql(") ESCAPE '\\'");
                out
            }
        }
    }

    /// `LIKE` with `\` as escape character. Case-sensitive on Postgres only, SQLite's
    /// `LIKE` folds ASCII case.
    pub fn like(&self, expr: Fragment, pattern: Fragment, negate: bool) -> Fragment {
        let mut out = expr;
        out.push_sql(if negate { " NOT LIKE " } else { " LIKE " });
        out.push(pattern);
        out.push_sql(" ESCAPE '\\'");
        out
    }

    /// Text bucket of a timestamp column, e.g. `2024-03` for months.
    pub fn date_bucket(&self, unit: DateUnit, column: Fragment) -> Fragment {
        match self {
            Dialect::Postgres => {
                let format = match unit {
                    DateUnit::Year => "YYYY",
                    DateUnit::Month => "YYYY-MM",
                    DateUnit::Week => "IYYY-IW",
                    DateUnit::Day => "YYYY-MM-DD",
                    DateUnit::Hour => "YYYY-MM-DD HH24",
                    DateUnit::Minute => "YYYY-MM-DD HH24:MI",
                };
                let mut out = Fragment::sql("to_char(");
                out.push(column);
                out.push_sql(format!(", '{}')", format));
                out
            }
            Dialect::Sqlite => {
                let format = match unit {
                    DateUnit::Year => "%Y",
                    DateUnit::Month => "%Y-%m",
                    DateUnit::Week => "%Y-%W",
                    DateUnit::Day => "%Y-%m-%d",
                    DateUnit::Hour => "%Y-%m-%d %H",
                    DateUnit::Minute => "%Y-%m-%d %H:%M",
                };
                let mut out = Fragment::sql(format!("strftime('{}', ", format));
                out.push(column);
                out.push_sql(")");
                out
            }
        }
    }

    pub fn cast_float(&self, expr: Fragment) -> Fragment {
        let target = match self {
            Dialect::Postgres => "DOUBLE PRECISION",
            Dialect::Sqlite => "REAL",
        };
        let mut out = Fragment::sql("CAST(");
        out.push(expr);
        out.push_sql(format!(" AS {})", target));
        out
    }

    pub fn cast_text(&self, expr: Fragment) -> Fragment {
        let mut out = Fragment::sql("CAST(");
        out.push(expr);
        out.push_sql(" AS TEXT)");
        out
    }

    /// Bound representation of a JSON document.
    pub fn json_value(&self, value: &JsonValue) -> Value {
        match self {
            Dialect::Postgres => Value::from(value.clone()),
            Dialect::Sqlite => Value::from(value.to_string()),
        }
    }

    /// Whether `SELECT DISTINCT ON (...)` is available.
    pub fn supports_distinct_on(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}
