//! Validation error types.
//!
//! Field-level rule violations are gathered for a whole payload and reported together
//! instead of failing on the first one.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A single rule violation for one submitted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Field (or dotted relation path) the violation applies to.
    pub field: String,
    /// Human readable description.
    pub message: String,
    /// Rule identifier (`required`, `type`, `min`, `max`, `pattern`, ...).
    pub rule: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.rule, self.message)
    }
}

/// Collected field violations for a payload in `collection`.
#[derive(Error, Debug)]
#[error("Validation failed for collection \"{collection}\": {}", format_violations(.violations))]
pub struct ValidationError {
    pub collection: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(collection: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        Self {
            collection: collection.into(),
            violations,
        }
    }

    /// Prefixes every violation's field with `prefix.`, used for nested relation payloads.
    pub fn nested_under(mut self, prefix: &str) -> Self {
        for violation in &mut self.violations {
            violation.field = format!("{}.{}", prefix, violation.field);
        }
        self
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
