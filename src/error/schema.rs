//! Schema catalog error types.
//!
//! These errors are raised once at startup while the catalog definition is loaded and
//! validated. A process with an invalid catalog must not start serving queries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Collection \"{0}\" is defined more than once")]
    DuplicateCollection(String),
    #[error("Collection \"{collection}\" declares primary key \"{field}\" which is not one of its fields")]
    MissingPrimaryKey { collection: String, field: String },
    #[error("Relation \"{collection}.{relation}\" is invalid: {reason}")]
    InvalidRelation {
        collection: String,
        relation: String,
        reason: String,
    },
    #[error("Collection \"{collection}\" is invalid: {reason}")]
    InvalidCollection { collection: String, reason: String },
    #[error("Invalid field pattern \"{pattern}\": {reason}")]
    InvalidFieldPattern { pattern: String, reason: String },
    #[error("Invalid identifier \"{0}\": only ASCII letters, digits and underscores are allowed")]
    InvalidIdentifier(String),
}
