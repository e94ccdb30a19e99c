//! Error types for the mimir engine.
//!
//! This module provides the error taxonomy surfaced to callers of the engine. Domain
//! specific failures (access control, validation, query shape, schema and configuration)
//! live in their own submodules and are aggregated into [`Error`] through `thiserror`'s
//! `#[from]` attribute so the `?` operator works across layers. [`Error::kind`] maps every
//! variant onto the machine-distinguishable [`ErrorKind`] callers branch on.

pub mod access;
pub mod config;
pub mod kind;
pub mod query;
pub mod schema;
pub mod validation;

use thiserror::Error;

pub use access::AccessError;
pub use config::ConfigError;
pub use kind::ErrorKind;
pub use query::QueryError;
pub use schema::SchemaError;
pub use validation::{FieldViolation, ValidationError};

/// Main error type for the engine.
///
/// # Error Categories
/// - Access errors (role lacks the capability, record hidden or missing, tenant missing)
/// - Validation errors (submitted data violates field rules)
/// - Query errors (unknown collection/field/relation, malformed filter or sort)
/// - Schema and configuration errors (raised during startup)
/// - External library errors (database, Redis, JSON)
#[derive(Error, Debug)]
pub enum Error {
    /// Access control failure (permission denied, not found or forbidden, tenant context).
    #[error(transparent)]
    AccessError(#[from] AccessError),
    /// Submitted data violates one or more field rules.
    #[error(transparent)]
    ValidationError(#[from] ValidationError),
    /// The query could not be compiled against the schema catalog.
    #[error(transparent)]
    QueryError(#[from] QueryError),
    /// The schema catalog definition is invalid.
    #[error(transparent)]
    SchemaError(#[from] SchemaError),
    /// Configuration error (missing or invalid environment variables).
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    /// The surrounding transaction was deliberately rolled back.
    #[error("Transaction was aborted: {0}")]
    Aborted(String),
    /// Internal error indicating a bug in the engine.
    #[error("Internal error in mimir, this indicates a bug: {0}")]
    InternalError(String),
    /// Database error (query failures, connection issues, constraint violations).
    #[error(transparent)]
    DbErr(#[from] sea_orm::DbErr),
    /// Redis error raised by the Redis-backed cache provider.
    #[error(transparent)]
    RedisError(#[from] fred::error::Error),
    /// JSON (de)serialization error.
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    /// I/O error while reading catalog or permission files.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for the "not found or no permission" condition.
    pub fn not_found_or_forbidden(collection: &str) -> Self {
        Self::AccessError(AccessError::NotFoundOrForbidden {
            collection: collection.to_string(),
        })
    }

    /// Returns true if the error is an intentional rollback rather than a failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

#[cfg(test)]
impl From<Error> for mimir_test_utils::TestError {
    fn from(err: Error) -> Self {
        mimir_test_utils::TestError::Other(format!("{:?}: {}", err.kind(), err))
    }
}
