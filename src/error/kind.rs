use sea_orm::DbErr;
use serde::Serialize;

use super::{AccessError, Error};

/// Machine-distinguishable error kind surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Record missing or hidden by a permission/tenant filter.
    NotFoundOrForbidden,
    /// Role lacks the capability outright.
    PermissionDenied,
    /// Submitted data violates field rules.
    Validation,
    /// Multi-tenant collection accessed without a tenant.
    TenantContext,
    /// Malformed query or unknown schema names.
    InvalidQuery,
    /// Persistence failure (constraint violation, connection loss).
    Integrity,
    /// Bugs, misconfiguration and infrastructure failures.
    Internal,
}

impl Error {
    /// Determine the error kind reported to callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccessError(err) => match err {
                AccessError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
                AccessError::FieldDenied { .. } => ErrorKind::PermissionDenied,
                AccessError::NotFoundOrForbidden { .. } => ErrorKind::NotFoundOrForbidden,
                AccessError::TenantRequired { .. } => ErrorKind::TenantContext,
                AccessError::TenantForbidden { .. } => ErrorKind::PermissionDenied,
            },

            Self::ValidationError(_) => ErrorKind::Validation,

            Self::QueryError(_) => ErrorKind::InvalidQuery,

            Self::DbErr(db_err) => match db_err {
                // Record lookups that came back empty are reported like permission misses
                DbErr::RecordNotFound(_) => ErrorKind::NotFoundOrForbidden,

                // Everything else coming out of the database is a persistence failure:
                // - constraint violations
                // - connection acquisition and connection errors
                // - type conversion errors
                _ => ErrorKind::Integrity,
            },

            // An explicit abort rolled back the transaction, nothing was persisted
            Self::Aborted(_) => ErrorKind::Integrity,

            // Schema and configuration errors - raised during startup
            Self::SchemaError(_) => ErrorKind::Internal,
            Self::ConfigError(_) => ErrorKind::Internal,

            Self::InternalError(_) => ErrorKind::Internal,
            Self::RedisError(_) => ErrorKind::Internal,
            Self::SerdeError(_) => ErrorKind::InvalidQuery,
            Self::IoError(_) => ErrorKind::Internal,
        }
    }
}
