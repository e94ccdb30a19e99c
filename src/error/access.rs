//! Access control error types.
//!
//! A role that lacks the capability entirely receives [`AccessError::PermissionDenied`]
//! before any query runs. A record that is missing or hidden by a row filter is reported
//! as [`AccessError::NotFoundOrForbidden`]; callers cannot tell the two apart.

use thiserror::Error;

use crate::model::permission::Action;

#[derive(Error, Debug)]
pub enum AccessError {
    /// The role has no permission entry for this collection and action.
    #[error("Role is not allowed to {action} items in collection \"{collection}\"")]
    PermissionDenied { collection: String, action: Action },
    /// A field in the request is outside the role's allowed-field list.
    #[error("Field \"{field}\" of collection \"{collection}\" is not accessible for {action}")]
    FieldDenied {
        collection: String,
        field: String,
        action: Action,
    },
    /// The record does not exist or is excluded by a permission or tenant filter.
    #[error("Item in collection \"{collection}\" not found or no permission to access it")]
    NotFoundOrForbidden { collection: String },
    /// A multi-tenant collection was accessed without a resolvable tenant id.
    #[error("Collection \"{collection}\" is multi-tenant but no tenant could be resolved")]
    TenantRequired { collection: String },
    /// A caller asked for a tenant other than its own.
    #[error("Not allowed to act on behalf of tenant \"{tenant}\"")]
    TenantForbidden { tenant: String },
}
