//! Resolved caller identity used for permission and scoping decisions.

use serde::{Deserialize, Serialize};

/// Accountability (security) context of a caller.
///
/// - `system` contexts are internal callers: permission filters and tenant enforcement
///   are both skipped, although an explicit tenant still scopes the query.
/// - `admin` contexts bypass permission filters but remain tenant isolated.
/// - everything else is resolved against the role's permission entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accountability {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub system: bool,
}

impl Accountability {
    /// Internal caller with full access.
    pub fn system() -> Self {
        Self {
            system: true,
            admin: true,
            ..Default::default()
        }
    }

    /// Administrator identified by `user`.
    pub fn admin(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            admin: true,
            ..Default::default()
        }
    }

    /// Regular caller with a role.
    pub fn user(user: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            role: Some(role.into()),
            ..Default::default()
        }
    }

    /// Unauthenticated caller resolved against `role` (usually a public role).
    pub fn anonymous(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Default::default()
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Whether permission filters are skipped for this caller.
    pub fn bypasses_permissions(&self) -> bool {
        self.admin || self.system
    }
}
