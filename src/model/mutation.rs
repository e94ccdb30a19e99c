//! Mutation options and the per-item pipeline state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Options accepted by every create/update/delete call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MutationOptions {
    /// Skip role permissions for this call (tenant isolation still applies).
    pub bypass_permissions: bool,
    /// Hard-delete rows of soft-delete collections.
    pub force: bool,
}

impl MutationOptions {
    pub fn bypass_permissions() -> Self {
        Self {
            bypass_permissions: true,
            ..Default::default()
        }
    }

    pub fn force() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }
}

/// Stage an item has reached in the mutation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Validating,
    PermissionChecked,
    RelationDecomposed,
    Persisted,
    RelationsAttached,
    Committed,
    AuditedAndNotified,
    RolledBack,
}

impl MutationState {
    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_advance_to(&self, next: MutationState) -> bool {
        use MutationState::*;
        match (self, next) {
            (Committed | AuditedAndNotified | RolledBack, RolledBack) => false,
            (_, RolledBack) => true,
            (Pending, Validating)
            | (Validating, PermissionChecked)
            | (PermissionChecked, RelationDecomposed)
            | (RelationDecomposed, Persisted)
            | (Persisted, RelationsAttached)
            | (RelationsAttached, Committed)
            | (Committed, AuditedAndNotified) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationState::Pending => "pending",
            MutationState::Validating => "validating",
            MutationState::PermissionChecked => "permission-checked",
            MutationState::RelationDecomposed => "relation-decomposed",
            MutationState::Persisted => "persisted",
            MutationState::RelationsAttached => "relations-attached",
            MutationState::Committed => "committed",
            MutationState::AuditedAndNotified => "audited-and-notified",
            MutationState::RolledBack => "rolled-back",
        };
        f.write_str(name)
    }
}
