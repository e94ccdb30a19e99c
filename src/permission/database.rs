use std::sync::RwLock;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;

use crate::{
    data::permission::PermissionRepository,
    error::Error,
    model::permission::{Action, Permission},
    permission::{static_provider::PermissionSet, PermissionProvider},
};

/// Permissions stored in the `mimir_permission` table.
///
/// Rows are loaded into memory by [`init`](PermissionProvider::init) and on every
/// [`reload`](DatabasePermissionProvider::reload); lookups never touch the database.
pub struct DatabasePermissionProvider {
    db: DatabaseConnection,
    set: RwLock<PermissionSet>,
}

impl DatabasePermissionProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            set: RwLock::new(PermissionSet::default()),
        }
    }

    /// Re-reads every permission row.
    pub async fn reload(&self) -> Result<usize, Error> {
        let rows = PermissionRepository::new(&self.db).get_all().await?;

        let mut permissions = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(action) = Action::parse(&row.action) else {
                tracing::warn!(
                    id = row.id,
                    action = %row.action,
                    "skipping permission row with unknown action"
                );
                continue;
            };

            let mut permission = Permission::new(row.role, row.collection, action);
            if let Some(fields) = row.fields {
                permission.fields = Some(serde_json::from_value(fields)?);
            }
            if let Some(filter) = row.filter {
                permission.filter = Some(serde_json::from_value(filter)?);
            }
            if let Some(serde_json::Value::Object(presets)) = row.presets {
                permission.presets = presets;
            }
            permissions.push(permission);
        }

        let set = PermissionSet::new(permissions)?;
        let count = set.len();
        *self.set.write().unwrap_or_else(|e| e.into_inner()) = set;

        tracing::info!(count, "loaded permissions from database");
        Ok(count)
    }
}

#[async_trait]
impl PermissionProvider for DatabasePermissionProvider {
    async fn init(&self) -> Result<(), Error> {
        self.reload().await.map(|_| ())
    }

    fn permission(&self, role: &str, collection: &str, action: Action) -> Option<Permission> {
        self.set
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(role, collection, action)
            .cloned()
    }
}
