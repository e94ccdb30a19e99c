use sea_orm::{ActiveModelTrait, ActiveValue, ConnectionTrait, DbErr, EntityTrait, QueryOrder};

use crate::model::permission::Permission;

pub struct PermissionRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> PermissionRepository<'a, C> {
    /// Creates a new instance of [`PermissionRepository`]
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Every stored permission row, oldest first
    pub async fn get_all(&self) -> Result<Vec<entity::mimir_permission::Model>, DbErr> {
        entity::prelude::MimirPermission::find()
            .order_by_asc(entity::mimir_permission::Column::Id)
            .all(self.db)
            .await
    }

    /// Stores a permission entry
    pub async fn create(
        &self,
        permission: &Permission,
    ) -> Result<entity::mimir_permission::Model, DbErr> {
        let to_json = |value: serde_json::Result<serde_json::Value>| {
            value.map_err(|e| DbErr::Custom(format!("failed to serialise permission: {}", e)))
        };

        let fields = match &permission.fields {
            Some(fields) => Some(to_json(serde_json::to_value(fields))?),
            None => None,
        };
        let filter = match &permission.filter {
            Some(filter) => Some(to_json(serde_json::to_value(filter))?),
            None => None,
        };
        let presets = if permission.presets.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(permission.presets.clone()))
        };

        let model = entity::mimir_permission::ActiveModel {
            role: ActiveValue::Set(permission.role.clone()),
            collection: ActiveValue::Set(permission.collection.clone()),
            action: ActiveValue::Set(permission.action.as_str().to_string()),
            fields: ActiveValue::Set(fields),
            filter: ActiveValue::Set(filter),
            presets: ActiveValue::Set(presets),
            ..Default::default()
        };

        model.insert(self.db).await
    }
}
