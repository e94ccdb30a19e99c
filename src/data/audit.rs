use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder,
};

use crate::model::audit::AuditEntry;

pub struct AuditLogRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> AuditLogRepository<'a, C> {
    /// Creates a new instance of [`AuditLogRepository`]
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Appends an audit row for a committed mutation
    pub async fn create(&self, entry: &AuditEntry) -> Result<entity::mimir_audit_log::Model, DbErr> {
        let model = entity::mimir_audit_log::ActiveModel {
            collection: ActiveValue::Set(entry.collection.clone()),
            item: ActiveValue::Set(entry.item.clone()),
            action: ActiveValue::Set(entry.action.as_str().to_string()),
            before: ActiveValue::Set(entry.before.clone()),
            after: ActiveValue::Set(entry.after.clone()),
            actor: ActiveValue::Set(entry.actor.clone()),
            tenant: ActiveValue::Set(entry.tenant.clone()),
            created_at: ActiveValue::Set(entry.created_at),
            ..Default::default()
        };

        model.insert(self.db).await
    }

    /// Audit history of one item, oldest first
    pub async fn get_by_item(
        &self,
        collection: &str,
        item: &str,
    ) -> Result<Vec<entity::mimir_audit_log::Model>, DbErr> {
        entity::prelude::MimirAuditLog::find()
            .filter(entity::mimir_audit_log::Column::Collection.eq(collection))
            .filter(entity::mimir_audit_log::Column::Item.eq(item))
            .order_by_asc(entity::mimir_audit_log::Column::Id)
            .all(self.db)
            .await
    }

    /// Audit rows of a collection, oldest first
    pub async fn get_by_collection(
        &self,
        collection: &str,
    ) -> Result<Vec<entity::mimir_audit_log::Model>, DbErr> {
        entity::prelude::MimirAuditLog::find()
            .filter(entity::mimir_audit_log::Column::Collection.eq(collection))
            .order_by_asc(entity::mimir_audit_log::Column::Id)
            .all(self.db)
            .await
    }
}
