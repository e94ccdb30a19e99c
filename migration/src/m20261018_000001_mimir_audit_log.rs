use sea_orm_migration::{prelude::*, schema::*};

static IDX_AUDIT_LOG_COLLECTION_ITEM: &str = "idx-mimir_audit_log-collection-item";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MimirAuditLog::Table)
                    .if_not_exists()
                    .col(pk_auto(MimirAuditLog::Id))
                    .col(string(MimirAuditLog::Collection))
                    .col(string(MimirAuditLog::Item))
                    .col(string(MimirAuditLog::Action))
                    .col(json_null(MimirAuditLog::Before))
                    .col(json_null(MimirAuditLog::After))
                    .col(string_null(MimirAuditLog::Actor))
                    .col(string_null(MimirAuditLog::Tenant))
                    .col(timestamp(MimirAuditLog::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(IDX_AUDIT_LOG_COLLECTION_ITEM)
                    .table(MimirAuditLog::Table)
                    .col(MimirAuditLog::Collection)
                    .col(MimirAuditLog::Item)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_AUDIT_LOG_COLLECTION_ITEM)
                    .table(MimirAuditLog::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(MimirAuditLog::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum MimirAuditLog {
    Table,
    Id,
    Collection,
    Item,
    Action,
    Before,
    After,
    Actor,
    Tenant,
    CreatedAt,
}
