use sea_orm_migration::{prelude::*, schema::*};

static IDX_PERMISSION_ROLE_COLLECTION_ACTION: &str = "idx-mimir_permission-role-collection-action";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MimirPermission::Table)
                    .if_not_exists()
                    .col(pk_auto(MimirPermission::Id))
                    .col(string(MimirPermission::Role))
                    .col(string(MimirPermission::Collection))
                    .col(string(MimirPermission::Action))
                    .col(json_null(MimirPermission::Fields))
                    .col(json_null(MimirPermission::Filter))
                    .col(json_null(MimirPermission::Presets))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(IDX_PERMISSION_ROLE_COLLECTION_ACTION)
                    .table(MimirPermission::Table)
                    .col(MimirPermission::Role)
                    .col(MimirPermission::Collection)
                    .col(MimirPermission::Action)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MimirPermission::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum MimirPermission {
    Table,
    Id,
    Role,
    Collection,
    Action,
    Fields,
    Filter,
    Presets,
}
