pub use sea_orm_migration::prelude::*;

mod m20261018_000001_mimir_audit_log;
mod m20261018_000002_mimir_permission;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261018_000001_mimir_audit_log::Migration),
            Box::new(m20261018_000002_mimir_permission::Migration),
        ]
    }
}
