//! SeaORM entities for mimir's own system tables.

pub mod prelude;

pub mod mimir_audit_log;
pub mod mimir_permission;
