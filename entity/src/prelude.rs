pub use super::mimir_audit_log::Entity as MimirAuditLog;
pub use super::mimir_permission::Entity as MimirPermission;
