//! Audit trail port.
//!
//! The mutation pipeline hands every committed item to an [`AuditSink`] once its
//! transaction has committed. Sink failures are logged by the caller and never reach the
//! caller of the mutation.

use async_trait::async_trait;
use sea_orm::DatabaseConnection;

use crate::{data::audit::AuditLogRepository, error::Error, model::audit::AuditEntry};

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entries: &[AuditEntry]) -> Result<(), Error>;
}

/// Writes entries to the `mimir_audit_log` table.
pub struct DatabaseAuditSink {
    db: DatabaseConnection,
}

impl DatabaseAuditSink {
    /// Creates a new instance of [`DatabaseAuditSink`]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for DatabaseAuditSink {
    async fn record(&self, entries: &[AuditEntry]) -> Result<(), Error> {
        let repo = AuditLogRepository::new(&self.db);
        for entry in entries {
            repo.create(entry).await?;
        }
        Ok(())
    }
}

/// Emits entries as `info` events on the `mimir::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entries: &[AuditEntry]) -> Result<(), Error> {
        for entry in entries {
            tracing::info!(
                target: "mimir::audit",
                collection = %entry.collection,
                item = %entry.item,
                action = %entry.action,
                actor = entry.actor.as_deref().unwrap_or("-"),
                tenant = entry.tenant.as_deref().unwrap_or("-"),
                "audit"
            );
        }
        Ok(())
    }
}
