use std::time::{Duration, Instant};

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

/// Wrapper around DatabaseTransaction that tracks when it was created and whether it was
/// explicitly aborted
///
/// The mutation pipeline owns one of these per logical call. The age is reported when the
/// transaction ends so slow batches show up in the logs.
pub struct TrackedTransaction {
    txn: DatabaseTransaction,
    pub created_at: Instant,
    aborted: bool,
}

impl TrackedTransaction {
    /// Create a new tracked transaction from a database connection
    pub async fn begin(db: &DatabaseConnection) -> Result<Self, DbErr> {
        Ok(Self {
            txn: db.begin().await?,
            created_at: Instant::now(),
            aborted: false,
        })
    }

    /// Mark the transaction as intentionally abandoned by its owner
    pub fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Commit the underlying transaction
    pub async fn commit(self) -> Result<Duration, DbErr> {
        let age = self.created_at.elapsed();
        self.txn.commit().await?;
        Ok(age)
    }

    /// Roll back the underlying transaction
    ///
    /// Rollback errors of an aborted transaction are logged and swallowed, every other
    /// rollback error is returned.
    pub async fn rollback(self) -> Result<Duration, DbErr> {
        let age = self.created_at.elapsed();
        match self.txn.rollback().await {
            Ok(()) => Ok(age),
            Err(e) if self.aborted => {
                tracing::debug!("ignoring rollback error of aborted transaction: {}", e);
                Ok(age)
            }
            Err(e) => Err(e),
        }
    }

    /// Get a reference to the underlying transaction
    pub fn as_ref(&self) -> &DatabaseTransaction {
        &self.txn
    }
}

#[cfg(test)]
mod tests {
    use mimir_test_utils::prelude::*;
    use sea_orm::ConnectionTrait;

    use super::*;

    /// Expect an aborted transaction to report the flag and discard its writes
    #[tokio::test]
    async fn aborted_transactions_discard_their_writes() -> Result<(), TestError> {
        let test = TestBuilder::new().with_blog_fixtures().build().await?;

        let mut txn = TrackedTransaction::begin(&test.db).await?;
        assert!(!txn.is_aborted());
        txn.as_ref()
            .execute_unprepared("INSERT INTO tags (id, name) VALUES (9, 'draft')")
            .await?;
        txn.mark_aborted();
        assert!(txn.is_aborted());
        txn.rollback().await?;

        assert_eq!(test.count("tags").await?, 2);
        Ok(())
    }
}
