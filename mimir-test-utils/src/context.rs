//! Test context structure and utilities.
//!
//! This module provides the `TestContext` returned by `TestBuilder`: an in-memory SQLite
//! database plus the catalog and permission definitions the engine under test should be
//! built from.

use sea_orm::{sea_query::TableCreateStatement, ConnectionTrait, Database, DatabaseConnection};
use serde_json::Value as JsonValue;

use crate::{error::TestError, fixtures::blog::BlogFixtures};

/// Test context structure returned by `TestBuilder`
///
/// The catalog and permissions are kept as JSON so this crate does not depend on mimir;
/// tests turn them into a catalog and permission provider themselves.
///
/// ```ignore
/// let test = TestBuilder::new().with_blog_fixtures().build().await?;
///
/// let catalog = SchemaCatalog::from_json(test.catalog.clone())?;
/// let state = AppState::new(test.db.clone(), catalog)?;
/// ```
pub struct TestContext {
    /// Database connection to in-memory SQLite database
    pub db: DatabaseConnection,
    /// Catalog definition matching the created tables
    pub catalog: JsonValue,
    /// Permission entries, as a JSON array
    pub permissions: JsonValue,
}

impl TestContext {
    /// Create a new test context with an empty in-memory database.
    ///
    /// # Returns
    /// - `Ok(TestContext)` - Context with no tables, an empty catalog and no permissions
    /// - `Err(TestError::DbErr)` - Database connection failed
    pub(crate) async fn new() -> Result<Self, TestError> {
        let db = Database::connect("sqlite::memory:").await?;

        Ok(TestContext {
            db,
            catalog: serde_json::json!({"collections": []}),
            permissions: JsonValue::Array(Vec::new()),
        })
    }

    /// Create database tables from schema statements.
    ///
    /// # Arguments
    /// - `stmts` - Vector of CREATE TABLE statements to execute
    ///
    /// # Returns
    /// - `Ok(())` - All tables created successfully
    /// - `Err(TestError::DbErr)` - Table creation failed
    pub(crate) async fn with_tables(&self, stmts: Vec<TableCreateStatement>) -> Result<(), TestError> {
        for stmt in stmts {
            self.db.execute(&stmt).await?;
        }

        Ok(())
    }

    /// Fixture helpers for the blog tables.
    pub fn blog(&self) -> BlogFixtures<'_> {
        BlogFixtures::new(&self.db)
    }

    /// Number of rows in `table`, soft-deleted rows included.
    pub async fn count(&self, table: &str) -> Result<i64, TestError> {
        let stmt = sea_orm::Statement::from_string(
            self.db.get_database_backend(),
            format!("SELECT COUNT(*) AS n FROM \"{}\"", table),
        );
        let row = self
            .db
            .query_one_raw(stmt)
            .await?
            .ok_or_else(|| TestError::Other(format!("no count for \"{}\"", table)))?;
        Ok(row.try_get::<i64>("", "n")?)
    }

    /// Whether the row `id` of `table` has `deleted_at` set.
    pub async fn is_soft_deleted(&self, table: &str, id: i32) -> Result<bool, TestError> {
        let stmt = sea_orm::Statement::from_string(
            self.db.get_database_backend(),
            format!(
                "SELECT deleted_at IS NOT NULL AS deleted FROM \"{}\" WHERE id = {}",
                table, id
            ),
        );
        let row = self
            .db
            .query_one_raw(stmt)
            .await?
            .ok_or_else(|| TestError::Other(format!("no row {} in \"{}\"", id, table)))?;
        Ok(row.try_get::<i64>("", "deleted")? != 0)
    }
}
