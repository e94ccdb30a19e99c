//! Declarative test builder.
//!
//! Configuration methods queue tables, fixtures and permission entries; everything is
//! executed by the final `build()` call.

use sea_orm::{sea_query::TableCreateStatement, EntityTrait, Schema};
use serde_json::{json, Value as JsonValue};

use crate::{error::TestError, fixtures::blog, TestContext};

/// Builder for declarative test initialization.
pub struct TestBuilder {
    tables: Vec<TableCreateStatement>,
    include_blog_tables: bool,
    include_system_tables: bool,
    seed_blog: bool,
    permissions: Vec<JsonValue>,
}

impl TestBuilder {
    /// Create a new TestBuilder.
    ///
    /// # Returns
    /// - `TestBuilder` - An empty builder: no tables, no fixtures, no permissions
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            include_blog_tables: false,
            include_system_tables: false,
            seed_blog: false,
            permissions: Vec::new(),
        }
    }

    /// Create the blog demo tables and use the blog catalog.
    pub fn with_blog_tables(mut self) -> Self {
        self.include_blog_tables = true;
        self
    }

    /// Create the blog demo tables and insert the seed rows.
    ///
    /// See [`blog`] for the seeded rows.
    pub fn with_blog_fixtures(mut self) -> Self {
        self.include_blog_tables = true;
        self.seed_blog = true;
        self
    }

    /// Create the `mimir_audit_log` and `mimir_permission` tables.
    pub fn with_system_tables(mut self) -> Self {
        self.include_system_tables = true;
        self
    }

    /// Add a custom entity table to the test database.
    ///
    /// # Arguments
    /// - `entity` - Entity type implementing `EntityTrait`
    ///
    /// # Returns
    /// - `Self` - The builder instance for method chaining
    pub fn with_table<E: EntityTrait>(mut self, entity: E) -> Self {
        let schema = Schema::new(sea_orm::DbBackend::Sqlite);
        self.tables.push(schema.create_table_from_entity(entity));
        self
    }

    /// Grant `role` an action on a collection.
    ///
    /// # Arguments
    /// - `role` - Role the entry applies to
    /// - `collection` - Collection name
    /// - `action` - `create`, `read`, `update` or `delete`
    /// - `rules` - Extra entry keys (`fields`, `filter`, `presets`), or `null`
    ///
    /// # Returns
    /// - `Self` - The builder instance for method chaining
    pub fn with_permission(mut self, role: &str, collection: &str, action: &str, rules: JsonValue) -> Self {
        let mut entry = json!({"role": role, "collection": collection, "action": action});
        if let (Some(entry), JsonValue::Object(rules)) = (entry.as_object_mut(), rules) {
            entry.extend(rules);
        }
        self.permissions.push(entry);
        self
    }

    /// Grant `role` every action on `collection` without restrictions.
    pub fn with_full_access(mut self, role: &str, collection: &str) -> Self {
        for action in ["create", "read", "update", "delete"] {
            self = self.with_permission(role, collection, action, JsonValue::Null);
        }
        self
    }

    /// Build the test context.
    ///
    /// Executes all queued operations in the following order:
    /// 1. Creates database tables (blog tables, system tables, then custom tables)
    /// 2. Inserts the blog seed rows when requested
    ///
    /// # Returns
    /// - `Ok(TestContext)` - Fully configured test environment ready for use
    /// - `Err(TestError::DbErr)` - Table creation or fixture insertion failed
    pub async fn build(self) -> Result<TestContext, TestError> {
        let mut setup = TestContext::new().await?;

        // 1. Create tables
        let mut all_tables = Vec::new();

        if self.include_blog_tables {
            all_tables.extend(blog::tables());
            setup.catalog = blog::catalog();
        }

        if self.include_system_tables {
            let schema = Schema::new(sea_orm::DbBackend::Sqlite);
            all_tables.extend(vec![
                schema.create_table_from_entity(entity::prelude::MimirAuditLog),
                schema.create_table_from_entity(entity::prelude::MimirPermission),
            ]);
        }

        all_tables.extend(self.tables);
        setup.with_tables(all_tables).await?;

        // 2. Insert database fixtures
        if self.seed_blog {
            setup.blog().seed().await?;
        }

        setup.permissions = JsonValue::Array(self.permissions);

        Ok(setup)
    }
}

impl Default for TestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
