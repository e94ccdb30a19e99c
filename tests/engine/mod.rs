use std::sync::Arc;

use mimir::{model::app::AppState, permission::StaticPermissionProvider, schema::SchemaCatalog, Engine};
use mimir_test_utils::prelude::*;

mod execute;
mod lifecycle;

/// Engine over the test database with the builder's catalog and permission entries
pub fn setup_engine(test: &TestContext) -> Engine {
    let catalog = SchemaCatalog::from_json(test.catalog.clone()).expect("Failed to build catalog");
    let permissions =
        StaticPermissionProvider::from_json(test.permissions.clone()).expect("Failed to load permissions");
    let state = AppState::new(test.db.clone(), catalog)
        .expect("Failed to build engine state")
        .with_permissions(Arc::new(permissions));

    Engine::new(state)
}
