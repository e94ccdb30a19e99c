use std::sync::Arc;

use mimir_test_utils::prelude::*;
use serde_json::{json, Value as JsonValue};

use super::*;
use crate::{
    error::{AccessError, ErrorKind},
    model::{filter::Filter, query::Aggregate},
    permission::StaticPermissionProvider,
    schema::SchemaCatalog,
};

mod read;
mod update;

/// Engine state over the test database with the builder's permission entries.
fn state(test: &TestContext) -> Result<AppState, Error> {
    let catalog = SchemaCatalog::from_json(test.catalog.clone())?;
    let permissions = StaticPermissionProvider::from_json(test.permissions.clone())?;
    Ok(AppState::new(test.db.clone(), catalog)?.with_permissions(Arc::new(permissions)))
}

/// Administrator of the seeded tenant.
fn admin() -> Accountability {
    Accountability::admin("9").with_tenant(blog::TENANT)
}

fn object(value: JsonValue) -> Item {
    match value {
        JsonValue::Object(item) => item,
        other => panic!("expected an object, got {}", other),
    }
}

fn ids(items: &[Item]) -> Vec<JsonValue> {
    items.iter().map(|item| item["id"].clone()).collect()
}

fn kind<T: std::fmt::Debug>(result: Result<T, Error>) -> ErrorKind {
    match result {
        Ok(value) => panic!("expected an error, got {:?}", value),
        Err(e) => e.kind(),
    }
}
