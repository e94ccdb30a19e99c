//! Tests for Engine::init and Engine::shutdown
//!
//! Covers provider initialisation with the default in-memory providers and with the
//! database permission provider, whose rows are only visible after init.

use std::sync::Arc;

use mimir::{
    data::permission::PermissionRepository,
    model::{
        accountability::Accountability,
        app::AppState,
        filter::Filter,
        permission::{Action, Permission},
        query::Query,
    },
    permission::DatabasePermissionProvider,
    schema::SchemaCatalog,
    Engine,
};
use mimir_test_utils::prelude::*;
use serde_json::json;

use super::setup_engine;

/// Tests a full init/shutdown cycle with the default providers.
///
/// Expected: both calls succeed
#[tokio::test]
async fn initialises_and_shuts_down() {
    let test = TestBuilder::new().with_blog_tables().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    engine.init().await.expect("Failed to initialise engine");
    engine.shutdown().await.expect("Failed to shut down engine");
}

/// Tests that the database permission provider loads its rows on init.
///
/// Expected: the stored row filter limits the author to their own post
#[tokio::test]
async fn loads_database_permissions_on_init() {
    let test = TestBuilder::new()
        .with_blog_fixtures()
        .with_system_tables()
        .build()
        .await
        .expect("Failed to build test");

    let mut permission = Permission::new("author", "posts", Action::Read);
    permission.filter = Some(
        serde_json::from_value::<Filter>(json!({"author_id": {"eq": "$CURRENT_USER"}}))
            .expect("Failed to parse filter"),
    );
    PermissionRepository::new(&test.db)
        .create(&permission)
        .await
        .expect("Failed to store permission");

    let catalog = SchemaCatalog::from_json(test.catalog.clone()).expect("Failed to build catalog");
    let state = AppState::new(test.db.clone(), catalog)
        .expect("Failed to build engine state")
        .with_permissions(Arc::new(DatabasePermissionProvider::new(test.db.clone())));
    let engine = Engine::new(state);
    let author = Accountability::user("2", "author").with_tenant(blog::TENANT);

    // nothing is loaded before init
    let before = engine.items(&author).read_by_query("posts", &Query::new()).await;
    assert!(before.is_err(), "Reads should be denied before init");

    engine.init().await.expect("Failed to initialise engine");
    let result = engine
        .items(&author)
        .read_by_query("posts", &Query::new().fields(["id"]))
        .await
        .expect("Failed to read posts");

    let ids: Vec<_> = result.data.iter().map(|item| item["id"].clone()).collect();
    assert_eq!(ids, vec![json!(2)]);
}
