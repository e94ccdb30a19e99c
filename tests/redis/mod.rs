//! Engine reads cached in Redis/Valkey.
//!
//! Requires a running instance at `VALKEY_URL` (default `redis://127.0.0.1:6379`).

use std::sync::Arc;

use mimir::{
    cache::RedisCache,
    model::{accountability::Accountability, app::AppState, mutation::MutationOptions, query::Query},
    schema::SchemaCatalog,
    Engine,
};
use mimir_test_utils::{prelude::*, RedisTest};
use serde_json::json;

fn redis_engine(test: &TestContext, redis: &RedisTest) -> Engine {
    let catalog = SchemaCatalog::from_json(test.catalog.clone()).expect("Failed to build catalog");
    let cache = RedisCache::new(redis.redis_pool.clone(), redis.namespace());
    let state = AppState::new(test.db.clone(), catalog)
        .expect("Failed to build engine state")
        .with_cache(Arc::new(cache));

    Engine::new(state)
}

async fn tag_count(engine: &Engine) -> usize {
    let caller = Accountability::system();
    engine
        .items(&caller)
        .read_by_query("tags", &Query::new().fields(["id"]))
        .await
        .expect("Failed to read tags")
        .data
        .len()
}

/// Tests that reads are served from Redis until a mutation of the table.
///
/// Expected: rows written behind the engine's back stay invisible until the engine's
/// own create invalidates the cached read
#[tokio::test]
async fn caches_reads_until_a_mutation() {
    let redis = RedisTest::new().await.expect("Failed to create Redis test");
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = redis_engine(&test, &redis);

    assert_eq!(tag_count(&engine).await, 2);
    test.blog().insert_tag(3, "go").await.expect("Failed to insert tag");
    assert_eq!(tag_count(&engine).await, 2);

    let caller = Accountability::system();
    let mut tag = serde_json::Map::new();
    tag.insert("name".to_string(), json!("zig"));
    engine
        .items(&caller)
        .create_one("tags", tag, MutationOptions::default())
        .await
        .expect("Failed to create tag");

    assert_eq!(tag_count(&engine).await, 4);
}

/// Tests that engines sharing a namespace share invalidations.
///
/// Expected: a delete through one engine drops the other engine's cached read
#[tokio::test]
async fn shares_invalidations_across_engines() {
    let redis = RedisTest::new().await.expect("Failed to create Redis test");
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let reader = redis_engine(&test, &redis);
    let writer = redis_engine(&test, &redis);

    assert_eq!(tag_count(&reader).await, 2);

    let caller = Accountability::system();
    writer
        .items(&caller)
        .delete_one("tags", json!(2), MutationOptions::default())
        .await
        .expect("Failed to delete tag");

    assert_eq!(tag_count(&reader).await, 1);
}
