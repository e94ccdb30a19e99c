//! Tests for Engine::execute
//!
//! These tests drive the engine the way the binary host does: one JSON request in, one
//! JSON result out. They cover reads by query and by key, aggregates, every mutation
//! shape, and the error kinds of malformed or forbidden requests.

use mimir::{engine::Request, error::ErrorKind};
use mimir_test_utils::prelude::*;
use serde_json::{json, Value as JsonValue};

use super::setup_engine;

fn request(value: JsonValue) -> Request {
    Request::from_json(value).expect("Failed to parse request")
}

fn tenant_admin() -> JsonValue {
    json!({"user": "9", "admin": true, "tenant": blog::TENANT})
}

/// Tests a paginated read returning the page and the unpaginated total.
///
/// Expected: the newest live post of tenant t1 and a total count of 2
#[tokio::test]
async fn reads_pages_with_total_count() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({
            "op": "read",
            "collection": "posts",
            "query": {"fields": ["id"], "sort": ["-id"], "limit": 1},
            "accountability": tenant_admin()
        })))
        .await
        .expect("Failed to read posts");

    assert_eq!(result, json!({"data": [{"id": 2}], "totalCount": 2}));
}

/// Tests reading one item by key with a nested relation.
///
/// Expected: the item object itself, with its author nested
#[tokio::test]
async fn reads_single_items_by_key() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({
            "op": "read",
            "collection": "posts",
            "key": 1,
            "query": {"fields": ["title", "author.name"]},
            "accountability": tenant_admin()
        })))
        .await
        .expect("Failed to read post");

    assert_eq!(result["title"], json!("Hello"));
    assert_eq!(result["author"]["name"], json!("Ada"));
}

/// Tests that requests without accountability run as the system caller.
///
/// Expected: posts of both tenants are visible
#[tokio::test]
async fn defaults_to_the_system_caller() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({
            "op": "read",
            "collection": "posts",
            "query": {"fields": ["id"], "filter": {"author_id": {"eq": 2}}, "sort": ["id"]}
        })))
        .await
        .expect("Failed to read posts");

    assert_eq!(result["data"], json!([{"id": 2}, {"id": 3}]));
}

/// Tests an aggregate request grouped by tenant.
///
/// Expected: one row per tenant, counting live posts only
#[tokio::test]
async fn aggregates_by_group() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({
            "op": "aggregate",
            "collection": "posts",
            "query": {"aggregate": {"count": ["*"]}, "groupBy": ["tenant_id"]}
        })))
        .await
        .expect("Failed to aggregate posts");

    assert_eq!(
        result,
        json!([
            {"tenant_id": "t1", "count": {"*": 2}},
            {"tenant_id": "t2", "count": {"*": 1}}
        ])
    );
}

/// Tests creating a batch from an array payload.
///
/// Expected: `{"keys": [..]}` with the new primary keys
#[tokio::test]
async fn creates_batches() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({
            "op": "create",
            "collection": "tags",
            "data": [{"name": "go"}, {"name": "zig"}]
        })))
        .await
        .expect("Failed to create tags");

    assert_eq!(result, json!({"keys": [3, 4]}));
    assert_eq!(test.count("tags").await.expect("Failed to count tags"), 4);
}

/// Tests updating the items a query selects.
///
/// Expected: only the draft post is updated
#[tokio::test]
async fn updates_by_query() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({
            "op": "update",
            "collection": "posts",
            "query": {"filter": {"status": {"eq": "draft"}}},
            "data": {"status": "published"}
        })))
        .await
        .expect("Failed to update posts");

    assert_eq!(result, json!({"keys": [2]}));
}

/// Tests a forced delete by keys.
///
/// Expected: the rows are removed from the table
#[tokio::test]
async fn deletes_by_keys() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({
            "op": "delete",
            "collection": "posts",
            "keys": [1, 2],
            "options": {"force": true},
            "accountability": tenant_admin()
        })))
        .await
        .expect("Failed to delete posts");

    assert_eq!(result, json!({"keys": [1, 2]}));
    assert_eq!(test.count("posts").await.expect("Failed to count posts"), 2);
}

/// Tests that deletes without a key, keys or query are refused.
///
/// Expected: InvalidQuery and nothing deleted
#[tokio::test]
async fn refuses_untargeted_mutations() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({"op": "delete", "collection": "tags"})))
        .await;

    let error = result.expect_err("Untargeted delete should fail");
    assert_eq!(error.kind(), ErrorKind::InvalidQuery);
    assert_eq!(test.count("tags").await.expect("Failed to count tags"), 2);
}

/// Tests that create payloads must be objects.
///
/// Expected: Validation
#[tokio::test]
async fn refuses_non_object_payloads() {
    let test = TestBuilder::new().with_blog_fixtures().build().await.expect("Failed to build test");
    let engine = setup_engine(&test);

    let result = engine
        .execute(request(json!({"op": "create", "collection": "tags", "data": "go"})))
        .await;

    assert_eq!(result.expect_err("Scalar payload should fail").kind(), ErrorKind::Validation);
}

/// Tests that a role without read permission sees nothing.
///
/// Expected: NotFoundOrForbidden, while the granted collection stays readable
#[tokio::test]
async fn hides_collections_from_roles_without_permission() {
    let test = TestBuilder::new()
        .with_blog_fixtures()
        .with_permission("author", "tags", "read", JsonValue::Null)
        .build()
        .await
        .expect("Failed to build test");
    let engine = setup_engine(&test);
    let author = json!({"user": "2", "role": "author", "tenant": blog::TENANT});

    let posts = engine
        .execute(request(json!({"op": "read", "collection": "posts", "accountability": author})))
        .await;
    assert_eq!(
        posts.expect_err("Posts should be hidden").kind(),
        ErrorKind::NotFoundOrForbidden
    );

    let tags = engine
        .execute(request(json!({"op": "read", "collection": "tags", "accountability": author})))
        .await
        .expect("Failed to read tags");
    assert_eq!(tags["totalCount"], json!(2));
}
