use super::*;

async fn read(state: &AppState, collection: &str, key: JsonValue, fields: &[&str]) -> Result<Item, Error> {
    let caller = Accountability::system();
    ItemService::new(state, &caller)
        .read_one(collection, &key, &Query::new().fields(fields.iter().copied()))
        .await
}

/// Expect the payload to be written and the update stamps refreshed
#[tokio::test]
async fn updates_fields_and_stamps() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let key = ItemService::new(&state, &caller)
        .update_one("posts", json!(1), object(json!({"title": "Renamed"})), MutationOptions::default())
        .await?;

    assert_eq!(key, json!(1));
    let post = read(&state, "posts", key, &["title", "updated_by", "created_by", "updated_at"]).await?;
    assert_eq!(post["title"], json!("Renamed"));
    assert_eq!(post["updated_by"], json!("9"));
    assert_eq!(post["created_by"], json!("1"));
    assert!(post["updated_at"].is_string());
    Ok(())
}

/// Expect NotFoundOrForbidden for soft-deleted rows, other tenants and missing keys
#[tokio::test]
async fn hides_rows_outside_the_scope() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();
    let items = ItemService::new(&state, &caller);

    for key in [4, 3, 99] {
        let result = items
            .update_one("posts", json!(key), object(json!({"title": "x"})), MutationOptions::default())
            .await;
        assert_eq!(kind(result), ErrorKind::NotFoundOrForbidden, "key {}", key);
    }
    Ok(())
}

/// Expect nothing to be written when one of several keys is hidden
#[tokio::test]
async fn updates_all_keys_or_none() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let result = ItemService::new(&state, &caller)
        .update_many(
            "posts",
            vec![json!(1), json!(3)],
            object(json!({"title": "Both"})),
            MutationOptions::default(),
        )
        .await;

    assert_eq!(kind(result), ErrorKind::NotFoundOrForbidden);
    let post = read(&state, "posts", json!(1), &["title"]).await?;
    assert_eq!(post["title"], json!("Hello"));
    Ok(())
}

/// Expect the role's update filter to decide which rows are writable
#[tokio::test]
async fn applies_update_filters() -> Result<(), TestError> {
    let test = TestBuilder::new()
        .with_blog_fixtures()
        .with_permission(
            "author",
            "posts",
            "update",
            json!({"filter": {"author_id": {"eq": "$CURRENT_USER"}}}),
        )
        .build()
        .await?;
    let state = state(&test)?;
    let caller = Accountability::user("2", "author").with_tenant(blog::TENANT);
    let items = ItemService::new(&state, &caller);

    let foreign = items
        .update_one("posts", json!(1), object(json!({"title": "Mine now"})), MutationOptions::default())
        .await;
    assert_eq!(kind(foreign), ErrorKind::NotFoundOrForbidden);

    items
        .update_one("posts", json!(2), object(json!({"title": "Edited"})), MutationOptions::default())
        .await?;
    let post = read(&state, "posts", json!(2), &["title", "updated_by"]).await?;
    assert_eq!(post["title"], json!("Edited"));
    assert_eq!(post["updated_by"], json!("2"));
    Ok(())
}

/// Expect clearing or moving the tenant of a row to be refused
#[tokio::test]
async fn refuses_tenant_changes() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();
    let items = ItemService::new(&state, &caller);

    for tenant in [JsonValue::Null, json!(blog::OTHER_TENANT)] {
        let result = items
            .update_one("posts", json!(1), object(json!({"tenant_id": tenant})), MutationOptions::default())
            .await;
        assert!(
            matches!(result, Err(Error::AccessError(AccessError::TenantForbidden { .. }))),
            "{:?}",
            result
        );
    }
    Ok(())
}

/// Expect update_by_query to write only the matching rows of the caller's scope
#[tokio::test]
async fn updates_by_query() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let keys = ItemService::new(&state, &caller)
        .update_by_query(
            "posts",
            &Query::new().filter(Filter::eq("status", "published")),
            object(json!({"views": 0})),
            MutationOptions::default(),
        )
        .await?;

    assert_eq!(keys, vec![json!(1)]);
    let other = read(&state, "posts", json!(3), &["views"]).await?;
    assert_eq!(other["views"], json!(7));
    Ok(())
}

/// Expect a replacing child list to detach children left out, nulling a nullable foreign key
#[tokio::test]
async fn replaces_children() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    ItemService::new(&state, &caller)
        .update_one(
            "posts",
            json!(1),
            object(json!({"comments": [1, {"body": "added"}]})),
            MutationOptions::default(),
        )
        .await?;

    let post = read(&state, "posts", json!(1), &["comments.id"]).await?;
    let mut kept: Vec<i64> = post["comments"]
        .as_array()
        .map(|c| c.iter().filter_map(|c| c["id"].as_i64()).collect())
        .unwrap_or_default();
    kept.sort();
    assert_eq!(kept, vec![1, 4]);

    let detached = read(&state, "comments", json!(2), &["post_id"]).await?;
    assert!(detached["post_id"].is_null());
    assert_eq!(test.count("comments").await?, 4);
    Ok(())
}

/// Expect children left out of a replacing list to be deleted when the foreign key is required
#[tokio::test]
async fn deletes_children_with_required_foreign_keys() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    ItemService::new(&state, &caller)
        .update_one("users", json!(1), object(json!({"posts": []})), MutationOptions::default())
        .await?;

    assert!(test.is_soft_deleted("posts", 1).await?);
    assert!(!test.is_soft_deleted("posts", 2).await?);
    Ok(())
}

/// Expect detailed child changes to create, update and detach only what they list
#[tokio::test]
async fn applies_detailed_child_changes() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    ItemService::new(&state, &caller)
        .update_one(
            "posts",
            json!(1),
            object(json!({"comments": {
                "create": [{"body": "new"}],
                "update": [{"id": 1, "body": "edited"}],
                "delete": [2]
            }})),
            MutationOptions::default(),
        )
        .await?;

    let edited = read(&state, "comments", json!(1), &["body", "post_id"]).await?;
    assert_eq!(edited["body"], json!("edited"));
    assert_eq!(edited["post_id"], json!(1));
    let detached = read(&state, "comments", json!(2), &["post_id"]).await?;
    assert!(detached["post_id"].is_null());
    let untouched = read(&state, "comments", json!(3), &["post_id"]).await?;
    assert_eq!(untouched["post_id"], json!(2));
    Ok(())
}

/// Expect detailed deletes of children owned by another parent to fail
#[tokio::test]
async fn refuses_to_detach_foreign_children() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let result = ItemService::new(&state, &caller)
        .update_one(
            "posts",
            json!(1),
            object(json!({"comments": {"delete": [3]}})),
            MutationOptions::default(),
        )
        .await;

    assert_eq!(kind(result), ErrorKind::NotFoundOrForbidden);
    let comment = read(&state, "comments", json!(3), &["post_id"]).await?;
    assert_eq!(comment["post_id"], json!(2));
    Ok(())
}

/// Expect detailed updates without a primary key to be rejected
#[tokio::test]
async fn requires_keys_for_detailed_updates() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let result = ItemService::new(&state, &caller)
        .update_one(
            "posts",
            json!(1),
            object(json!({"comments": {"update": [{"body": "which one?"}]}})),
            MutationOptions::default(),
        )
        .await;

    let Err(Error::ValidationError(error)) = result else {
        panic!("expected a validation error, got {:?}", result);
    };
    assert_eq!(error.violations[0].field, "comments.id");
    assert_eq!(error.violations[0].rule, "required");
    Ok(())
}

/// Expect a link list to become the exact junction set
#[tokio::test]
async fn replaces_links() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    ItemService::new(&state, &caller)
        .update_one("posts", json!(1), object(json!({"tags": [2]})), MutationOptions::default())
        .await?;

    let post = read(&state, "posts", json!(1), &["tags.name"]).await?;
    let names: Vec<&str> = post["tags"]
        .as_array()
        .map(|tags| tags.iter().filter_map(|t| t["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["sql"]);
    // post 2 keeps its link
    assert_eq!(test.count("post_tags").await?, 2);
    Ok(())
}

/// Expect polymorphic links to be replaced per (collection, key) pair
#[tokio::test]
async fn replaces_polymorphic_links() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    ItemService::new(&state, &caller)
        .update_one(
            "posts",
            json!(1),
            object(json!({"attachments": [
                {"collection": "images", "item": 1},
                {"collection": "links", "item": {"href": "https://mimir.dev"}}
            ]})),
            MutationOptions::default(),
        )
        .await?;

    assert_eq!(test.count("post_attachments").await?, 2);
    assert_eq!(test.count("links").await?, 2);

    ItemService::new(&state, &caller)
        .update_one("posts", json!(1), object(json!({"attachments": null})), MutationOptions::default())
        .await?;
    assert_eq!(test.count("post_attachments").await?, 0);
    Ok(())
}
