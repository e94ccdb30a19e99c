use super::*;

/// Expect live rows of the caller's tenant only, ordered by the requested sort
#[tokio::test]
async fn reads_live_rows_of_the_callers_tenant() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let result = ItemService::new(&state, &caller)
        .read_by_query("posts", &Query::new().fields(["id", "title"]).sort(["id"]))
        .await?;

    assert_eq!(ids(&result.data), vec![json!(1), json!(2)]);
    assert_eq!(result.total_count, 2);
    assert_eq!(result.data[0]["title"], json!("Hello"));
    Ok(())
}

/// Expect the system caller to read every tenant
#[tokio::test]
async fn system_reads_across_tenants() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = Accountability::system();

    let result = ItemService::new(&state, &caller)
        .read_by_query("posts", &Query::new().fields(["id"]).sort(["id"]))
        .await?;

    assert_eq!(ids(&result.data), vec![json!(1), json!(2), json!(3)]);
    Ok(())
}

/// Expect soft-deleted rows only when the query asks for them
#[tokio::test]
async fn includes_deleted_rows_on_request() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let query = Query::new().fields(["id"]).sort(["id"]).with_deleted();
    let result = ItemService::new(&state, &caller).read_by_query("posts", &query).await?;

    assert_eq!(ids(&result.data), vec![json!(1), json!(2), json!(4)]);
    Ok(())
}

/// Expect TenantContext when a multi-tenant collection is read without a tenant
#[tokio::test]
async fn requires_a_tenant() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = Accountability::admin("9");

    let result = ItemService::new(&state, &caller)
        .read_by_query("posts", &Query::new())
        .await;

    assert_eq!(kind(result), ErrorKind::TenantContext);
    Ok(())
}

/// Expect NotFoundOrForbidden for a role without read permission
#[tokio::test]
async fn hides_collections_without_read_permission() -> Result<(), TestError> {
    let test = TestBuilder::new()
        .with_blog_fixtures()
        .with_permission("author", "tags", "read", JsonValue::Null)
        .build()
        .await?;
    let state = state(&test)?;
    let caller = Accountability::user("2", "author").with_tenant(blog::TENANT);
    let items = ItemService::new(&state, &caller);

    assert_eq!(kind(items.read_by_query("posts", &Query::new()).await), ErrorKind::NotFoundOrForbidden);
    assert_eq!(items.read_by_query("tags", &Query::new()).await?.data.len(), 2);
    Ok(())
}

/// Expect the role's row filter, with the caller placeholder resolved, to narrow reads
#[tokio::test]
async fn applies_row_filters() -> Result<(), TestError> {
    let test = TestBuilder::new()
        .with_blog_fixtures()
        .with_permission(
            "author",
            "posts",
            "read",
            json!({"filter": {"author_id": {"eq": "$CURRENT_USER"}}}),
        )
        .build()
        .await?;
    let state = state(&test)?;
    let caller = Accountability::user("2", "author").with_tenant(blog::TENANT);
    let items = ItemService::new(&state, &caller);

    let result = items.read_by_query("posts", &Query::new().fields(["id"])).await?;
    assert_eq!(ids(&result.data), vec![json!(2)]);

    let hidden = items.read_one("posts", &json!(1), &Query::new()).await;
    assert_eq!(kind(hidden), ErrorKind::NotFoundOrForbidden);
    Ok(())
}

/// Expect single- and multi-valued relations to be nested under the relation name
#[tokio::test]
async fn nests_requested_relations() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let query = Query::new().fields(["title", "author.name", "comments.body", "tags.name"]);
    let post = ItemService::new(&state, &caller).read_one("posts", &json!(1), &query).await?;

    assert_eq!(post["title"], json!("Hello"));
    assert_eq!(post["author"]["name"], json!("Ada"));
    assert_eq!(post["comments"].as_array().map(Vec::len), Some(2));
    let mut tags: Vec<&str> = post["tags"]
        .as_array()
        .map(|tags| tags.iter().filter_map(|t| t["name"].as_str()).collect())
        .unwrap_or_default();
    tags.sort();
    assert_eq!(tags, vec!["rust", "sql"]);
    Ok(())
}

/// Expect read_many to follow the order of the keys and skip hidden ones
#[tokio::test]
async fn reads_many_in_key_order() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let items = ItemService::new(&state, &caller)
        .read_many("posts", &[json!(2), json!(3), json!(1)], &Query::new().fields(["title"]))
        .await?;

    let titles: Vec<&JsonValue> = items.iter().map(|item| &item["title"]).collect();
    assert_eq!(titles, vec![&json!("Second"), &json!("Hello")]);
    assert!(!items[0].contains_key("id"));
    Ok(())
}

/// Expect reads to be served from the cache until a mutation touches the table
#[tokio::test]
async fn caches_reads_until_a_mutation() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = Accountability::system();
    let items = ItemService::new(&state, &caller);
    let query = Query::new().fields(["id"]);

    assert_eq!(items.read_by_query("tags", &query).await?.data.len(), 2);

    // written behind the engine's back, so the cached read stays
    test.blog().insert_tag(3, "go").await?;
    assert_eq!(items.read_by_query("tags", &query).await?.data.len(), 2);

    items
        .create_one("tags", object(json!({"name": "zig"})), MutationOptions::default())
        .await?;
    assert_eq!(items.read_by_query("tags", &query).await?.data.len(), 4);
    Ok(())
}

/// Expect one row per group with the aggregate results nested by function
#[tokio::test]
async fn aggregates_per_group() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let query = Query::new()
        .aggregate(Aggregate {
            count: vec!["*".to_string()],
            sum: vec!["views".to_string()],
            ..Default::default()
        })
        .group_by(["status"]);
    let groups = ItemService::new(&state, &caller).aggregate("posts", &query).await?;

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["status"], json!("draft"));
    assert_eq!(groups[0]["count"]["*"], json!(1));
    assert_eq!(groups[1]["status"], json!("published"));
    assert_eq!(groups[1]["sum"]["views"], json!(10.0));
    Ok(())
}

/// Expect unknown fields to be reported as query errors
#[tokio::test]
async fn rejects_unknown_fields() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let result = ItemService::new(&state, &caller)
        .read_by_query("posts", &Query::new().filter(Filter::eq("missing", 1)))
        .await;

    assert_eq!(kind(result), ErrorKind::InvalidQuery);
    Ok(())
}

/// Expect sorting by a multi-valued path to page over parents, one row per post
#[tokio::test]
async fn paginates_without_fanout() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    // post 1 has two comments, its smallest body "Nice" sorts after post 2's "Hmm"
    let query = Query::new().fields(["id"]).sort(["comments.body"]).limit(1);
    let result = ItemService::new(&state, &caller).read_by_query("posts", &query).await?;

    assert_eq!(ids(&result.data), vec![json!(2)]);
    assert_eq!(result.total_count, 2);
    Ok(())
}

/// Expect a missing belongs-to parent to be nested as null
#[tokio::test]
async fn nulls_missing_parents() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let query = Query::new().fields(["name", "favorite_post.title"]);
    let user = ItemService::new(&state, &caller).read_one("users", &json!(1), &query).await?;

    assert_eq!(user["name"], json!("Ada"));
    assert_eq!(user["favorite_post"], JsonValue::Null);
    Ok(())
}

/// Expect polymorphic includes to return only the junction rows of the requested target
#[tokio::test]
async fn loads_only_requested_polymorphic_targets() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    test.blog().attach(1, "links", 1).await?;
    let state = state(&test)?;
    let caller = admin();

    let query = Query::new().fields(["attachments.collection", "attachments.item:images.url"]);
    let post = ItemService::new(&state, &caller).read_one("posts", &json!(1), &query).await?;

    assert_eq!(
        post["attachments"],
        json!([{"collection": "images", "item": {"url": "cover.png"}}])
    );
    assert_eq!(test.count("post_attachments").await?, 2);
    Ok(())
}

/// Expect filters through belongs-to paths combined with sort and limit
#[tokio::test]
async fn filters_through_single_valued_relations() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    let query = Query::new()
        .fields(["id", "author.name"])
        .filter(Filter::eq("author.role", "editor"))
        .sort(["-created_at"])
        .limit(2);
    let result = ItemService::new(&state, &caller).read_by_query("posts", &query).await?;

    assert_eq!(ids(&result.data), vec![json!(1)]);
    assert_eq!(result.data[0]["author"]["name"], json!("Ada"));
    Ok(())
}

/// Expect map-form sort to apply its keys in the order they were written
#[tokio::test]
async fn sorts_by_map_keys_in_order() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let state = state(&test)?;
    let caller = admin();

    // alphabetical key order would sort by id first
    let query = Query::from_json(json!({"fields": ["id"], "sort": {"title": "desc", "id": "asc"}}))
        .map_err(Error::from)?;
    let result = ItemService::new(&state, &caller).read_by_query("posts", &query).await?;

    assert_eq!(ids(&result.data), vec![json!(2), json!(1)]);
    Ok(())
}

/// Expect read_many to return every key even when the configured maximum limit is smaller
#[tokio::test]
async fn reads_many_beyond_the_maximum_limit() -> Result<(), TestError> {
    let test = TestBuilder::new().with_blog_fixtures().build().await?;
    let settings = crate::model::app::EngineSettings {
        limit_max: 1,
        ..Default::default()
    };
    let state = state(&test)?.with_settings(settings);
    let caller = admin();

    let items = ItemService::new(&state, &caller)
        .read_many("posts", &[json!(2), json!(1)], &Query::new().fields(["id"]))
        .await?;

    assert_eq!(ids(&items), vec![json!(2), json!(1)]);
    Ok(())
}
