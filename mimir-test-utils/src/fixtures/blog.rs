//! Blog demo schema: catalog definition, SQLite tables and seed rows.
//!
//! `users` and `posts` point at each other (`posts.author`, `users.favorite_post`) so the
//! circular create path has something to exercise. `posts` is soft-delete, multi-tenant,
//! user-tracked and manually sortable.
//!
//! Seed rows:
//!
//! | table      | rows                                                                   |
//! |------------|------------------------------------------------------------------------|
//! | users      | 1 Ada (editor), 2 Grace (author), 3 Linus (author)                     |
//! | posts      | 1 Hello (t1, Ada), 2 Second (t1, Grace, draft), 3 Elsewhere (t2, Grace), 4 Removed (t1, Ada, soft-deleted) |
//! | comments   | 1, 2 on post 1; 3 on post 2                                            |
//! | tags       | 1 rust, 2 sql; post 1 has both, post 2 has rust                        |
//! | images     | 1 cover.png, linked from post 1                                        |
//! | links      | 1 https://example.com                                                  |

use sea_orm::{
    sea_query::{Alias, ColumnDef, Expr, ExprTrait, Query, Table, TableCreateStatement},
    ConnectionTrait, DatabaseConnection, Value,
};
use serde_json::{json, Value as JsonValue};

use crate::TestError;

pub const TENANT: &str = "t1";
pub const OTHER_TENANT: &str = "t2";

/// Catalog definition of the blog schema.
pub fn catalog() -> JsonValue {
    json!({
        "collections": [
            {
                "name": "users",
                "fields": {
                    "id": {"type": "integer", "autoIncrement": true},
                    "name": {"type": "string", "nullable": false, "maxLength": 50},
                    "email": {"type": "string", "pattern": "^[^@\\s]+@[^@\\s]+$"},
                    "role": {"type": "string"},
                    "favorite_post_id": {"type": "integer"}
                },
                "relations": {
                    "posts": {"type": "hasMany", "related": "posts", "foreignKey": "author_id"},
                    "favorite_post": {"type": "belongsTo", "related": "posts", "foreignKey": "favorite_post_id"}
                }
            },
            {
                "name": "posts",
                "softDelete": true,
                "multiTenant": true,
                "usertrack": true,
                "sortEnabled": true,
                "fields": {
                    "id": {"type": "integer", "autoIncrement": true},
                    "title": {"type": "string", "nullable": false, "maxLength": 120},
                    "body": {"type": "text"},
                    "status": {"type": "string", "default": "draft", "choices": ["draft", "published"]},
                    "views": {"type": "integer", "default": 0, "min": 0},
                    "author_id": {"type": "integer", "nullable": false},
                    "tenant_id": {"type": "string"},
                    "sort": {"type": "integer"},
                    "created_by": {"type": "string"},
                    "updated_by": {"type": "string"},
                    "created_at": {"type": "dateTime"},
                    "updated_at": {"type": "dateTime"},
                    "deleted_at": {"type": "dateTime"}
                },
                "relations": {
                    "author": {"type": "belongsTo", "related": "users", "foreignKey": "author_id"},
                    "comments": {"type": "hasMany", "related": "comments", "foreignKey": "post_id"},
                    "tags": {
                        "type": "belongsToMany", "related": "tags", "junction": "post_tags",
                        "foreignKey": "post_id", "junctionTargetKey": "tag_id"
                    },
                    "attachments": {
                        "type": "manyToAny", "junction": "post_attachments", "foreignKey": "post_id",
                        "relatedCollections": ["images", "links"]
                    }
                }
            },
            {
                "name": "comments",
                "fields": {
                    "id": {"type": "integer", "autoIncrement": true},
                    "body": {"type": "text", "required": true},
                    "post_id": {"type": "integer"},
                    "author_id": {"type": "integer"}
                },
                "relations": {
                    "post": {"type": "belongsTo", "related": "posts", "foreignKey": "post_id"},
                    "author": {"type": "belongsTo", "related": "users", "foreignKey": "author_id"}
                }
            },
            {
                "name": "tags",
                "fields": {
                    "id": {"type": "integer", "autoIncrement": true},
                    "name": {"type": "string", "nullable": false}
                },
                "relations": {
                    "posts": {
                        "type": "belongsToMany", "related": "posts", "junction": "post_tags",
                        "foreignKey": "tag_id", "junctionTargetKey": "post_id"
                    }
                }
            },
            {
                "name": "post_tags",
                "fields": {
                    "id": {"type": "integer", "autoIncrement": true},
                    "post_id": {"type": "integer"},
                    "tag_id": {"type": "integer"}
                }
            },
            {
                "name": "post_attachments",
                "fields": {
                    "id": {"type": "integer", "autoIncrement": true},
                    "post_id": {"type": "integer"},
                    "collection": {"type": "string"},
                    "item": {"type": "string"}
                }
            },
            {
                "name": "images",
                "fields": {"id": {"type": "integer", "autoIncrement": true}, "url": {"type": "string"}}
            },
            {
                "name": "links",
                "fields": {"id": {"type": "integer", "autoIncrement": true}, "href": {"type": "string"}}
            }
        ]
    })
}

fn id() -> ColumnDef {
    ColumnDef::new(Alias::new("id"))
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn integer(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name)).integer().null().to_owned()
}

fn string(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name)).string().null().to_owned()
}

fn text(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name)).text().null().to_owned()
}

fn date_time(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name)).date_time().null().to_owned()
}

fn table(name: &str, mut columns: Vec<ColumnDef>) -> TableCreateStatement {
    let mut stmt = Table::create();
    stmt.table(Alias::new(name)).if_not_exists().col(&mut id());
    for column in columns.iter_mut() {
        stmt.col(column);
    }
    stmt.to_owned()
}

/// CREATE TABLE statements of the blog schema.
///
/// Columns the catalog declares non-nullable stay nullable in SQLite so the engine's own
/// validation, not the database, is what rejects missing values.
pub fn tables() -> Vec<TableCreateStatement> {
    vec![
        table(
            "users",
            vec![string("name"), string("email"), string("role"), integer("favorite_post_id")],
        ),
        table(
            "posts",
            vec![
                string("title"),
                text("body"),
                string("status"),
                integer("views"),
                integer("author_id"),
                string("tenant_id"),
                integer("sort"),
                string("created_by"),
                string("updated_by"),
                date_time("created_at"),
                date_time("updated_at"),
                date_time("deleted_at"),
            ],
        ),
        table("comments", vec![text("body"), integer("post_id"), integer("author_id")]),
        table("tags", vec![string("name")]),
        table("post_tags", vec![integer("post_id"), integer("tag_id")]),
        table(
            "post_attachments",
            vec![integer("post_id"), string("collection"), string("item")],
        ),
        table("images", vec![string("url")]),
        table("links", vec![string("href")]),
    ]
}

/// Row-level fixture helpers for the blog tables.
pub struct BlogFixtures<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> BlogFixtures<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert one row into `table`.
    ///
    /// # Arguments
    /// - `table` - Table to insert into
    /// - `row` - Column names and values, in matching order
    ///
    /// # Returns
    /// - `Ok(())` - Row inserted
    /// - `Err(TestError::DbErr)` - Insert failed
    pub async fn insert_row(&self, table: &str, row: Vec<(&str, Value)>) -> Result<(), TestError> {
        let (columns, values): (Vec<_>, Vec<_>) = row.into_iter().unzip();
        let stmt = Query::insert()
            .into_table(Alias::new(table))
            .columns(columns.into_iter().map(Alias::new))
            .values_panic(values.into_iter().map(Into::into))
            .to_owned();

        self.db.execute(&stmt).await?;
        Ok(())
    }

    pub async fn insert_user(&self, id: i32, name: &str, role: &str) -> Result<(), TestError> {
        self.insert_row(
            "users",
            vec![("id", id.into()), ("name", name.into()), ("role", role.into())],
        )
        .await
    }

    /// Insert a post owned by `author_id` in `tenant`, stamped as created by the author.
    pub async fn insert_post(
        &self,
        id: i32,
        title: &str,
        author_id: i32,
        tenant: &str,
        status: &str,
        views: i32,
        sort: i32,
    ) -> Result<(), TestError> {
        let now = chrono::Utc::now().naive_utc();
        self.insert_row(
            "posts",
            vec![
                ("id", id.into()),
                ("title", title.into()),
                ("status", status.into()),
                ("views", views.into()),
                ("author_id", author_id.into()),
                ("tenant_id", tenant.into()),
                ("sort", sort.into()),
                ("created_by", author_id.to_string().into()),
                ("created_at", now.into()),
                ("updated_at", now.into()),
            ],
        )
        .await
    }

    /// Stamp `deleted_at` on a post.
    pub async fn soft_delete_post(&self, id: i32) -> Result<(), TestError> {
        let stmt = Query::update()
            .table(Alias::new("posts"))
            .value(Alias::new("deleted_at"), chrono::Utc::now().naive_utc())
            .and_where(Expr::col(Alias::new("id")).eq(id))
            .to_owned();

        self.db.execute(&stmt).await?;
        Ok(())
    }

    pub async fn insert_comment(&self, id: i32, body: &str, post_id: i32, author_id: i32) -> Result<(), TestError> {
        self.insert_row(
            "comments",
            vec![
                ("id", id.into()),
                ("body", body.into()),
                ("post_id", post_id.into()),
                ("author_id", author_id.into()),
            ],
        )
        .await
    }

    pub async fn insert_tag(&self, id: i32, name: &str) -> Result<(), TestError> {
        self.insert_row("tags", vec![("id", id.into()), ("name", name.into())]).await
    }

    pub async fn link_tag(&self, post_id: i32, tag_id: i32) -> Result<(), TestError> {
        self.insert_row(
            "post_tags",
            vec![("post_id", post_id.into()), ("tag_id", tag_id.into())],
        )
        .await
    }

    /// Attach an item of `collection` to a post through the polymorphic junction.
    pub async fn attach(&self, post_id: i32, collection: &str, item: i32) -> Result<(), TestError> {
        self.insert_row(
            "post_attachments",
            vec![
                ("post_id", post_id.into()),
                ("collection", collection.into()),
                ("item", item.to_string().into()),
            ],
        )
        .await
    }

    /// Insert the seed rows listed in the module documentation.
    pub async fn seed(&self) -> Result<(), TestError> {
        self.insert_user(1, "Ada", "editor").await?;
        self.insert_user(2, "Grace", "author").await?;
        self.insert_user(3, "Linus", "author").await?;

        self.insert_post(1, "Hello", 1, TENANT, "published", 10, 1).await?;
        self.insert_post(2, "Second", 2, TENANT, "draft", 5, 2).await?;
        self.insert_post(3, "Elsewhere", 2, OTHER_TENANT, "published", 7, 1).await?;
        self.insert_post(4, "Removed", 1, TENANT, "published", 1, 3).await?;
        self.soft_delete_post(4).await?;

        self.insert_comment(1, "Nice", 1, 2).await?;
        self.insert_comment(2, "Thanks", 1, 1).await?;
        self.insert_comment(3, "Hmm", 2, 3).await?;

        self.insert_tag(1, "rust").await?;
        self.insert_tag(2, "sql").await?;
        self.link_tag(1, 1).await?;
        self.link_tag(1, 2).await?;
        self.link_tag(2, 1).await?;

        self.insert_row("images", vec![("id", 1.into()), ("url", "cover.png".into())]).await?;
        self.insert_row("links", vec![("id", 1.into()), ("href", "https://example.com".into())])
            .await?;
        self.attach(1, "images", 1).await?;

        Ok(())
    }
}
