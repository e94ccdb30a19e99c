//! Query compilation.
//!
//! [`SqlCompiler`] turns filters, sort terms and relation paths into SQL fragments
//! against one base table, collecting the joins they need in a [`JoinAccumulator`].
//! The [`expand`] module builds the include tree from the requested fields and the
//! [`planner`] combines both into an executable [`QueryPlan`](plan::QueryPlan).

pub mod aggregate;
pub mod expand;
pub mod filter;
pub mod join;
pub mod keys;
pub mod plan;
pub mod planner;
pub mod select;
pub mod sort;

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{AccessError, Error, QueryError},
    model::{filter::Filter, permission::Action},
    permission::Access,
    schema::{collection::DELETED_AT, FieldType, Relation, RelationKind, SchemaCatalog},
    sql::{quote, Dialect, Fragment},
};

use join::{child_alias, junction_alias, Join, JoinAccumulator, JoinKind};

/// Deepest nesting of permission and relation-condition subqueries.
const MAX_SUBQUERY_DEPTH: usize = 4;

/// A table (or joined alias) expressions are compiled against.
#[derive(Debug, Clone)]
pub struct TableRef {
    pub collection: String,
    pub alias: String,
    /// Relation path from the root collection, empty for the root.
    pub path: String,
    /// Set on polymorphic junction aliases, where `item:<collection>` segments are valid.
    pub any: Option<Relation>,
}

impl TableRef {
    pub fn new(collection: impl Into<String>, alias: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            alias: alias.into(),
            path: path.into(),
            any: None,
        }
    }

    fn child_path(&self, segment: &str) -> String {
        if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.path, segment)
        }
    }
}

/// A resolved column expression.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub expr: Fragment,
    pub field_type: FieldType,
}

pub struct SqlCompiler<'a> {
    access: &'a Access<'a>,
    dialect: Dialect,
    paranoid: bool,
    /// Per relation path conditions, keyed by the full path from the root.
    rel_conditions: Option<&'a BTreeMap<String, Filter>>,
    /// Apply tenant and read-permission predicates to joined tables.
    scoped: bool,
    /// Check field permissions and readability of traversed relations.
    enforce_fields: bool,
    depth: usize,
    joins: JoinAccumulator,
    tables: BTreeSet<String>,
}

impl<'a> SqlCompiler<'a> {
    /// Creates a new instance of [`SqlCompiler`] that scopes joins and enforces field
    /// permissions.
    pub fn new(access: &'a Access<'a>, dialect: Dialect, paranoid: bool) -> Self {
        Self {
            access,
            dialect,
            paranoid,
            rel_conditions: None,
            scoped: true,
            enforce_fields: true,
            depth: 0,
            joins: JoinAccumulator::new(),
            tables: BTreeSet::new(),
        }
    }

    pub fn with_rel_conditions(mut self, rel_conditions: &'a BTreeMap<String, Filter>) -> Self {
        self.rel_conditions = Some(rel_conditions);
        self
    }

    /// Compiler for a nested subquery. Joins inside it are only soft-delete scoped.
    pub fn detached(&self, enforce_fields: bool) -> Result<SqlCompiler<'a>, Error> {
        if self.depth >= MAX_SUBQUERY_DEPTH {
            return Err(QueryError::InvalidFilter(
                "permission filters nest too deeply".to_string(),
            )
            .into());
        }
        Ok(SqlCompiler {
            access: self.access,
            dialect: self.dialect,
            paranoid: self.paranoid,
            rel_conditions: None,
            scoped: false,
            enforce_fields,
            depth: self.depth + 1,
            joins: JoinAccumulator::new(),
            tables: BTreeSet::new(),
        })
    }

    pub fn access(&self) -> &'a Access<'a> {
        self.access
    }

    pub fn catalog(&self) -> &'a SchemaCatalog {
        self.access.catalog()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn joins(&self) -> &JoinAccumulator {
        &self.joins
    }

    pub fn tables(&self) -> &BTreeSet<String> {
        &self.tables
    }

    pub fn into_parts(self) -> (JoinAccumulator, BTreeSet<String>) {
        (self.joins, self.tables)
    }

    /// Turns field enforcement on or off, returning the previous setting.
    pub fn set_enforcement(&mut self, enforce: bool) -> bool {
        std::mem::replace(&mut self.enforce_fields, enforce)
    }

    /// Registers the table of `collection` as read by this query.
    pub fn note_collection(&mut self, collection: &str) -> Result<(), Error> {
        let table = self.catalog().get_table(collection)?;
        self.tables.insert(table.to_string());
        Ok(())
    }

    fn field_denied(collection: &str, field: &str) -> Error {
        AccessError::FieldDenied {
            collection: collection.to_string(),
            field: field.to_string(),
            action: Action::Read,
        }
        .into()
    }

    fn check_field(&self, collection: &str, names: &[&str]) -> Result<(), Error> {
        if !self.enforce_fields {
            return Ok(());
        }
        let allowed = names
            .iter()
            .any(|name| self.access.field_allowed(collection, Action::Read, name));
        if allowed {
            Ok(())
        } else {
            Err(Self::field_denied(collection, names.first().copied().unwrap_or_default()))
        }
    }

    fn check_target(&self, from: &str, segment: &str, target: &str) -> Result<(), Error> {
        if self.enforce_fields && !self.access.can(target, Action::Read) {
            return Err(Self::field_denied(from, segment));
        }
        Ok(())
    }

    /// Joins relation `segment` of `from`, reusing an existing join with the same alias.
    pub fn join_relation(
        &mut self,
        from: &TableRef,
        segment: &str,
        kind: JoinKind,
        for_include: bool,
    ) -> Result<TableRef, Error> {
        let catalog = self.catalog();
        let alias = child_alias(&from.alias, segment);
        let path = from.child_path(segment);

        if let Some(target) = segment.strip_prefix("item:") {
            let relation = from
                .any
                .clone()
                .ok_or_else(|| QueryError::InvalidFieldPath(path.clone()))?;
            if !relation.related_collections.iter().any(|c| c == target) {
                return Err(QueryError::UnknownRelation {
                    collection: from.collection.clone(),
                    relation: segment.to_string(),
                }
                .into());
            }
            self.check_target(&from.collection, segment, target)?;
            let pk = catalog.get_primary_key(target)?;

            let mut on = self.dialect.cast_text(Fragment::column(&alias, pk));
            on.push_sql(" = ");
            on.push(Fragment::column(&from.alias, &relation.item_key));
            on.push_sql(" AND ");
            on.push(Fragment::column(&from.alias, &relation.discriminator));
            on.push_sql(" = ");
            on.push_value(target.to_string());

            return self.add_join(target, &alias, &path, on, kind, false, for_include);
        }

        let relation = catalog.get_relation(&from.collection, segment)?.clone();
        let source_pk = catalog.get_primary_key(&from.collection)?;

        match relation.kind {
            RelationKind::BelongsTo => {
                self.check_field(&from.collection, &[segment, &relation.foreign_key])?;
                let target = relation.related().unwrap_or_default();
                self.check_target(&from.collection, segment, target)?;
                let target_key = match &relation.target_key {
                    Some(key) => key.as_str(),
                    None => catalog.get_primary_key(target)?,
                };

                let mut on = Fragment::column(&alias, target_key);
                on.push_sql(" = ");
                on.push(Fragment::column(&from.alias, &relation.foreign_key));
                self.add_join(target, &alias, &path, on, kind, false, for_include)
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                self.check_field(&from.collection, &[segment])?;
                let target = relation.related().unwrap_or_default();
                self.check_target(&from.collection, segment, target)?;
                let source_key = relation.target_key.as_deref().unwrap_or(source_pk);

                let mut on = Fragment::column(&alias, &relation.foreign_key);
                on.push_sql(" = ");
                on.push(Fragment::column(&from.alias, source_key));
                let multi = relation.kind == RelationKind::HasMany;
                self.add_join(target, &alias, &path, on, kind, multi, for_include)
            }
            RelationKind::BelongsToMany => {
                self.check_field(&from.collection, &[segment])?;
                let target = relation.related().unwrap_or_default();
                let junction = relation.junction().unwrap_or_default();
                self.check_target(&from.collection, segment, junction)?;
                self.check_target(&from.collection, segment, target)?;
                let source_key = relation.target_key.as_deref().unwrap_or(source_pk);
                let junction_target_key = relation.junction_target_key.as_deref().unwrap_or_default();
                let j_alias = junction_alias(&alias);

                let mut on = Fragment::column(&j_alias, &relation.foreign_key);
                on.push_sql(" = ");
                on.push(Fragment::column(&from.alias, source_key));
                self.add_join(junction, &j_alias, &path, on, kind, true, for_include)?;

                let target_pk = catalog.get_primary_key(target)?;
                let mut on = Fragment::column(&alias, target_pk);
                on.push_sql(" = ");
                on.push(Fragment::column(&j_alias, junction_target_key));
                self.add_join(target, &alias, &path, on, kind, true, for_include)
            }
            RelationKind::ManyToAny => {
                self.check_field(&from.collection, &[segment])?;
                let junction = relation.junction().unwrap_or_default().to_string();
                self.check_target(&from.collection, segment, &junction)?;
                let source_key = relation.target_key.as_deref().unwrap_or(source_pk);

                let mut on = Fragment::column(&alias, &relation.foreign_key);
                on.push_sql(" = ");
                on.push(Fragment::column(&from.alias, source_key));
                let mut target =
                    self.add_join(&junction, &alias, &path, on, kind, true, for_include)?;
                target.any = Some(relation);
                Ok(target)
            }
        }
    }

    /// Registers a join. The ON clause of an alias is always built from the same parts
    /// (link condition, target scope, relation condition for its path), so a later
    /// request for the same alias only needs to widen its flags.
    #[allow(clippy::too_many_arguments)]
    fn add_join(
        &mut self,
        collection: &str,
        alias: &str,
        path: &str,
        link: Fragment,
        kind: JoinKind,
        multi_valued: bool,
        for_include: bool,
    ) -> Result<TableRef, Error> {
        let target = TableRef::new(collection, alias, path);

        if let Some(existing) = self.joins.get_mut(alias) {
            if kind == JoinKind::Inner {
                existing.kind = JoinKind::Inner;
            }
            existing.for_include |= for_include;
            existing.multi_valued |= multi_valued;
            return Ok(target);
        }

        let table = self.catalog().get_table(collection)?.to_string();
        self.tables.insert(table.clone());

        let mut parts = vec![link];
        if self.scoped {
            if let Some(scope) = self.scope_condition(&target, false)? {
                parts.push(scope);
            }
        } else if let Some(hidden) = self.soft_delete_condition(&target) {
            parts.push(hidden);
        }
        if let Some(condition) = self.rel_conditions.and_then(|m| m.get(path)) {
            if let Some(compiled) = self.relation_condition(&target, condition)? {
                parts.push(compiled);
            }
        }

        let on = Fragment::and(parts).unwrap_or_else(|| Fragment::sql("1 = 1"));
        self.joins.insert(Join {
            alias: alias.to_string(),
            table,
            kind,
            on,
            multi_valued,
            for_include,
        });
        Ok(target)
    }

    /// `"alias"."deleted_at" IS NULL` for soft-delete collections while deleted rows are hidden.
    pub fn soft_delete_condition(&self, target: &TableRef) -> Option<Fragment> {
        if !self.paranoid || !self.catalog().is_paranoid(&target.collection) {
            return None;
        }
        let mut out = Fragment::column(&target.alias, DELETED_AT);
        out.push_sql(" IS NULL");
        Some(out)
    }

    /// Soft-delete, tenant and read-permission predicates for rows of `target`.
    ///
    /// With `inline` the permission filter's relation paths join onto the current
    /// query; otherwise they are evaluated in a `pk IN (subquery)` so the predicate can
    /// live inside an ON clause.
    pub fn scope_condition(&mut self, target: &TableRef, inline: bool) -> Result<Option<Fragment>, Error> {
        let mut parts = Vec::new();
        if let Some(hidden) = self.soft_delete_condition(target) {
            parts.push(hidden);
        }

        if let Some(filter) = self.access.scope_filter(&target.collection, Action::Read)? {
            let compiled = if inline || !filter.has_relation_paths() {
                let previous = self.set_enforcement(false);
                let compiled = self.compile_filter(target, &filter);
                self.set_enforcement(previous);
                compiled?
            } else {
                self.restrict_by_subquery(target, &filter, false)?
            };
            if let Some(compiled) = compiled {
                parts.push(compiled);
            }
        }

        Ok(Fragment::and(parts))
    }

    /// Caller supplied condition for the rows of `target`.
    pub fn relation_condition(&mut self, target: &TableRef, filter: &Filter) -> Result<Option<Fragment>, Error> {
        if filter.has_relation_paths() {
            self.restrict_by_subquery(target, filter, true)
        } else {
            self.compile_filter(target, filter)
        }
    }

    /// `"alias"."pk" IN (SELECT ... WHERE filter)`, evaluated in a detached compiler.
    pub fn restrict_by_subquery(
        &mut self,
        target: &TableRef,
        filter: &Filter,
        enforce_fields: bool,
    ) -> Result<Option<Fragment>, Error> {
        let catalog = self.catalog();
        let pk = catalog.get_primary_key(&target.collection)?;
        let table = catalog.get_table(&target.collection)?;
        let sub_alias = format!("{}$s", target.alias);
        let sub_ref = TableRef::new(target.collection.clone(), sub_alias.clone(), target.path.clone());

        let mut sub = self.detached(enforce_fields)?;
        let Some(condition) = sub.compile_filter(&sub_ref, filter)? else {
            return Ok(None);
        };
        let (joins, tables) = sub.into_parts();
        self.tables.extend(tables);
        self.tables.insert(table.to_string());

        let mut out = Fragment::column(&target.alias, pk);
        out.push_sql(" IN (SELECT ");
        out.push(Fragment::column(&sub_alias, pk));
        out.push_sql(format!(" FROM {} AS {}", quote(table), quote(&sub_alias)));
        out.push(joins.render(false));
        out.push_sql(" WHERE ");
        out.push(condition);
        out.push_sql(")");
        Ok(Some(out))
    }

    /// Resolves a field, dotted relation path or `date:<unit>:<field>` pseudo-field to a
    /// column expression, joining relations as needed.
    pub fn resolve_column(&mut self, base: &TableRef, path: &str) -> Result<ColumnRef, Error> {
        if let Some(pseudo) = sort::PseudoField::parse(path) {
            let pseudo = pseudo?;
            let column = self.resolve_column(base, pseudo.field)?;
            if !column.field_type.is_temporal() {
                return Err(QueryError::InvalidFieldPath(path.to_string()).into());
            }
            return Ok(ColumnRef {
                expr: self.dialect.date_bucket(pseudo.unit, column.expr),
                field_type: FieldType::String,
            });
        }

        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(QueryError::InvalidFieldPath(path.to_string()).into());
        }

        let (last, relations) = match segments.split_last() {
            Some(split) => split,
            None => return Err(QueryError::InvalidFieldPath(path.to_string()).into()),
        };

        let mut current = base.clone();
        for segment in relations {
            let schema = self.catalog().get_schema_definition(&current.collection)?;
            if schema.has_field(segment) && !segment.starts_with("item:") {
                return Err(QueryError::InvalidFieldPath(path.to_string()).into());
            }
            current = self.join_relation(&current, segment, JoinKind::Left, false)?;
        }

        let schema = self.catalog().get_schema_definition(&current.collection)?;
        if let Some(field) = schema.field(last) {
            self.check_field(&current.collection, &[last])?;
            return Ok(ColumnRef {
                expr: Fragment::column(&current.alias, last),
                field_type: field.field_type,
            });
        }

        match schema.relation(last) {
            Some(relation) if relation.kind == RelationKind::BelongsTo => {
                let field_type = schema
                    .field(&relation.foreign_key)
                    .map(|f| f.field_type)
                    .unwrap_or(FieldType::Integer);
                self.check_field(&current.collection, &[last, &relation.foreign_key])?;
                Ok(ColumnRef {
                    expr: Fragment::column(&current.alias, &relation.foreign_key),
                    field_type,
                })
            }
            Some(_) => Err(QueryError::InvalidFieldPath(path.to_string()).into()),
            None => Err(QueryError::UnknownField {
                collection: current.collection.clone(),
                field: last.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        model::{accountability::Accountability, permission::Permission},
        permission::{StaticPermissionProvider, TenantScope},
    };

    /// Blog catalog shared by the compiler tests.
    pub(crate) fn blog_catalog() -> SchemaCatalog {
        SchemaCatalog::from_json(json!({
            "collections": [
                {
                    "name": "users",
                    "fields": {
                        "id": {"type": "integer", "autoIncrement": true},
                        "name": {"type": "string"},
                        "role": {"type": "string"},
                        "manager_id": {"type": "integer"}
                    },
                    "relations": {
                        "manager": {"type": "belongsTo", "related": "users", "foreignKey": "manager_id"},
                        "posts": {"type": "hasMany", "related": "posts", "foreignKey": "author_id"}
                    }
                },
                {
                    "name": "posts",
                    "softDelete": true,
                    "multiTenant": true,
                    "fields": {
                        "id": {"type": "integer", "autoIncrement": true},
                        "title": {"type": "string"},
                        "views": {"type": "integer"},
                        "author_id": {"type": "integer"},
                        "tenant_id": {"type": "string"},
                        "created_at": {"type": "dateTime"},
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
                        "post_id": {"type": "integer"},
                        "body": {"type": "text"},
                        "approved": {"type": "boolean"}
                    },
                    "relations": {
                        "post": {"type": "belongsTo", "related": "posts", "foreignKey": "post_id"}
                    }
                },
                {
                    "name": "tags",
                    "fields": {"id": {"type": "integer", "autoIncrement": true}, "name": {"type": "string"}}
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
        }))
        .unwrap()
    }

    pub(crate) fn admin_access<'a>(
        catalog: &'a SchemaCatalog,
        provider: &'a StaticPermissionProvider,
        caller: &'a Accountability,
    ) -> Access<'a> {
        Access::new(catalog, provider, caller, TenantScope::Unrestricted)
    }

    #[test]
    fn joins_belongs_to_once_per_alias() {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::default();
        let caller = Accountability::admin("1");
        let access = admin_access(&catalog, &provider, &caller);
        let mut compiler = SqlCompiler::new(&access, Dialect::Sqlite, true);
        let base = TableRef::new("posts", "posts", "");

        let name = compiler.resolve_column(&base, "author.name").unwrap();
        let role = compiler.resolve_column(&base, "author.role").unwrap();
        assert_eq!(compiler.joins().len(), 1);
        assert_eq!(
            name.expr.to_sql(Dialect::Sqlite).0,
            "\"posts__author\".\"name\""
        );
        assert_eq!(role.field_type, FieldType::String);

        let on = compiler.joins().render(false).to_sql(Dialect::Sqlite).0;
        assert_eq!(
            on,
            " LEFT JOIN \"users\" AS \"posts__author\" ON (\"posts__author\".\"id\" = \"posts\".\"author_id\")"
        );
    }

    #[test]
    fn relation_conditions_narrow_joins_of_their_path() {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::default();
        let caller = Accountability::admin("1");
        let access = admin_access(&catalog, &provider, &caller);
        let conditions = BTreeMap::from([("comments".to_string(), Filter::eq("approved", true))]);
        let base = TableRef::new("posts", "posts", "");

        let mut narrowed = SqlCompiler::new(&access, Dialect::Sqlite, true).with_rel_conditions(&conditions);
        narrowed.resolve_column(&base, "comments.body").unwrap();
        let (on, values) = narrowed.joins().render(false).to_sql(Dialect::Sqlite);
        assert!(on.contains("\"posts__comments\".\"approved\" = ?"), "{}", on);
        assert_eq!(values.len(), 1);

        let mut plain = SqlCompiler::new(&access, Dialect::Sqlite, true);
        plain.resolve_column(&base, "comments.body").unwrap();
        let (on, _) = plain.joins().render(false).to_sql(Dialect::Sqlite);
        assert!(!on.contains("approved"));
    }

    #[test]
    fn many_to_many_paths_join_through_the_junction() {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::default();
        let caller = Accountability::admin("1");
        let access = admin_access(&catalog, &provider, &caller);
        let mut compiler = SqlCompiler::new(&access, Dialect::Sqlite, true);
        let base = TableRef::new("posts", "posts", "");

        compiler.resolve_column(&base, "tags.name").unwrap();
        let aliases: Vec<&str> = compiler.joins().iter().map(|j| j.alias.as_str()).collect();
        assert_eq!(aliases, vec!["posts__tags$junction", "posts__tags"]);
        assert!(compiler.joins().has_multi_valued());
        assert!(compiler.tables().contains("post_tags"));
    }

    #[test]
    fn polymorphic_items_are_joined_by_discriminator() {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::default();
        let caller = Accountability::admin("1");
        let access = admin_access(&catalog, &provider, &caller);
        let mut compiler = SqlCompiler::new(&access, Dialect::Postgres, true);
        let base = TableRef::new("posts", "posts", "");

        compiler.resolve_column(&base, "attachments.item:images.url").unwrap();
        let sql = compiler.joins().render(false).to_sql(Dialect::Postgres).0;
        assert!(sql.contains(
            "CAST(\"posts__attachments__item:images\".\"id\" AS TEXT) = \"posts__attachments\".\"item\""
        ));
        assert!(sql.contains("\"posts__attachments\".\"collection\" = $1"));
    }

    #[test]
    fn joined_soft_delete_collections_hide_deleted_rows() {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::default();
        let caller = Accountability::admin("1");
        let access = admin_access(&catalog, &provider, &caller);
        let mut compiler = SqlCompiler::new(&access, Dialect::Sqlite, true);
        let base = TableRef::new("comments", "comments", "");

        compiler.resolve_column(&base, "post.title").unwrap();
        let sql = compiler.joins().render(false).to_sql(Dialect::Sqlite).0;
        assert!(sql.contains("\"comments__post\".\"deleted_at\" IS NULL"));
    }

    #[test]
    fn unreadable_relations_are_denied_in_caller_filters() {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::new(vec![Permission::new(
            "reader",
            "comments",
            Action::Read,
        )])
        .unwrap();
        let caller = Accountability::user("7", "reader");
        let access = Access::new(&catalog, &provider, &caller, TenantScope::Unrestricted);
        let mut compiler = SqlCompiler::new(&access, Dialect::Sqlite, true);
        let base = TableRef::new("comments", "comments", "");

        let result = compiler.resolve_column(&base, "post.title");
        assert!(matches!(
            result,
            Err(Error::AccessError(AccessError::FieldDenied { .. }))
        ));
    }
}
