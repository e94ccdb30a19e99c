//! Key lookups for the mutation pipeline.

use std::collections::BTreeSet;

use sea_orm::Value;

use crate::{
    error::Error,
    model::{filter::Filter, permission::Action},
    query::{planner::Planner, select::ID_COLUMN, SqlCompiler, TableRef},
    sql::{quote, Fragment},
};

impl Planner<'_, '_> {
    /// Primary keys of the rows of `collection` the caller may `action`.
    ///
    /// Unlike reads, the role's row filter is the one of `action`. With `enforce_fields`
    /// the caller's `filter` may only name readable fields; `keys` further restricts the
    /// rows.
    ///
    /// # Returns
    /// - `Ok((Fragment, BTreeSet))` - `SELECT DISTINCT pk AS id ...` and the tables it reads
    /// - `Err(Error)` - Unknown names, malformed filter, or missing tenant context
    pub fn plan_keys(
        &self,
        collection: &str,
        action: Action,
        filter: Option<&Filter>,
        enforce_fields: bool,
        keys: Option<Vec<Value>>,
        paranoid: bool,
    ) -> Result<(Fragment, BTreeSet<String>), Error> {
        let schema = self.access.catalog().get_schema_definition(collection)?;
        let base = TableRef::new(collection, schema.table.clone(), "");
        let mut compiler = SqlCompiler::new(self.access, self.dialect, paranoid);
        compiler.note_collection(collection)?;

        let mut parts = Vec::new();
        if let Some(filter) = filter {
            let previous = compiler.set_enforcement(enforce_fields);
            let compiled = compiler.compile_filter(&base, filter);
            compiler.set_enforcement(previous);
            if let Some(compiled) = compiled? {
                parts.push(compiled);
            }
        }
        if let Some(hidden) = compiler.soft_delete_condition(&base) {
            parts.push(hidden);
        }
        if let Some(scope) = self.access.scope_filter(collection, action)? {
            let previous = compiler.set_enforcement(false);
            let compiled = compiler.compile_filter(&base, &scope);
            compiler.set_enforcement(previous);
            if let Some(compiled) = compiled? {
                parts.push(compiled);
            }
        }
        if let Some(keys) = keys {
            parts.push(Fragment::column(&base.alias, &schema.primary_key).in_list(keys, false));
        }

        let (joins, tables) = compiler.into_parts();
        let mut out = Fragment::sql("SELECT DISTINCT ");
        out.push(Fragment::column(&base.alias, &schema.primary_key));
        out.push_sql(format!(
            " AS {} FROM {} AS {}",
            quote(ID_COLUMN),
            quote(&schema.table),
            quote(&base.alias)
        ));
        out.push(joins.render(false));
        if let Some(condition) = Fragment::and(parts) {
            out.push_sql(" WHERE ");
            out.push(condition);
        }
        out.push_sql(" ORDER BY ");
        out.push(Fragment::column(&base.alias, &schema.primary_key));

        tracing::trace!(collection, %action, "planned key lookup");
        Ok((out, tables))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        model::{accountability::Accountability, app::EngineSettings, permission::Permission},
        permission::{Access, StaticPermissionProvider, TenantScope},
        query::tests::blog_catalog,
        sql::Dialect,
    };

    #[test]
    fn applies_the_row_filter_of_the_write_action() {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::new(vec![
            Permission::new("author", "posts", Action::Read),
            Permission::new("author", "posts", Action::Update)
                .with_filter(Filter::from_json(&json!({"author_id": {"eq": "$CURRENT_USER"}})).unwrap()),
        ])
        .unwrap();
        let caller = Accountability::user("7", "author").with_tenant("acme");
        let access = Access::new(
            &catalog,
            &provider,
            &caller,
            TenantScope::Tenant("acme".to_string()),
        );
        let settings = EngineSettings::default();
        let planner = Planner::new(&access, Dialect::Sqlite, &settings);

        let (statement, tables) = planner
            .plan_keys("posts", Action::Update, None, true, Some(vec![Value::from(1i32)]), true)
            .unwrap();
        let (sql, values) = statement.to_sql(Dialect::Sqlite);

        assert!(sql.starts_with("SELECT DISTINCT \"posts\".\"id\" AS \"id\" FROM \"posts\" AS \"posts\""));
        assert!(sql.contains("\"posts\".\"deleted_at\" IS NULL"));
        assert!(sql.contains("\"posts\".\"tenant_id\" = ?"));
        assert!(sql.contains("\"posts\".\"author_id\" = ?"));
        assert_eq!(values.len(), 3);
        assert!(tables.contains("posts"));
    }
}
