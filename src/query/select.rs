//! SELECT statements for a [`QueryPlan`].
//!
//! Builders only assemble [`Fragment`]s; executing them and merging rows is the
//! relation loader's job.

use sea_orm::Value;

use crate::{
    query::plan::{JunctionPlan, LevelPlan, OrderTerm, QueryPlan},
    sql::{quote, Dialect, Fragment},
};

/// Alias of the id column of the two-phase id query.
pub const ID_COLUMN: &str = "id";
/// Alias of the single column of count queries.
pub const COUNT_COLUMN: &str = "count";
/// Aliases of the junction lookup columns.
pub const JUNCTION_SOURCE: &str = "source";
pub const JUNCTION_TARGET: &str = "target";

/// ` LIMIT n OFFSET m`, or nothing when neither applies.
pub fn limit_clause(dialect: Dialect, limit: Option<u64>, offset: u64) -> String {
    match (limit, offset) {
        (None, 0) => String::new(),
        (Some(limit), 0) => format!(" LIMIT {}", limit),
        (Some(limit), offset) => format!(" LIMIT {} OFFSET {}", limit, offset),
        (None, offset) => match dialect {
            Dialect::Postgres => format!(" OFFSET {}", offset),
            // SQLite only accepts OFFSET after a LIMIT
            Dialect::Sqlite => format!(" LIMIT -1 OFFSET {}", offset),
        },
    }
}

fn order_clause(terms: &[OrderTerm]) -> Fragment {
    if terms.is_empty() {
        return Fragment::new();
    }
    let mut out = Fragment::sql(" ORDER BY ");
    out.push(Fragment::join(terms.iter().map(OrderTerm::render), ", "));
    out
}

fn where_clause(condition: Option<Fragment>) -> Fragment {
    match condition {
        Some(condition) => {
            let mut out = Fragment::sql(" WHERE ");
            out.push(condition);
            out
        }
        None => Fragment::new(),
    }
}

/// `FROM "table" AS "alias"` followed by the level's joins.
fn from_clause(level: &LevelPlan, include_only: bool) -> Fragment {
    let mut out = Fragment::sql(format!(" FROM {} AS {}", quote(&level.table), quote(&level.alias)));
    out.push(level.joins.render(include_only));
    out
}

fn select_list(level: &LevelPlan) -> Fragment {
    let columns = level.columns.iter().map(|column| {
        let mut out = column.expr.clone();
        out.push_sql(format!(" AS {}", quote(&column.alias)));
        out
    });
    let mut out = Fragment::sql("SELECT ");
    out.push(Fragment::join(columns, ", "));
    out
}

fn pk_column(level: &LevelPlan) -> Fragment {
    Fragment::column(&level.alias, &level.primary_key)
}

/// Paginated root SELECT of a read without fan-out joins.
pub fn root_rows(plan: &QueryPlan, dialect: Dialect) -> Fragment {
    let level = &plan.root;
    let mut out = select_list(level);
    out.push(from_clause(level, false));
    out.push(where_clause(level.condition.clone()));
    out.push(order_clause(&level.order_by));
    out.push_sql(limit_clause(dialect, plan.limit, plan.offset));
    out
}

/// `COUNT(*)` over the root rows, for reads without fan-out joins.
pub fn root_count(plan: &QueryPlan) -> Fragment {
    let level = &plan.root;
    let mut out = Fragment::sql(format!("SELECT COUNT(*) AS {}", quote(COUNT_COLUMN)));
    out.push(from_clause(level, false));
    out.push(where_clause(level.condition.clone()));
    out
}

/// `COUNT(DISTINCT pk)` over the root rows with every join in place.
pub fn distinct_count(plan: &QueryPlan) -> Fragment {
    let level = &plan.root;
    let mut out = Fragment::sql("SELECT COUNT(DISTINCT ");
    out.push(pk_column(level));
    out.push_sql(format!(") AS {}", quote(COUNT_COLUMN)));
    out.push(from_clause(level, false));
    out.push(where_clause(level.condition.clone()));
    out
}

/// Ordered, paginated, distinct primary keys of the root rows.
///
/// Every sort term is reduced to one value per root row: the first row in sort order on
/// PostgreSQL (`DISTINCT ON`), `MIN`/`MAX` by direction on SQLite. Both pick the value
/// that would have placed the row first.
pub fn distinct_ids(plan: &QueryPlan, dialect: Dialect) -> Fragment {
    let level = &plan.root;
    let pk = pk_column(level);

    match dialect {
        Dialect::Postgres => {
            let mut inner = Fragment::sql("SELECT DISTINCT ON (");
            inner.push(pk.clone());
            inner.push_sql(") ");
            inner.push(pk.clone());
            inner.push_sql(format!(" AS {}", quote(ID_COLUMN)));
            for (i, term) in level.order_by.iter().enumerate() {
                inner.push_sql(", ");
                inner.push(term.expr.clone());
                inner.push_sql(format!(" AS {}", quote(&format!("s{}", i))));
            }
            inner.push(from_clause(level, false));
            inner.push(where_clause(level.condition.clone()));

            let mut inner_order = vec![OrderTerm {
                expr: pk,
                descending: false,
            }];
            inner_order.extend(level.order_by.iter().cloned());
            inner.push(order_clause(&inner_order));

            let mut outer_order: Vec<OrderTerm> = level
                .order_by
                .iter()
                .enumerate()
                .map(|(i, term)| OrderTerm {
                    expr: Fragment::sql(quote(&format!("s{}", i))),
                    descending: term.descending,
                })
                .collect();
            outer_order.push(OrderTerm {
                expr: Fragment::sql(quote(ID_COLUMN)),
                descending: false,
            });

            let mut out = Fragment::sql(format!("SELECT {} FROM (", quote(ID_COLUMN)));
            out.push(inner);
            out.push_sql(format!(") AS {}", quote("ids")));
            out.push(order_clause(&outer_order));
            out.push_sql(limit_clause(dialect, plan.limit, plan.offset));
            out
        }
        Dialect::Sqlite => {
            let mut out = Fragment::sql("SELECT ");
            out.push(pk.clone());
            out.push_sql(format!(" AS {}", quote(ID_COLUMN)));
            out.push(from_clause(level, false));
            out.push(where_clause(level.condition.clone()));
            out.push_sql(" GROUP BY ");
            out.push(pk.clone());

            let mut order: Vec<OrderTerm> = level
                .order_by
                .iter()
                .map(|term| {
                    let mut expr = Fragment::sql(if term.descending { "MAX(" } else { "MIN(" });
                    expr.push(term.expr.clone());
                    expr.push_sql(")");
                    OrderTerm {
                        expr,
                        descending: term.descending,
                    }
                })
                .collect();
            order.push(OrderTerm {
                expr: pk,
                descending: false,
            });
            out.push(order_clause(&order));
            out.push_sql(limit_clause(dialect, plan.limit, plan.offset));
            out
        }
    }
}

/// Root rows with primary keys in `ids`, joining include relations only.
pub fn root_rows_by_ids(plan: &QueryPlan, ids: Vec<Value>) -> Fragment {
    let level = &plan.root;
    let mut out = select_list(level);
    out.push(from_clause(level, true));
    out.push(where_clause(Some(pk_column(level).in_list(ids, false))));
    out
}

/// Rows of a separately loaded level whose key is in `keys`.
pub fn level_rows(level: &LevelPlan, keys: Vec<Value>) -> Fragment {
    let key = match &level.key {
        Some((key, _)) => key.clone(),
        None => pk_column(level),
    };
    let mut parts = vec![key.in_list(keys, false)];
    if let Some(condition) = &level.condition {
        parts.push(condition.clone());
    }

    let mut out = select_list(level);
    out.push(from_clause(level, false));
    out.push(where_clause(Fragment::and(parts)));
    out.push(order_clause(&level.order_by));
    out
}

/// Junction rows linking `sources` to targets, in link order.
pub fn junction_rows(junction: &JunctionPlan, sources: Vec<Value>) -> Fragment {
    let source = Fragment::column(&junction.alias, &junction.source_key);
    let mut parts = vec![source.clone().in_list(sources, false)];
    if let Some(condition) = &junction.condition {
        parts.push(condition.clone());
    }

    let mut out = Fragment::sql("SELECT ");
    out.push(source);
    out.push_sql(format!(" AS {}, ", quote(JUNCTION_SOURCE)));
    out.push(Fragment::column(&junction.alias, &junction.target_key));
    out.push_sql(format!(
        " AS {} FROM {} AS {}",
        quote(JUNCTION_TARGET),
        quote(&junction.table),
        quote(&junction.alias)
    ));
    out.push(where_clause(Fragment::and(parts)));
    out.push(order_clause(&junction.order_by));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{accountability::Accountability, app::EngineSettings, query::Query},
        permission::{Access, StaticPermissionProvider, TenantScope},
        query::{planner::Planner, tests::blog_catalog},
    };

    fn plan(collection: &str, query: Query, dialect: Dialect) -> QueryPlan {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::default();
        let caller = Accountability::admin("1");
        let access = Access::new(&catalog, &provider, &caller, TenantScope::Unrestricted);
        let settings = EngineSettings::default();
        Planner::new(&access, dialect, &settings)
            .plan(collection, &query)
            .unwrap()
    }

    #[test]
    fn limit_clauses_per_backend() {
        assert_eq!(limit_clause(Dialect::Sqlite, None, 0), "");
        assert_eq!(limit_clause(Dialect::Sqlite, Some(5), 0), " LIMIT 5");
        assert_eq!(limit_clause(Dialect::Postgres, Some(5), 10), " LIMIT 5 OFFSET 10");
        assert_eq!(limit_clause(Dialect::Sqlite, None, 10), " LIMIT -1 OFFSET 10");
        assert_eq!(limit_clause(Dialect::Postgres, None, 10), " OFFSET 10");
    }

    #[test]
    fn renders_single_strategy_rows_and_count() {
        let plan = plan(
            "tags",
            Query::new().fields(["id", "name"]).sort(["-name"]).limit(3),
            Dialect::Sqlite,
        );
        let (sql, _) = root_rows(&plan, Dialect::Sqlite).to_sql(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT \"tags\".\"id\" AS \"c0\", \"tags\".\"name\" AS \"c1\" FROM \"tags\" AS \"tags\" \
             ORDER BY \"tags\".\"name\" DESC, \"tags\".\"id\" ASC LIMIT 3"
        );

        let (sql, _) = root_count(&plan).to_sql(Dialect::Sqlite);
        assert_eq!(sql, "SELECT COUNT(*) AS \"count\" FROM \"tags\" AS \"tags\"");
    }

    #[test]
    fn distinct_ids_reduce_sort_values_per_row() {
        let query = || Query::new().fields(["id"]).sort(["-posts.title"]).limit(2);

        let sqlite = plan("users", query(), Dialect::Sqlite);
        let (sql, _) = distinct_ids(&sqlite, Dialect::Sqlite).to_sql(Dialect::Sqlite);
        assert!(sql.starts_with("SELECT \"users\".\"id\" AS \"id\" FROM \"users\" AS \"users\" LEFT JOIN"));
        assert!(sql.contains(
            " GROUP BY \"users\".\"id\" ORDER BY MAX(\"users__posts\".\"title\") DESC, MIN(\"users\".\"id\") ASC, \"users\".\"id\" ASC LIMIT 2"
        ));

        let postgres = plan("users", query(), Dialect::Postgres);
        let (sql, _) = distinct_ids(&postgres, Dialect::Postgres).to_sql(Dialect::Postgres);
        assert!(sql.starts_with(
            "SELECT \"id\" FROM (SELECT DISTINCT ON (\"users\".\"id\") \"users\".\"id\" AS \"id\", \"users__posts\".\"title\" AS \"s0\""
        ));
        assert!(sql.ends_with(
            ") AS \"ids\" ORDER BY \"s0\" DESC, \"s1\" ASC, \"id\" ASC LIMIT 2"
        ));
    }

    #[test]
    fn hydration_only_joins_includes() {
        let plan = plan(
            "users",
            Query::new().fields(["id"]).filter(crate::model::filter::Filter::eq("posts.title", "x")),
            Dialect::Sqlite,
        );
        let (sql, values) =
            root_rows_by_ids(&plan, vec![Value::from(1), Value::from(2)]).to_sql(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT \"users\".\"id\" AS \"c0\" FROM \"users\" AS \"users\" WHERE \"users\".\"id\" IN (?, ?)"
        );
        assert_eq!(values.len(), 2);
    }
}
