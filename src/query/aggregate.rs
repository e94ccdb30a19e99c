//! Aggregate and group-by reads.

use std::collections::BTreeSet;

use sea_orm::{DbErr, QueryResult};
use serde_json::{Map, Value as JsonValue};

use crate::{
    error::{Error, QueryError},
    model::{
        item::Item,
        query::{AggregateFunction, Query},
    },
    query::{planner::Planner, select::limit_clause, sort::PseudoField, SqlCompiler, TableRef},
    sql::{quote, value::decode, ColumnKind, Fragment},
};

/// Where a decoded aggregate column lands in the output row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOutput {
    /// Group key, stored under the group-by path.
    Group(String),
    /// `{function: {field: value}}`
    Function { function: &'static str, field: String },
}

#[derive(Debug, Clone)]
pub struct AggregateColumn {
    pub alias: String,
    pub kind: ColumnKind,
    pub output: AggregateOutput,
}

#[derive(Debug, Clone)]
pub struct AggregatePlan {
    pub collection: String,
    pub statement: Fragment,
    pub columns: Vec<AggregateColumn>,
    pub tables_involved: BTreeSet<String>,
}

impl AggregatePlan {
    /// Output row for one result row.
    pub fn row_to_item(&self, row: &QueryResult) -> Result<Item, DbErr> {
        let mut item = Item::new();
        for column in &self.columns {
            let value = decode(row, &column.alias, column.kind)?;
            match &column.output {
                AggregateOutput::Group(path) => {
                    item.insert(path.clone(), value);
                }
                AggregateOutput::Function { function, field } => {
                    let entry = item
                        .entry(function.to_string())
                        .or_insert_with(|| JsonValue::Object(Map::new()));
                    if let JsonValue::Object(map) = entry {
                        map.insert(field.clone(), value);
                    }
                }
            }
        }
        Ok(item)
    }
}

impl Planner<'_, '_> {
    /// Plans `query.aggregate` grouped by `query.group_by`.
    pub fn plan_aggregate(&self, collection: &str, query: &Query) -> Result<AggregatePlan, Error> {
        self.access.check_read(collection)?;
        let aggregate = query
            .aggregate
            .as_ref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| QueryError::InvalidAggregate("no aggregate function requested".to_string()))?;

        let catalog = self.access.catalog();
        let schema = catalog.get_schema_definition(collection)?;
        let base = TableRef::new(collection, schema.table.clone(), "");

        let mut filter_compiler = SqlCompiler::new(self.access, self.dialect, query.is_paranoid())
            .with_rel_conditions(&query.rel_conditions);
        filter_compiler.note_collection(collection)?;
        let mut parts = Vec::new();
        if let Some(filter) = &query.filter {
            if let Some(compiled) = filter_compiler.compile_filter(&base, filter)? {
                parts.push(compiled);
            }
        }
        if let Some(term) = &query.search {
            if let Some(compiled) =
                filter_compiler.compile_search(&base, term, query.search_fields.as_deref())?
            {
                parts.push(compiled);
            }
        }
        if let Some(scope) = filter_compiler.scope_condition(&base, true)? {
            parts.push(scope);
        }
        let condition = Fragment::and(parts);

        // Fan-out joins would inflate the aggregates, so the matching root rows are
        // selected in an uncorrelated subquery and aggregated over the bare table.
        let (mut compiler, condition, mut tables) = if filter_compiler.joins().has_multi_valued() {
            let pk = Fragment::column(&base.alias, &schema.primary_key);
            let (joins, tables) = filter_compiler.into_parts();

            let mut restricted = pk.clone();
            restricted.push_sql(" IN (SELECT ");
            restricted.push(pk);
            restricted.push_sql(format!(" FROM {} AS {}", quote(&schema.table), quote(&base.alias)));
            restricted.push(joins.render(false));
            if let Some(condition) = condition {
                restricted.push_sql(" WHERE ");
                restricted.push(condition);
            }
            restricted.push_sql(")");

            let compiler = SqlCompiler::new(self.access, self.dialect, query.is_paranoid());
            (compiler, Some(restricted), tables)
        } else {
            let tables = filter_compiler.tables().clone();
            (filter_compiler, condition, tables)
        };

        let mut columns = Vec::new();
        let mut select = Vec::new();
        let mut group_exprs = Vec::new();

        for (i, path) in query.group_by.iter().flatten().enumerate() {
            let column = compiler.resolve_column(&base, path)?;
            let kind = if PseudoField::is_pseudo(path) {
                ColumnKind::Text
            } else {
                ColumnKind::Field(column.field_type)
            };
            let alias = format!("g{}", i);
            let mut expr = column.expr.clone();
            expr.push_sql(format!(" AS {}", quote(&alias)));
            select.push(expr);
            group_exprs.push(column.expr);
            columns.push(AggregateColumn {
                alias,
                kind,
                output: AggregateOutput::Group(path.clone()),
            });
        }

        for (i, (function, field)) in aggregate.entries().into_iter().enumerate() {
            let alias = format!("a{}", i);
            let (expr, kind) = self.aggregate_expr(&mut compiler, &base, function, field)?;
            let mut selected = expr;
            selected.push_sql(format!(" AS {}", quote(&alias)));
            select.push(selected);
            columns.push(AggregateColumn {
                alias,
                kind,
                output: AggregateOutput::Function {
                    function: function.name(),
                    field: field.to_string(),
                },
            });
        }

        let mut statement = Fragment::sql("SELECT ");
        statement.push(Fragment::join(select, ", "));
        statement.push_sql(format!(
            " FROM {} AS {}",
            quote(&schema.table),
            quote(&base.alias)
        ));
        statement.push(compiler.joins().render(false));
        if let Some(condition) = condition {
            statement.push_sql(" WHERE ");
            statement.push(condition);
        }
        if !group_exprs.is_empty() {
            statement.push_sql(" GROUP BY ");
            statement.push(Fragment::join(group_exprs.iter().cloned(), ", "));
            statement.push_sql(" ORDER BY ");
            statement.push(Fragment::join(group_exprs.into_iter(), ", "));
            let (limit, offset) = self.pagination(query)?;
            statement.push_sql(limit_clause(self.dialect, limit, offset));
        }

        tables.extend(compiler.tables().iter().cloned());
        tables.insert(schema.table.clone());

        tracing::debug!(collection, columns = columns.len(), "planned aggregate");

        Ok(AggregatePlan {
            collection: collection.to_string(),
            statement,
            columns,
            tables_involved: tables,
        })
    }

    fn aggregate_expr(
        &self,
        compiler: &mut SqlCompiler<'_>,
        base: &TableRef,
        function: AggregateFunction,
        field: &str,
    ) -> Result<(Fragment, ColumnKind), Error> {
        if field == "*" {
            return match function {
                AggregateFunction::Count => Ok((Fragment::sql("COUNT(*)"), ColumnKind::Count)),
                _ => Err(QueryError::InvalidAggregate(format!(
                    "{} does not accept \"*\"",
                    function.name()
                ))
                .into()),
            };
        }
        if PseudoField::is_pseudo(field) {
            return Err(QueryError::InvalidAggregate(format!(
                "cannot aggregate pseudo-field \"{}\"",
                field
            ))
            .into());
        }

        let column = compiler.resolve_column(base, field)?;
        let wrap = |name: &str, expr: Fragment| {
            let mut out = Fragment::sql(format!("{}(", name));
            out.push(expr);
            out.push_sql(")");
            out
        };

        match function {
            AggregateFunction::Count => Ok((wrap("COUNT", column.expr), ColumnKind::Count)),
            AggregateFunction::CountDistinct => {
                let mut out = Fragment::sql("COUNT(DISTINCT ");
                out.push(column.expr);
                out.push_sql(")");
                Ok((out, ColumnKind::Count))
            }
            AggregateFunction::Sum | AggregateFunction::Avg => {
                if !column.field_type.is_numeric() {
                    return Err(QueryError::InvalidAggregate(format!(
                        "{} needs a numeric field, \"{}\" is {:?}",
                        function.name(),
                        field,
                        column.field_type
                    ))
                    .into());
                }
                let name = if function == AggregateFunction::Sum {
                    "SUM"
                } else {
                    "AVG"
                };
                Ok((
                    self.dialect.cast_float(wrap(name, column.expr)),
                    ColumnKind::Float,
                ))
            }
            AggregateFunction::Min => Ok((wrap("MIN", column.expr), ColumnKind::Field(column.field_type))),
            AggregateFunction::Max => Ok((wrap("MAX", column.expr), ColumnKind::Field(column.field_type))),
        }
    }
}
