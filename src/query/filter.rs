//! Filter and search compilation.

use sea_orm::Value;
use serde_json::Value as JsonValue;

use crate::{
    error::{Error, QueryError},
    model::filter::{Condition, Filter, Operator, RawExpression},
    query::{ColumnRef, SqlCompiler, TableRef},
    schema::FieldType,
    sql::{escape_like, quote, value::to_db_value, Fragment},
};

impl SqlCompiler<'_> {
    /// Compiles `filter` against `base`. `None` means the filter holds vacuously.
    pub fn compile_filter(&mut self, base: &TableRef, filter: &Filter) -> Result<Option<Fragment>, Error> {
        match filter {
            Filter::And(children) => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(part) = self.compile_filter(base, child)? {
                        parts.push(part);
                    }
                }
                Ok(Fragment::and(parts))
            }
            Filter::Or(children) => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    match self.compile_filter(base, child)? {
                        Some(part) => parts.push(part),
                        // a vacuous branch makes the whole disjunction hold
                        None => return Ok(None),
                    }
                }
                Ok(Fragment::or(parts))
            }
            Filter::Field { path, condition } => {
                let column = self.resolve_column(base, path)?;
                self.compile_condition(path, &column, condition).map(Some)
            }
            Filter::Raw(raw) => compile_raw(base, raw).map(Some),
        }
    }

    fn compile_condition(
        &self,
        path: &str,
        column: &ColumnRef,
        condition: &Condition,
    ) -> Result<Fragment, Error> {
        match condition {
            Condition::Literal(JsonValue::Null) => self.compile_operator(path, column, Operator::IsNull, &JsonValue::Bool(true)),
            Condition::Literal(value @ JsonValue::Array(_)) => {
                self.compile_operator(path, column, Operator::In, value)
            }
            Condition::Literal(value) => self.compile_operator(path, column, Operator::Eq, value),
            Condition::Operators(operators) => {
                let mut parts = Vec::with_capacity(operators.len());
                for (operator, value) in operators {
                    parts.push(self.compile_operator(path, column, *operator, value)?);
                }
                Ok(Fragment::and(parts).unwrap_or_else(|| Fragment::sql("1 = 1")))
            }
        }
    }

    fn bind(&self, path: &str, field_type: FieldType, value: &JsonValue) -> Result<Value, Error> {
        to_db_value(field_type, value, self.dialect()).map_err(|reason| {
            QueryError::InvalidValue {
                field: path.to_string(),
                reason,
            }
            .into()
        })
    }

    fn list(&self, path: &str, column: &ColumnRef, value: &JsonValue) -> Result<(Vec<Value>, bool), Error> {
        let items = match value {
            JsonValue::Array(items) => items.clone(),
            JsonValue::String(s) => s.split(',').map(|p| JsonValue::String(p.trim().to_string())).collect(),
            other => vec![other.clone()],
        };
        let mut values = Vec::with_capacity(items.len());
        let mut has_null = false;
        for item in &items {
            if item.is_null() {
                has_null = true;
            } else {
                values.push(self.bind(path, column.field_type, item)?);
            }
        }
        Ok((values, has_null))
    }

    /// Text form of the column for pattern operators.
    fn text_expr(&self, column: &ColumnRef) -> Fragment {
        if column.field_type.is_textual() {
            column.expr.clone()
        } else {
            self.dialect().cast_text(column.expr.clone())
        }
    }

    fn pattern(&self, path: &str, value: &JsonValue, wrap: fn(&str) -> String) -> Result<Fragment, Error> {
        let raw = match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            other => {
                return Err(QueryError::InvalidValue {
                    field: path.to_string(),
                    reason: format!("expected text, found {}", other),
                }
                .into())
            }
        };
        Ok(Fragment::value(wrap(&raw)))
    }

    fn compile_operator(
        &self,
        path: &str,
        column: &ColumnRef,
        operator: Operator,
        value: &JsonValue,
    ) -> Result<Fragment, Error> {
        let expr = column.expr.clone();
        let dialect = self.dialect();

        let comparison = |sql_op: &str, value: &JsonValue| -> Result<Fragment, Error> {
            let mut out = expr.clone();
            out.push_sql(format!(" {} ", sql_op));
            out.push_value(self.bind(path, column.field_type, value)?);
            Ok(out)
        };
        let null_check = |negate: bool| {
            let mut out = expr.clone();
            out.push_sql(if negate { " IS NOT NULL" } else { " IS NULL" });
            out
        };
        let flag = |value: &JsonValue| !matches!(value, JsonValue::Bool(false));

        let fragment = match operator {
            Operator::Eq if value.is_null() => null_check(false),
            Operator::Neq if value.is_null() => null_check(true),
            Operator::Eq => comparison("=", value)?,
            Operator::Neq => {
                // rows with a NULL column are "not equal" too
                let mut out = comparison("<>", value)?.parens();
                out.push_sql(" OR ");
                out.push(null_check(false));
                out.parens()
            }
            Operator::Gt => comparison(">", value)?,
            Operator::Gte => comparison(">=", value)?,
            Operator::Lt => comparison("<", value)?,
            Operator::Lte => comparison("<=", value)?,
            Operator::In | Operator::NotIn => {
                let negate = operator == Operator::NotIn;
                let (values, has_null) = self.list(path, column, value)?;
                let membership = expr.clone().in_list(values, negate);
                match (has_null, negate) {
                    (false, _) => membership,
                    (true, false) => Fragment::or(vec![membership, null_check(false)])
                        .unwrap_or_else(|| null_check(false)),
                    (true, true) => Fragment::and(vec![membership, null_check(true)])
                        .unwrap_or_else(|| null_check(true)),
                }
            }
            Operator::Like | Operator::NotLike => {
                let pattern = self.pattern(path, value, |raw| raw.to_string())?;
                dialect.like(self.text_expr(column), pattern, operator == Operator::NotLike)
            }
            Operator::Ilike | Operator::NotIlike => {
                let pattern = self.pattern(path, value, |raw| raw.to_string())?;
                dialect.ilike(self.text_expr(column), pattern, operator == Operator::NotIlike)
            }
            Operator::Contains | Operator::NotContains => {
                let pattern = self.pattern(path, value, |raw| format!("%{}%", escape_like(raw)))?;
                dialect.like(self.text_expr(column), pattern, operator == Operator::NotContains)
            }
            Operator::StartsWith => {
                let pattern = self.pattern(path, value, |raw| format!("{}%", escape_like(raw)))?;
                dialect.like(self.text_expr(column), pattern, false)
            }
            Operator::EndsWith => {
                let pattern = self.pattern(path, value, |raw| format!("%{}", escape_like(raw)))?;
                dialect.like(self.text_expr(column), pattern, false)
            }
            Operator::Between | Operator::NotBetween => {
                let bounds = match value {
                    JsonValue::Array(items) if items.len() == 2 => items,
                    _ => {
                        return Err(QueryError::InvalidFilter(format!(
                            "\"{}\" on \"{}\" expects a two element array",
                            operator, path
                        ))
                        .into())
                    }
                };
                let mut out = expr.clone();
                out.push_sql(if operator == Operator::Between {
                    " BETWEEN "
                } else {
                    " NOT BETWEEN "
                });
                out.push_value(self.bind(path, column.field_type, &bounds[0])?);
                out.push_sql(" AND ");
                out.push_value(self.bind(path, column.field_type, &bounds[1])?);
                out
            }
            Operator::IsNull => null_check(!flag(value)),
            Operator::IsNotNull => null_check(flag(value)),
            Operator::Empty | Operator::NotEmpty => {
                let empty = (operator == Operator::Empty) == flag(value);
                if column.field_type.is_textual() {
                    let mut out = null_check(!empty);
                    out.push_sql(if empty { " OR " } else { " AND " });
                    out.push(expr.clone());
                    out.push_sql(if empty { " = ''" } else { " <> ''" });
                    out.parens()
                } else {
                    null_check(!empty)
                }
            }
        };
        Ok(fragment)
    }

    /// Full-text style search over direct fields of `base`.
    ///
    /// Text columns match case-insensitively as substrings; numeric columns match by
    /// equality when the term parses as a number.
    pub fn compile_search(
        &mut self,
        base: &TableRef,
        term: &str,
        fields: Option<&[String]>,
    ) -> Result<Option<Fragment>, Error> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(None);
        }

        let candidates = match fields {
            Some(fields) => {
                if let Some(path) = fields.iter().find(|f| f.contains('.')) {
                    return Err(QueryError::InvalidFilter(format!(
                        "search field \"{}\" must be a direct field",
                        path
                    ))
                    .into());
                }
                fields.to_vec()
            }
            None => self.access().readable_fields(&base.collection)?,
        };

        let number = term.parse::<f64>().ok().filter(|n| n.is_finite());
        let mut parts = Vec::new();
        for name in candidates {
            let column = self.resolve_column(base, &name)?;
            if column.field_type.is_textual() {
                let pattern = Fragment::value(format!("%{}%", escape_like(term)));
                parts.push(self.dialect().ilike(column.expr, pattern, false));
            } else if column.field_type.is_integer() {
                if let Some(n) = number.filter(|n| n.fract() == 0.0) {
                    let mut out = column.expr;
                    out.push_sql(" = ");
                    out.push_value(self.bind(&name, column.field_type, &JsonValue::from(n as i64))?);
                    parts.push(out);
                }
            } else if column.field_type == FieldType::Float {
                if let Some(n) = number {
                    let mut out = column.expr;
                    out.push_sql(" = ");
                    out.push_value(n);
                    parts.push(out);
                }
            }
        }

        Ok(Some(
            Fragment::or(parts).unwrap_or_else(|| Fragment::sql("1 = 0")),
        ))
    }
}

/// Substitutes `{table}` with the quoted alias and binds `?` placeholders in order.
fn compile_raw(base: &TableRef, raw: &RawExpression) -> Result<Fragment, Error> {
    let sql = raw.sql.replace("{table}", &quote(&base.alias));
    let pieces: Vec<&str> = sql.split('?').collect();
    if pieces.len() - 1 != raw.values.len() {
        return Err(QueryError::InvalidFilter(format!(
            "raw expression has {} placeholders but {} values",
            pieces.len() - 1,
            raw.values.len()
        ))
        .into());
    }

    let mut out = Fragment::new();
    for (i, piece) in pieces.iter().enumerate() {
        out.push_sql(*piece);
        if let Some(value) = raw.values.get(i) {
            out.push_value(value.clone());
        }
    }
    Ok(out.parens())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        model::accountability::Accountability,
        permission::StaticPermissionProvider,
        query::tests::{admin_access, blog_catalog},
        sql::Dialect,
    };

    fn compile(filter: JsonValue, dialect: Dialect) -> Result<(String, usize), Error> {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::default();
        let caller = Accountability::admin("1");
        let access = admin_access(&catalog, &provider, &caller);
        let mut compiler = SqlCompiler::new(&access, dialect, true);
        let base = TableRef::new("posts", "posts", "");

        let filter = Filter::from_json(&filter)?;
        let fragment = compiler.compile_filter(&base, &filter)?.unwrap_or_default();
        let (sql, values) = fragment.to_sql(dialect);
        Ok((sql, values.len()))
    }

    #[test]
    fn literal_values_compile_to_equality_in_and_null_checks() {
        let (sql, params) = compile(json!({"title": "a", "views": [1, 2], "author_id": null}), Dialect::Postgres).unwrap();
        assert_eq!(
            sql,
            "(\"posts\".\"author_id\" IS NULL) AND (\"posts\".\"title\" = $1) AND (\"posts\".\"views\" IN ($2, $3))"
        );
        assert_eq!(params, 3);
    }

    #[test]
    fn or_groups_and_operators() {
        let (sql, _) = compile(
            json!({"OR": [{"views": {"gte": 10}}, {"title": {"startsWith": "50%"}}]}),
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(
            sql,
            "(\"posts\".\"views\" >= ?) OR (\"posts\".\"title\" LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn relation_paths_join_the_target() {
        let (sql, params) = compile(json!({"author.name": {"ilike": "%ann%"}}), Dialect::Postgres).unwrap();
        assert_eq!(sql, "\"posts__author\".\"name\" ILIKE $1 ESCAPE '\\'");
        assert_eq!(params, 1);
    }

    #[test]
    fn between_requires_two_bounds() {
        let (sql, params) = compile(json!({"views": {"between": [1, 5]}}), Dialect::Sqlite).unwrap();
        assert_eq!(sql, "\"posts\".\"views\" BETWEEN ? AND ?");
        assert_eq!(params, 2);

        let result = compile(json!({"views": {"between": [1]}}), Dialect::Sqlite);
        assert!(matches!(result, Err(Error::QueryError(QueryError::InvalidFilter(_)))));
    }

    #[test]
    fn unknown_fields_and_bad_values_are_rejected() {
        assert!(matches!(
            compile(json!({"missing": 1}), Dialect::Sqlite),
            Err(Error::QueryError(QueryError::UnknownField { .. }))
        ));
        assert!(matches!(
            compile(json!({"views": "many"}), Dialect::Sqlite),
            Err(Error::QueryError(QueryError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn unary_operators_honor_false() {
        let (sql, _) = compile(json!({"title": {"isNull": false}}), Dialect::Sqlite).unwrap();
        assert_eq!(sql, "\"posts\".\"title\" IS NOT NULL");
        let (sql, _) = compile(json!({"title": {"empty": true}}), Dialect::Sqlite).unwrap();
        assert_eq!(sql, "(\"posts\".\"title\" IS NULL OR \"posts\".\"title\" = '')");
    }

    #[test]
    fn raw_expressions_bind_in_order() {
        let base = TableRef::new("posts", "p", "");
        let raw = RawExpression::new("{table}.\"views\" > ? AND {table}.\"views\" < ?", vec![1i32.into(), 9i32.into()]);
        let fragment = compile_raw(&base, &raw).unwrap();
        assert_eq!(
            fragment.to_sql(Dialect::Postgres).0,
            "(\"p\".\"views\" > $1 AND \"p\".\"views\" < $2)"
        );

        let mismatched = RawExpression::new("{table}.\"views\" > ?", vec![]);
        assert!(compile_raw(&base, &mismatched).is_err());
    }

    #[test]
    fn search_covers_text_and_numeric_fields() {
        let catalog = blog_catalog();
        let provider = StaticPermissionProvider::default();
        let caller = Accountability::admin("1");
        let access = admin_access(&catalog, &provider, &caller);
        let mut compiler = SqlCompiler::new(&access, Dialect::Sqlite, true);
        let base = TableRef::new("tags", "tags", "");

        let sql = compiler
            .compile_search(&base, "12", None)
            .unwrap()
            .unwrap()
            .to_sql(Dialect::Sqlite)
            .0;
        assert_eq!(
            sql,
            "(\"tags\".\"id\" = ?) OR (LOWER(\"tags\".\"name\") LIKE LOWER(?) ESCAPE '\\')"
        );

        let dotted = compiler.compile_search(&base, "x", Some(&["author.name".to_string()]));
        assert!(matches!(dotted, Err(Error::QueryError(QueryError::InvalidFilter(_)))));
    }
}
