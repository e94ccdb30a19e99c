//! Parameterised SQL fragments.
//!
//! Dynamic statements are assembled from [`Fragment`]s holding SQL text interleaved with
//! bound values. Placeholders are only numbered when a complete statement is rendered for
//! a backend, so fragments compiled independently (filters, joins, sort terms) can be
//! combined freely.

pub mod dialect;
pub mod value;

use sea_orm::{Statement, Value};

pub use dialect::{DateUnit, Dialect};
pub use value::ColumnKind;

#[derive(Debug, Clone, PartialEq)]
enum Chunk {
    Sql(String),
    Value(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    chunks: Vec<Chunk>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(sql: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_sql(sql);
        fragment
    }

    pub fn value(value: impl Into<Value>) -> Self {
        let mut fragment = Self::new();
        fragment.push_value(value);
        fragment
    }

    /// `"alias"."column"`
    pub fn column(alias: &str, column: &str) -> Self {
        Self::sql(format!("{}.{}", quote(alias), quote(column)))
    }

    pub fn push_sql(&mut self, sql: impl Into<String>) -> &mut Self {
        let sql = sql.into();
        if sql.is_empty() {
            return self;
        }
        match self.chunks.last_mut() {
            Some(Chunk::Sql(last)) => last.push_str(&sql),
            _ => self.chunks.push(Chunk::Sql(sql)),
        }
        self
    }

    pub fn push_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.chunks.push(Chunk::Value(value.into()));
        self
    }

    pub fn push(&mut self, other: Fragment) -> &mut Self {
        for chunk in other.chunks {
            match chunk {
                Chunk::Sql(sql) => {
                    self.push_sql(sql);
                }
                Chunk::Value(value) => {
                    self.chunks.push(Chunk::Value(value));
                }
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// `(self)`
    pub fn parens(self) -> Fragment {
        let mut out = Fragment::sql("(");
        out.push(self);
        out.push_sql(")");
        out
    }

    /// Joins fragments with `separator`.
    pub fn join(parts: impl IntoIterator<Item = Fragment>, separator: &str) -> Fragment {
        let mut out = Fragment::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.push_sql(separator);
            }
            out.push(part);
        }
        out
    }

    /// Conjunction of the parts, `None` when there are none.
    pub fn and(parts: Vec<Fragment>) -> Option<Fragment> {
        Self::group(parts, " AND ")
    }

    /// Disjunction of the parts, `None` when there are none.
    pub fn or(parts: Vec<Fragment>) -> Option<Fragment> {
        Self::group(parts, " OR ")
    }

    fn group(mut parts: Vec<Fragment>, separator: &str) -> Option<Fragment> {
        parts.retain(|p| !p.is_empty());
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Fragment::join(parts.into_iter().map(Fragment::parens), separator)),
        }
    }

    /// `self IN (v1, v2, ...)`, or a false condition for an empty list.
    pub fn in_list(self, values: Vec<Value>, negate: bool) -> Fragment {
        if values.is_empty() {
            return Fragment::sql(if negate { "1 = 1" } else { "1 = 0" });
        }
        let mut out = self;
        out.push_sql(if negate { " NOT IN (" } else { " IN (" });
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                out.push_sql(", ");
            }
            out.push_value(value);
        }
        out.push_sql(")");
        out
    }

    /// SQL text with backend placeholders, plus the bound values in order.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut values = Vec::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Sql(text) => sql.push_str(text),
                Chunk::Value(value) => {
                    values.push(value.clone());
                    sql.push_str(&dialect.placeholder(values.len()));
                }
            }
        }
        (sql, values)
    }

    pub fn render(&self, dialect: Dialect) -> Statement {
        let (sql, values) = self.to_sql(dialect);
        tracing::trace!(sql = %sql, params = values.len(), "rendered statement");
        Statement::from_sql_and_values(dialect.backend(), sql, values)
    }
}

/// Quotes an identifier or alias.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Escapes `%`, `_` and `\` for use inside a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_placeholders_per_backend() {
        let mut fragment = Fragment::column("posts", "id");
        fragment.push_sql(" = ");
        fragment.push_value(1i32);
        let fragment = Fragment::and(vec![fragment, Fragment::sql("1 = 1")]).unwrap();
        let mut fragment = fragment;
        fragment.push_sql(" AND \"x\" = ").push_value("a");

        let (pg, values) = fragment.to_sql(Dialect::Postgres);
        assert_eq!(pg, "(\"posts\".\"id\" = $1) AND (1 = 1) AND \"x\" = $2");
        assert_eq!(values.len(), 2);

        let (sqlite, _) = fragment.to_sql(Dialect::Sqlite);
        assert_eq!(sqlite, "(\"posts\".\"id\" = ?) AND (1 = 1) AND \"x\" = ?");
    }

    #[test]
    fn empty_groups_are_omitted() {
        assert!(Fragment::and(vec![]).is_none());
        assert!(Fragment::or(vec![Fragment::new()]).is_none());
        let single = Fragment::and(vec![Fragment::sql("a")]).unwrap();
        assert_eq!(single.to_sql(Dialect::Sqlite).0, "a");
    }

    #[test]
    fn empty_in_list_is_false() {
        let fragment = Fragment::column("t", "id").in_list(vec![], false);
        assert_eq!(fragment.to_sql(Dialect::Sqlite).0, "1 = 0");
    }

    #[test]
    fn quotes_and_escapes() {
        assert_eq!(quote("posts__author"), "\"posts__author\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
