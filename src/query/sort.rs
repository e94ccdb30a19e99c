//! Sort compilation and `date:<unit>:<field>` pseudo-fields.

use crate::{
    error::{Error, QueryError},
    model::query::SortTerm,
    query::{plan::OrderTerm, SqlCompiler, TableRef},
    sql::DateUnit,
};

const DATE_PREFIX: &str = "date:";

/// Date bucket of a temporal field, only valid in sort and group-by clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoField<'p> {
    pub unit: DateUnit,
    pub field: &'p str,
}

impl<'p> PseudoField<'p> {
    /// `None` when `path` is not a pseudo-field at all.
    pub fn parse(path: &'p str) -> Option<Result<Self, QueryError>> {
        let rest = path.strip_prefix(DATE_PREFIX)?;
        let parsed = rest
            .split_once(':')
            .and_then(|(unit, field)| {
                let unit = DateUnit::parse(unit)?;
                (!field.is_empty()).then_some(PseudoField { unit, field })
            })
            .ok_or_else(|| QueryError::InvalidFieldPath(path.to_string()));
        Some(parsed)
    }

    pub fn is_pseudo(path: &str) -> bool {
        path.starts_with(DATE_PREFIX)
    }
}

impl SqlCompiler<'_> {
    /// ORDER BY terms for `terms`, joining relation paths like filters do.
    pub fn compile_sort(&mut self, base: &TableRef, terms: &[SortTerm]) -> Result<Vec<OrderTerm>, Error> {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            if term.field.is_empty() {
                return Err(QueryError::InvalidSort("empty sort field".to_string()).into());
            }
            let column = self.resolve_column(base, &term.field)?;
            out.push(OrderTerm {
                expr: column.expr,
                descending: term.descending,
            });
        }
        Ok(out)
    }
}
