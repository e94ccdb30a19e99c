//! Declarative read query.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{error::QueryError, model::filter::Filter};

/// Read query as accepted by [`ItemService::read_by_query`](crate::service::item::ItemService::read_by_query).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    pub filter: Option<Filter>,
    pub sort: Option<SortSpec>,
    pub fields: Option<Vec<String>>,
    /// `-1` requests every row (still capped by the configured maximum).
    pub limit: Option<i64>,
    pub offset: Option<u64>,
    /// 1-based page number, takes precedence over `offset`.
    pub page: Option<u64>,
    pub search: Option<String>,
    pub search_fields: Option<Vec<String>>,
    pub aggregate: Option<Aggregate>,
    pub group_by: Option<Vec<String>>,
    /// Extra conditions per relation path, e.g. `{"comments": {"approved": true}}`.
    pub rel_conditions: BTreeMap<String, Filter>,
    /// Hide soft-deleted rows. `false` makes deleted rows visible.
    pub paranoid: Option<bool>,
    /// Explicit tenant, overriding the caller's own tenant.
    pub tenant: Option<String>,
    /// Single-valued relation paths that must exist; parents without them are dropped.
    pub required: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a query from caller JSON.
    pub fn from_json(value: JsonValue) -> Result<Self, QueryError> {
        serde_json::from_value(value).map_err(|e| QueryError::InvalidFilter(e.to_string()))
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort = Some(SortSpec::List(sort.into_iter().map(Into::into).collect()));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn rel_condition(mut self, path: impl Into<String>, filter: Filter) -> Self {
        self.rel_conditions.insert(path.into(), filter);
        self
    }

    pub fn require(mut self, path: impl Into<String>) -> Self {
        self.required.push(path.into());
        self
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.paranoid = Some(false);
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Whether soft-deleted rows are hidden.
    pub fn is_paranoid(&self) -> bool {
        self.paranoid.unwrap_or(true)
    }

    /// Normalised sort terms.
    pub fn sort_terms(&self) -> Result<Vec<SortTerm>, QueryError> {
        match &self.sort {
            Some(spec) => spec.terms(),
            None => Ok(Vec::new()),
        }
    }
}

/// Sort specification: ordered `"field"`/`"-field"` list, or an ordered `field -> asc|desc` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    List(Vec<String>),
    Map(IndexMap<String, String>),
}

impl SortSpec {
    pub fn terms(&self) -> Result<Vec<SortTerm>, QueryError> {
        match self {
            SortSpec::List(items) => items
                .iter()
                .filter(|s| !s.trim().is_empty())
                .map(|s| Ok(SortTerm::parse(s.trim())))
                .collect(),
            SortSpec::Map(map) => map
                .iter()
                .map(|(field, direction)| {
                    let descending = match direction.to_ascii_lowercase().as_str() {
                        "asc" => false,
                        "desc" => true,
                        other => {
                            return Err(QueryError::InvalidSort(format!(
                                "unknown direction \"{}\" for \"{}\"",
                                other, field
                            )))
                        }
                    };
                    Ok(SortTerm {
                        field: field.clone(),
                        descending,
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortTerm {
    pub field: String,
    pub descending: bool,
}

impl SortTerm {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: raw.trim_start_matches('+').to_string(),
                descending: false,
            },
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Aggregate functions and the fields they apply to (`"*"` for whole rows in `count`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Aggregate {
    pub count: Vec<String>,
    pub count_distinct: Vec<String>,
    pub sum: Vec<String>,
    pub avg: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::CountDistinct => "countDistinct",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

impl Aggregate {
    pub fn count_all() -> Self {
        Self {
            count: vec!["*".to_string()],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Flattened `(function, field)` pairs in a stable order.
    pub fn entries(&self) -> Vec<(AggregateFunction, &str)> {
        let groups = [
            (AggregateFunction::Count, &self.count),
            (AggregateFunction::CountDistinct, &self.count_distinct),
            (AggregateFunction::Sum, &self.sum),
            (AggregateFunction::Avg, &self.avg),
            (AggregateFunction::Min, &self.min),
            (AggregateFunction::Max, &self.max),
        ];
        groups
            .into_iter()
            .flat_map(|(func, fields)| fields.iter().map(move |f| (func, f.as_str())))
            .collect()
    }
}
