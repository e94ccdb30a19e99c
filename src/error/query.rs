//! Query compilation error types.
//!
//! Raised while turning a caller supplied [`Query`](crate::model::query::Query) into SQL.
//! These are always caller mistakes (unknown names, malformed operators) and surface
//! as [`ErrorKind::InvalidQuery`](super::ErrorKind::InvalidQuery).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Collection \"{0}\" does not exist")]
    UnknownCollection(String),
    #[error("Field \"{field}\" does not exist in collection \"{collection}\"")]
    UnknownField { collection: String, field: String },
    #[error("Relation \"{relation}\" does not exist in collection \"{collection}\"")]
    UnknownRelation {
        collection: String,
        relation: String,
    },
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid sort: {0}")]
    InvalidSort(String),
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),
    #[error("Invalid aggregate: {0}")]
    InvalidAggregate(String),
    #[error("Invalid field path \"{0}\"")]
    InvalidFieldPath(String),
    /// `date:<unit>:<field>` pseudo-fields are only valid in sort and group-by clauses.
    #[error("Pseudo-field \"{0}\" cannot be selected as a column")]
    PseudoFieldInSelect(String),
    #[error("Invalid value for field \"{field}\": {reason}")]
    InvalidValue { field: String, reason: String },
}
