//! Engine models and type definitions.
//!
//! Caller facing shapes (queries, filters, results, mutation options), the include tree
//! produced by the field expander, permission entries and the shared application state.

pub mod accountability;
pub mod app;
pub mod audit;
pub mod change;
pub mod filter;
pub mod include;
pub mod item;
pub mod mutation;
pub mod permission;
pub mod query;
