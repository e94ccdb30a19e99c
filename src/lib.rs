//! Permission-aware, multi-tenant data access over a relational database.
//!
//! A [`SchemaCatalog`](schema::SchemaCatalog) describes the collections, their fields and
//! relations. Reads compile declarative [`Query`](model::query::Query) values into SQL
//! with the caller's permission and tenant predicates injected, load nested relations in
//! batches and cache results per caller. Mutations run through a transactional pipeline
//! with validation, nested relational writes, hooks, audit entries and change
//! notifications.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod audit;
pub mod cache;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod hook;
pub mod model;
pub mod notify;
pub mod permission;
pub mod query;
pub mod schema;
pub mod service;
pub mod sql;
pub mod startup;
pub mod util;

pub use engine::Engine;
pub use error::Error;
