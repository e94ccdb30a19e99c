//! Data access layer.
//!
//! Repositories over sea-orm connections: the engine's own system tables (audit log,
//! permissions), row statements against catalog collections, the relation loader that
//! executes read plans, and the transaction wrapper used by the mutation pipeline.

pub mod audit;
pub mod item;
pub mod loader;
pub mod permission;
pub mod transaction;
