//! Business logic on top of the data layer.

pub mod item;
