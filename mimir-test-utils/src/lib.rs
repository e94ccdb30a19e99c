//! Test harness for mimir: an in-memory SQLite database with the blog demo schema,
//! fixtures, and a Redis helper for the Redis cache tests.

pub mod builder;
pub mod context;
pub mod error;
pub mod fixtures;
pub mod redis;

pub use builder::TestBuilder;
pub use context::TestContext;
pub use error::TestError;
pub use redis::RedisTest;

pub mod prelude {
    pub use crate::{fixtures::blog, TestBuilder, TestContext, TestError};
}
