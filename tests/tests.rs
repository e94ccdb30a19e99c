mod engine;

#[cfg(feature = "redis-test")]
mod redis;
