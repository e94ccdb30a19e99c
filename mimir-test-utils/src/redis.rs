use crate::TestError;
use fred::prelude::*;

static CLEANUP_SCRIPT: &str = r#"
local cursor = '0'
local removed = 0
repeat
    local result = redis.call('SCAN', cursor, 'MATCH', ARGV[1], 'COUNT', 500)
    cursor = result[1]
    for _, key in ipairs(result[2]) do
        removed = removed + redis.call('DEL', key)
    end
until cursor == '0'
return removed
"#;

/// Redis test setup with automatic cleanup
///
/// Holds a connection pool and a unique key namespace so parallel tests never see each
/// other's cache entries. Every key of the namespace is removed when the struct is
/// dropped.
pub struct RedisTest {
    pub redis_pool: Pool,
    namespace: String,
}

impl RedisTest {
    /// Connect to the local Redis/Valkey instance with a fresh namespace
    pub async fn new() -> Result<Self, TestError> {
        let url = std::env::var("VALKEY_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let redis_config = Config::from_url(&url)?;
        let redis_pool = Pool::new(redis_config, None, None, None, 5)?;
        redis_pool.init().await?;

        Ok(RedisTest {
            redis_pool,
            namespace: Self::generate_unique_namespace(),
        })
    }

    /// Key namespace reserved for this test instance
    pub fn namespace(&self) -> String {
        self.namespace.clone()
    }

    /// Generate a unique namespace using timestamp and thread ID
    fn generate_unique_namespace() -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        use std::time::{SystemTime, UNIX_EPOCH};

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut hasher = DefaultHasher::new();
        timestamp.hash(&mut hasher);
        std::thread::current().id().hash(&mut hasher);

        format!("test:{}:{:x}:cache", timestamp, hasher.finish())
    }
}

impl Drop for RedisTest {
    fn drop(&mut self) {
        // Spawned rather than blocked on to avoid "runtime within runtime" errors
        let pool = self.redis_pool.clone();
        let pattern = format!("{}:*", self.namespace);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _: Result<i64, fred::error::Error> = pool
                    .eval(CLEANUP_SCRIPT, Vec::<String>::new(), vec![pattern])
                    .await;
            });
        }
    }
}
