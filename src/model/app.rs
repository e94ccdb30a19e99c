use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    audit::{AuditSink, TracingAuditSink},
    cache::{CacheLayer, CacheProvider, MemoryCache},
    error::Error,
    hook::HookRegistry,
    notify::{NoopNotifier, Notifier},
    permission::{PermissionProvider, StaticPermissionProvider},
    schema::SchemaCatalog,
    sql::Dialect,
};

pub const DEFAULT_LIMIT: i64 = 100;
pub const DEFAULT_WILDCARD_DEPTH: usize = 7;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Query shaping and pipeline switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Limit applied when a query names none.
    pub limit_default: i64,
    /// Upper bound for every limit, `-1` for none.
    pub limit_max: i64,
    /// Deepest level a recursive wildcard (`author.*.*`) expands to.
    pub wildcard_depth: usize,
    /// Fail reads and writes of multi-tenant collections without a tenant.
    pub tenant_enforcement: bool,
    pub audit_enabled: bool,
    /// Most keys bound into one `IN (...)` list.
    pub batch_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            limit_default: DEFAULT_LIMIT,
            limit_max: -1,
            wildcard_depth: DEFAULT_WILDCARD_DEPTH,
            tenant_enforcement: true,
            audit_enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Everything an engine needs, constructed once by the host and shared by clones.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub catalog: Arc<SchemaCatalog>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub cache: Arc<CacheLayer>,
    pub audit: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn Notifier>,
    pub hooks: Arc<HookRegistry>,
    pub settings: EngineSettings,
    pub dialect: Dialect,
}

impl AppState {
    /// State with an in-memory cache, no permission entries, audit through `tracing`
    /// and no change notifications. Swap providers with the `with_*` methods.
    pub fn new(db: DatabaseConnection, catalog: SchemaCatalog) -> Result<Self, Error> {
        let dialect = Dialect::from_backend(db.get_database_backend())?;
        Ok(Self {
            db,
            catalog: Arc::new(catalog),
            permissions: Arc::new(StaticPermissionProvider::default()),
            cache: Arc::new(CacheLayer::new(Arc::new(MemoryCache::new(DEFAULT_CACHE_CAPACITY)))),
            audit: Arc::new(TracingAuditSink),
            notifier: Arc::new(NoopNotifier),
            hooks: Arc::new(HookRegistry::new()),
            settings: EngineSettings::default(),
            dialect,
        })
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_cache(mut self, provider: Arc<dyn CacheProvider>) -> Self {
        self.cache = Arc::new(CacheLayer::new(provider));
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }
}
