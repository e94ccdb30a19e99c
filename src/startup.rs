use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    audit::{DatabaseAuditSink, TracingAuditSink},
    cache::{CacheProvider, MemoryCache, NoCache, RedisCache},
    config::{CacheStore, Config},
    error::{ConfigError, Error},
    model::app::AppState,
    permission::{DatabasePermissionProvider, PermissionProvider, StaticPermissionProvider},
    schema::SchemaCatalog,
};

/// Connect to the database and run migrations
pub async fn connect_to_database(config: &Config) -> Result<DatabaseConnection, Error> {
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database};

    let mut opt = ConnectOptions::new(&config.database_url);
    opt.sqlx_logging(false);

    let db = Database::connect(opt).await?;
    Migrator::up(&db, None).await?;

    Ok(db)
}

/// Build the read cache selected by `CACHE_STORE`
pub fn build_cache(config: &Config) -> Result<Arc<dyn CacheProvider>, Error> {
    Ok(match config.cache_store {
        CacheStore::Memory => Arc::new(MemoryCache::new(config.cache_capacity)),
        CacheStore::None => Arc::new(NoCache),
        CacheStore::Redis => {
            let url = config
                .valkey_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingEnvVar("VALKEY_URL".to_string()))?;
            Arc::new(RedisCache::from_url(url, config.cache_namespace.clone())?)
        }
    })
}

/// Permissions from `PERMISSIONS_PATH`, or the `mimir_permission` table when unset
pub fn build_permissions(config: &Config, db: &DatabaseConnection) -> Result<Arc<dyn PermissionProvider>, Error> {
    Ok(match &config.permissions_path {
        Some(path) => Arc::new(StaticPermissionProvider::from_file(path)?),
        None => Arc::new(DatabasePermissionProvider::new(db.clone())),
    })
}

/// Assemble the engine state for the binary host
pub async fn build_state(config: &Config) -> Result<AppState, Error> {
    let catalog = SchemaCatalog::from_file(&config.schema_path)?;
    let db = connect_to_database(config).await?;
    let permissions = build_permissions(config, &db)?;
    let cache = build_cache(config)?;

    let state = AppState::new(db.clone(), catalog)?
        .with_permissions(permissions)
        .with_cache(cache)
        .with_settings(config.settings.clone());

    Ok(if config.settings.audit_enabled {
        state.with_audit(Arc::new(DatabaseAuditSink::new(db)))
    } else {
        state.with_audit(Arc::new(TracingAuditSink))
    })
}
