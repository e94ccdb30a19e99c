//! Tests for Config::from_env
//!
//! Environment variables are process-wide, so every case runs inside a single test of
//! its own test binary.

use mimir::{
    config::{CacheStore, Config},
    error::ConfigError,
};

const VARS: [&str; 10] = [
    "DATABASE_URL",
    "SCHEMA_PATH",
    "PERMISSIONS_PATH",
    "CACHE_STORE",
    "CACHE_CAPACITY",
    "VALKEY_URL",
    "CACHE_NAMESPACE",
    "QUERY_LIMIT_DEFAULT",
    "QUERY_LIMIT_MAX",
    "TENANT_ENFORCEMENT",
];

fn reset() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

/// Tests defaults, overrides and the failures of configuration loading.
///
/// Expected: missing required variables and unparsable values are reported by name
#[test]
fn loads_configuration_from_the_environment() {
    reset();
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::MissingEnvVar(var)) if var == "DATABASE_URL"
    ));

    std::env::set_var("DATABASE_URL", "sqlite::memory:");
    std::env::set_var("SCHEMA_PATH", "schema.json");
    let config = Config::from_env().expect("Failed to load defaults");
    assert_eq!(config.cache_store, CacheStore::Memory);
    assert_eq!(config.cache_namespace, "mimir:cache");
    assert!(config.permissions_path.is_none());
    assert!(config.settings.tenant_enforcement);
    assert_eq!(config.settings.limit_max, -1);

    std::env::set_var("QUERY_LIMIT_DEFAULT", "25");
    std::env::set_var("TENANT_ENFORCEMENT", "false");
    std::env::set_var("CACHE_STORE", "none");
    let config = Config::from_env().expect("Failed to load overrides");
    assert_eq!(config.settings.limit_default, 25);
    assert!(!config.settings.tenant_enforcement);
    assert_eq!(config.cache_store, CacheStore::None);

    std::env::set_var("QUERY_LIMIT_MAX", "lots");
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidEnvValue { var, .. }) if var == "QUERY_LIMIT_MAX"
    ));
    std::env::remove_var("QUERY_LIMIT_MAX");

    std::env::set_var("CACHE_STORE", "redis");
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::MissingEnvVar(var)) if var == "VALKEY_URL"
    ));
    std::env::set_var("VALKEY_URL", "redis://127.0.0.1:6379");
    assert_eq!(
        Config::from_env().expect("Failed to load redis store").cache_store,
        CacheStore::Redis
    );

    reset();
}
