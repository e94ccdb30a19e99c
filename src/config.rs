use std::str::FromStr;

use crate::{
    cache::redis::DEFAULT_NAMESPACE,
    error::ConfigError,
    model::app::{EngineSettings, DEFAULT_CACHE_CAPACITY, DEFAULT_LIMIT, DEFAULT_WILDCARD_DEPTH},
};

/// Read cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStore {
    Memory,
    Redis,
    None,
}

impl FromStr for CacheStore {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheStore::Memory),
            "redis" | "valkey" => Ok(CacheStore::Redis),
            "none" | "off" => Ok(CacheStore::None),
            other => Err(format!("expected memory, redis or none, got \"{}\"", other)),
        }
    }
}

pub struct Config {
    pub database_url: String,
    pub schema_path: String,
    pub permissions_path: Option<String>,
    pub cache_store: CacheStore,
    pub cache_capacity: usize,
    pub valkey_url: Option<String>,
    pub cache_namespace: String,
    pub settings: EngineSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cache_store = parse_or("CACHE_STORE", CacheStore::Memory)?;
        let valkey_url = optional("VALKEY_URL");
        if cache_store == CacheStore::Redis && valkey_url.is_none() {
            return Err(ConfigError::MissingEnvVar("VALKEY_URL".to_string()));
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            schema_path: required("SCHEMA_PATH")?,
            permissions_path: optional("PERMISSIONS_PATH"),
            cache_store,
            cache_capacity: parse_or("CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?,
            valkey_url,
            cache_namespace: optional("CACHE_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            settings: EngineSettings {
                limit_default: parse_or("QUERY_LIMIT_DEFAULT", DEFAULT_LIMIT)?,
                limit_max: parse_or("QUERY_LIMIT_MAX", -1)?,
                wildcard_depth: parse_or("RECURSIVE_WILDCARD_DEPTH", DEFAULT_WILDCARD_DEPTH)?,
                tenant_enforcement: parse_or("TENANT_ENFORCEMENT", true)?,
                audit_enabled: parse_or("AUDIT_ENABLED", true)?,
                ..EngineSettings::default()
            },
        })
    }
}

fn required(var: &str) -> Result<String, ConfigError> {
    optional(var).ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnvValue {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cache_stores() {
        assert_eq!("Memory".parse::<CacheStore>(), Ok(CacheStore::Memory));
        assert_eq!("valkey".parse::<CacheStore>(), Ok(CacheStore::Redis));
        assert_eq!("none".parse::<CacheStore>(), Ok(CacheStore::None));
        assert!("disk".parse::<CacheStore>().is_err());
    }
}
