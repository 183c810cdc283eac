//! Configuration management for the Catalog Sync Agent

use std::env;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::sync::DEFAULT_MAX_BATCH;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Shared secret expected in `x-sync-token`. Sync routes refuse to run
    /// without one.
    pub shared_secret: Option<String>,
    pub max_batch: usize,
    pub tombstone_retention_days: i64,
    /// Period of the tombstone purge task, 0 disables it
    pub gc_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            store: StoreConfig {
                backend: StoreBackend::Sqlite,
                database_url: "sqlite:./catalog.db".to_string(),
            },
            sync: SyncConfig {
                shared_secret: None,
                max_batch: DEFAULT_MAX_BATCH,
                tombstone_retention_days: 30,
                gc_interval_secs: 3600,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_or(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            store: StoreConfig {
                backend: match lookup("STORE_BACKEND").as_deref() {
                    None | Some("sqlite") => StoreBackend::Sqlite,
                    Some("memory") => StoreBackend::Memory,
                    Some(other) => {
                        return Err(ConfigError::Invalid {
                            var: "STORE_BACKEND",
                            value: other.to_string(),
                        })
                    }
                },
                database_url: lookup("DATABASE_URL").unwrap_or(defaults.store.database_url),
            },
            sync: SyncConfig {
                shared_secret: lookup("SYNC_SHARED_SECRET").filter(|s| !s.trim().is_empty()),
                max_batch: parse_or(&lookup, "SYNC_MAX_BATCH", defaults.sync.max_batch)?,
                tombstone_retention_days: parse_or(
                    &lookup,
                    "TOMBSTONE_RETENTION_DAYS",
                    defaults.sync.tombstone_retention_days,
                )?,
                gc_interval_secs: parse_or(
                    &lookup,
                    "TOMBSTONE_GC_INTERVAL_SECS",
                    defaults.sync.gc_interval_secs,
                )?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(config.sync.shared_secret.is_none());
        assert_eq!(config.sync.max_batch, DEFAULT_MAX_BATCH);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_PORT", "8088"),
            ("STORE_BACKEND", "memory"),
            ("SYNC_SHARED_SECRET", "s3cret"),
            ("SYNC_MAX_BATCH", "50"),
            ("TOMBSTONE_GC_INTERVAL_SECS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.sync.shared_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.sync.max_batch, 50);
        assert_eq!(config.sync.gc_interval_secs, 0);
    }

    #[test]
    fn test_blank_secret_counts_as_missing() {
        let config = Config::from_lookup(lookup(&[("SYNC_SHARED_SECRET", "  ")])).unwrap();
        assert!(config.sync.shared_secret.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("SERVER_PORT", "eighty")])),
            Err(ConfigError::Invalid { var: "SERVER_PORT", .. })
        ));
        assert!(Config::from_lookup(lookup(&[("STORE_BACKEND", "redis")])).is_err());
    }
}
