//! Store configuration
//!
//! Selects the backend a store is opened against. Configuration is loaded
//! from environment variables with defaults suitable for local development.

use crate::{ConfigError, TenantKvResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default Redis endpoint.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default number of keys requested per Redis `SCAN` round trip.
pub const DEFAULT_SCAN_BATCH: usize = 100;

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

/// Which backend a store talks to, and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Process-local concurrent store.
    Memory,
    /// Remote Redis-compatible cache.
    Redis {
        /// Connection URL, e.g. `redis://host:6379/0`.
        url: String,
        /// Keys requested per `SCAN` round trip during GetAll.
        scan_batch: usize,
    },
    /// LMDB environment on local disk.
    Lmdb {
        /// Directory holding the LMDB files (created if missing).
        path: PathBuf,
        /// Maximum map size in megabytes.
        max_size_mb: usize,
    },
}

impl BackendConfig {
    /// Short lowercase backend name, as accepted by `TENANTKV_BACKEND`.
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::Redis { .. } => "redis",
            BackendConfig::Lmdb { .. } => "lmdb",
        }
    }
}

/// Master store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
        }
    }
}

impl StoreConfig {
    /// In-memory configuration.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Redis configuration with the default scan batch.
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig::Redis {
                url: url.into(),
                scan_batch: DEFAULT_SCAN_BATCH,
            },
        }
    }

    /// LMDB configuration with the default map size.
    pub fn lmdb(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Lmdb {
                path: path.into(),
                max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
            },
        }
    }

    /// Create a StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TENANTKV_BACKEND`: `memory`, `redis` or `lmdb` (default: memory)
    /// - `TENANTKV_REDIS_URL`: Redis URL (default: redis://127.0.0.1:6379)
    /// - `TENANTKV_SCAN_BATCH`: keys per SCAN round trip (default: 100)
    /// - `TENANTKV_LMDB_PATH`: LMDB directory (required for lmdb)
    /// - `TENANTKV_LMDB_MAX_SIZE_MB`: LMDB map size (default: 64)
    pub fn from_env() -> TenantKvResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a StoreConfig from an arbitrary variable lookup.
    ///
    /// The result is validated before it is returned.
    pub fn from_lookup<F>(lookup: F) -> TenantKvResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_name = lookup("TENANTKV_BACKEND")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "memory".to_string());

        let backend = match backend_name.as_str() {
            "memory" => BackendConfig::Memory,
            "redis" => BackendConfig::Redis {
                url: lookup("TENANTKV_REDIS_URL")
                    .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
                scan_batch: parse_usize(&lookup, "TENANTKV_SCAN_BATCH", DEFAULT_SCAN_BATCH)?,
            },
            "lmdb" => BackendConfig::Lmdb {
                path: lookup("TENANTKV_LMDB_PATH")
                    .map(PathBuf::from)
                    .ok_or_else(|| ConfigError::MissingRequired {
                        field: "TENANTKV_LMDB_PATH".to_string(),
                    })?,
                max_size_mb: parse_usize(
                    &lookup,
                    "TENANTKV_LMDB_MAX_SIZE_MB",
                    DEFAULT_LMDB_MAX_SIZE_MB,
                )?,
            },
            other => {
                return Err(ConfigError::BackendNotSupported {
                    backend: other.to_string(),
                }
                .into())
            }
        };

        let config = Self { backend };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - Redis URL is non-empty and scan batch is positive
    /// - LMDB path is non-empty and map size is positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.backend {
            BackendConfig::Memory => Ok(()),
            BackendConfig::Redis { url, scan_batch } => {
                if url.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "url".to_string(),
                        value: url.clone(),
                        reason: "Redis URL must not be empty".to_string(),
                    });
                }
                if *scan_batch == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "scan_batch".to_string(),
                        value: scan_batch.to_string(),
                        reason: "scan_batch must be greater than 0".to_string(),
                    });
                }
                Ok(())
            }
            BackendConfig::Lmdb { path, max_size_mb } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "path".to_string(),
                        value: String::new(),
                        reason: "LMDB path must not be empty".to_string(),
                    });
                }
                if *max_size_mb == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "max_size_mb".to_string(),
                        value: max_size_mb.to_string(),
                        reason: "max_size_mb must be greater than 0".to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}

fn parse_usize<F>(lookup: &F, field: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(field) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.clone(),
            reason: "expected a non-negative integer".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TenantKvError;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_to_memory() {
        let config = StoreConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, StoreConfig::memory());
        assert_eq!(config.backend.name(), "memory");
    }

    #[test]
    fn test_redis_from_lookup() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("TENANTKV_BACKEND", "Redis"),
            ("TENANTKV_REDIS_URL", "redis://cache:6380/2"),
            ("TENANTKV_SCAN_BATCH", "500"),
        ]))
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Redis {
                url: "redis://cache:6380/2".to_string(),
                scan_batch: 500,
            }
        );
    }

    #[test]
    fn test_redis_defaults() {
        let config = StoreConfig::from_lookup(lookup_from(&[("TENANTKV_BACKEND", "redis")])).unwrap();
        assert_eq!(config, StoreConfig::redis(DEFAULT_REDIS_URL));
    }

    #[test]
    fn test_lmdb_requires_path() {
        let err = StoreConfig::from_lookup(lookup_from(&[("TENANTKV_BACKEND", "lmdb")])).unwrap_err();
        assert_eq!(
            err,
            TenantKvError::Config(ConfigError::MissingRequired {
                field: "TENANTKV_LMDB_PATH".to_string()
            })
        );
    }

    #[test]
    fn test_lmdb_from_lookup() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("TENANTKV_BACKEND", "lmdb"),
            ("TENANTKV_LMDB_PATH", "/var/lib/tenantkv"),
            ("TENANTKV_LMDB_MAX_SIZE_MB", "256"),
        ]))
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Lmdb {
                path: PathBuf::from("/var/lib/tenantkv"),
                max_size_mb: 256,
            }
        );
    }

    #[test]
    fn test_unknown_backend() {
        let err = StoreConfig::from_lookup(lookup_from(&[("TENANTKV_BACKEND", "memcached")])).unwrap_err();
        assert!(matches!(
            err,
            TenantKvError::Config(ConfigError::BackendNotSupported { .. })
        ));
    }

    #[test]
    fn test_unparsable_number() {
        let err = StoreConfig::from_lookup(lookup_from(&[
            ("TENANTKV_BACKEND", "redis"),
            ("TENANTKV_SCAN_BATCH", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("TENANTKV_SCAN_BATCH"));
    }

    #[test]
    fn test_validate_rejects_zero_scan_batch() {
        let config = StoreConfig {
            backend: BackendConfig::Redis {
                url: DEFAULT_REDIS_URL.to_string(),
                scan_batch: 0,
            },
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "scan_batch"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_url_and_path() {
        assert!(StoreConfig::redis("  ").validate().is_err());
        assert!(StoreConfig::lmdb("").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_map_size() {
        let config = StoreConfig {
            backend: BackendConfig::Lmdb {
                path: PathBuf::from("/tmp/kv"),
                max_size_mb: 0,
            },
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_tagged_by_kind() {
        let json = serde_json::to_value(StoreConfig::redis("redis://localhost")).unwrap();
        assert_eq!(json["backend"]["kind"], "redis");
        assert_eq!(json["backend"]["scan_batch"], 100);
    }
}
