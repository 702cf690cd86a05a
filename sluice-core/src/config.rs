//! Service configuration.
//!
//! Loaded from `SLUICE_*` environment variables with development defaults.
//! Unparseable values are reported instead of silently replaced.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Cache settings shared by the binding and transform caches.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// How long a resolved tenant binding stays valid.
    pub binding_ttl: Duration,
    /// How long a loaded transform instance stays cached.
    pub transform_ttl: Duration,
    /// Upper bound on entries per cache.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            binding_ttl: Duration::from_secs(600),
            transform_ttl: Duration::from_secs(3600),
            max_entries: 10_000,
        }
    }
}

/// Timeouts applied to the three external calls of a pipeline execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutSettings {
    pub validator: Duration,
    pub artifact_fetch: Duration,
    pub commit: Duration,
    pub notify: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            validator: Duration::from_millis(5_000),
            artifact_fetch: Duration::from_millis(5_000),
            commit: Duration::from_millis(10_000),
            notify: Duration::from_millis(2_000),
        }
    }
}

/// Sandbox limits for tenant transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformLimits {
    /// Execution budget per record.
    pub fuel_per_record: u64,
    /// Linear memory cap per instance, in bytes.
    pub max_memory_bytes: usize,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            fuel_per_record: 10_000_000,
            max_memory_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SluiceConfig {
    /// Authorization service endpoint (`?key=..&collection=..` is appended).
    pub validation_url: String,
    /// Notification sink base URL (`/<collection>` is appended).
    pub notify_url: String,
    /// Root directory of the filesystem artifact store.
    pub artifact_dir: PathBuf,
    /// Directory of the LMDB column store.
    pub store_path: PathBuf,
    /// LMDB map size in megabytes.
    pub store_max_mb: usize,
    /// Physical tables created at boot.
    pub provision_tables: Vec<String>,
    pub cache: CacheSettings,
    pub timeouts: TimeoutSettings,
    pub limits: TransformLimits,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self {
            validation_url: "http://127.0.0.1:8000/api/key/validate".to_string(),
            notify_url: "http://localhost:8001".to_string(),
            artifact_dir: PathBuf::from("./data/processing_codes"),
            store_path: PathBuf::from("./data/store"),
            store_max_mb: 1024,
            provision_tables: Vec::new(),
            cache: CacheSettings::default(),
            timeouts: TimeoutSettings::default(),
            limits: TransformLimits::default(),
        }
    }
}

impl SluiceConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `SLUICE_VALIDATION_URL`, `SLUICE_NOTIFY_URL`
    /// - `SLUICE_ARTIFACT_DIR`, `SLUICE_STORE_PATH`, `SLUICE_STORE_MAX_MB`
    /// - `SLUICE_PROVISION_TABLES` (comma-separated)
    /// - `SLUICE_BINDING_TTL_SECS`, `SLUICE_TRANSFORM_TTL_SECS`, `SLUICE_CACHE_MAX_ENTRIES`
    /// - `SLUICE_VALIDATOR_TIMEOUT_MS`, `SLUICE_ARTIFACT_TIMEOUT_MS`,
    ///   `SLUICE_COMMIT_TIMEOUT_MS`, `SLUICE_NOTIFY_TIMEOUT_MS`
    /// - `SLUICE_TRANSFORM_FUEL`, `SLUICE_TRANSFORM_MEMORY_MB`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let provision_tables = lookup("SLUICE_PROVISION_TABLES")
            .map(|raw| {
                raw.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cache = CacheSettings {
            binding_ttl: Duration::from_secs(parse_or(
                &lookup,
                "SLUICE_BINDING_TTL_SECS",
                defaults.cache.binding_ttl.as_secs(),
            )?),
            transform_ttl: Duration::from_secs(parse_or(
                &lookup,
                "SLUICE_TRANSFORM_TTL_SECS",
                defaults.cache.transform_ttl.as_secs(),
            )?),
            max_entries: parse_or(&lookup, "SLUICE_CACHE_MAX_ENTRIES", defaults.cache.max_entries)?,
        };
        if cache.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SLUICE_CACHE_MAX_ENTRIES".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let timeouts = TimeoutSettings {
            validator: millis_or(&lookup, "SLUICE_VALIDATOR_TIMEOUT_MS", defaults.timeouts.validator)?,
            artifact_fetch: millis_or(
                &lookup,
                "SLUICE_ARTIFACT_TIMEOUT_MS",
                defaults.timeouts.artifact_fetch,
            )?,
            commit: millis_or(&lookup, "SLUICE_COMMIT_TIMEOUT_MS", defaults.timeouts.commit)?,
            notify: millis_or(&lookup, "SLUICE_NOTIFY_TIMEOUT_MS", defaults.timeouts.notify)?,
        };

        let memory_mb: usize = parse_or(
            &lookup,
            "SLUICE_TRANSFORM_MEMORY_MB",
            defaults.limits.max_memory_bytes / (1024 * 1024),
        )?;
        let max_memory_bytes = memory_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "SLUICE_TRANSFORM_MEMORY_MB".to_string(),
                value: memory_mb.to_string(),
                reason: "too large to express in bytes".to_string(),
            })?;
        let limits = TransformLimits {
            fuel_per_record: parse_or(
                &lookup,
                "SLUICE_TRANSFORM_FUEL",
                defaults.limits.fuel_per_record,
            )?,
            max_memory_bytes,
        };

        Ok(Self {
            validation_url: lookup("SLUICE_VALIDATION_URL").unwrap_or(defaults.validation_url),
            notify_url: lookup("SLUICE_NOTIFY_URL").unwrap_or(defaults.notify_url),
            artifact_dir: lookup("SLUICE_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            store_path: lookup("SLUICE_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            store_max_mb: parse_or(&lookup, "SLUICE_STORE_MAX_MB", defaults.store_max_mb)?,
            provision_tables,
            cache,
            timeouts,
            limits,
        })
    }
}

fn parse_or<F, T>(lookup: &F, field: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(field) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn millis_or<F>(lookup: &F, field: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, field, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() -> Result<(), ConfigError> {
        let config = SluiceConfig::from_lookup(|_| None)?;
        assert_eq!(config, SluiceConfig::default());
        assert_eq!(config.cache.binding_ttl, Duration::from_secs(600));
        assert_eq!(config.cache.transform_ttl, Duration::from_secs(3600));
        Ok(())
    }

    #[test]
    fn test_overrides_are_applied() -> Result<(), ConfigError> {
        let config = SluiceConfig::from_lookup(lookup_from(&[
            ("SLUICE_BINDING_TTL_SECS", "30"),
            ("SLUICE_COMMIT_TIMEOUT_MS", "250"),
            ("SLUICE_PROVISION_TABLES", "42_events, ,7_logs"),
            ("SLUICE_TRANSFORM_MEMORY_MB", "16"),
        ]))?;
        assert_eq!(config.cache.binding_ttl, Duration::from_secs(30));
        assert_eq!(config.timeouts.commit, Duration::from_millis(250));
        assert_eq!(config.provision_tables, vec!["42_events", "7_logs"]);
        assert_eq!(config.limits.max_memory_bytes, 16 * 1024 * 1024);
        Ok(())
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let result = SluiceConfig::from_lookup(lookup_from(&[("SLUICE_TRANSFORM_FUEL", "lots")]));
        match result {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "SLUICE_TRANSFORM_FUEL");
                assert_eq!(value, "lots");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_cache_capacity_rejected() {
        let result = SluiceConfig::from_lookup(lookup_from(&[("SLUICE_CACHE_MAX_ENTRIES", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_memory_limit_overflow_rejected() {
        let huge = usize::MAX.to_string();
        let result =
            SluiceConfig::from_lookup(lookup_from(&[("SLUICE_TRANSFORM_MEMORY_MB", huge.as_str())]));
        match result {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "SLUICE_TRANSFORM_MEMORY_MB");
                assert_eq!(value, huge);
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }
}
