//! API Configuration Module
//!
//! Listen address and request limits for the HTTP layer, wrapping the
//! service-wide [`SluiceConfig`]. Loaded from environment variables with
//! defaults suited to development.

use std::net::SocketAddr;

use sluice_core::{ConfigError, SluiceConfig};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Default upload body limit for processing code (8 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind: String,

    /// Port to listen on.
    pub port: u16,

    /// Upper bound on a processing code upload body.
    pub max_upload_bytes: usize,

    /// Collaborator endpoints, caches, timeouts and sandbox limits.
    pub sluice: SluiceConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            sluice: SluiceConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SLUICE_API_BIND`: interface (default: 0.0.0.0)
    /// - `PORT` or `SLUICE_API_PORT`: port (default: 8000)
    /// - `SLUICE_MAX_UPLOAD_BYTES`: upload limit (default: 8 MiB)
    /// - every variable read by [`SluiceConfig::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT").or_else(|| lookup("SLUICE_API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "SLUICE_API_PORT".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            None => defaults.port,
        };

        let max_upload_bytes = match lookup("SLUICE_MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "SLUICE_MAX_UPLOAD_BYTES".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            None => defaults.max_upload_bytes,
        };

        Ok(Self {
            bind: lookup("SLUICE_API_BIND").unwrap_or(defaults.bind),
            port,
            max_upload_bytes,
            sluice: SluiceConfig::from_lookup(&lookup)?,
        })
    }

    /// Resolve the socket address to listen on.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "SLUICE_API_BIND".to_string(),
                value: addr.clone(),
                reason: e.to_string(),
            })
    }
}
