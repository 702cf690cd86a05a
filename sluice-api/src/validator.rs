//! Key validation against the external authorization service.
//!
//! The [`KeyValidator`] caches one [`TenantBinding`] per collection: the
//! tenant the service resolved and the key that was presented when it did.
//! While the binding is live, requests are answered from the cache alone,
//! and a request presenting any other key is rejected without a call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sluice_core::{
    Collection, SecretKey, SluiceError, SluiceResult, TenantBinding, TenantId,
};
use sluice_storage::{CacheStats, TtlCache, TtlCacheConfig};

use crate::telemetry::metrics;

// ============================================================================
// AUTHORIZATION SERVICE
// ============================================================================

/// The external service that maps a `(key, collection)` pair to a tenant.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Resolve the tenant owning `collection`, if `key` is valid for it.
    ///
    /// Returns `SluiceError::InvalidCredentials` when the service rejects the
    /// pair and `SluiceError::Transport` when it cannot be reached.
    async fn authorize(&self, key: &SecretKey, collection: &Collection) -> SluiceResult<TenantId>;
}

/// Body returned by the authorization service.
#[derive(Debug, Deserialize)]
struct ValidationResponse {
    status: i64,
    #[serde(default)]
    project_id: Option<Value>,
}

/// Status value the service uses to accept a pair.
const STATUS_ACCEPTED: i64 = 200;

/// [`AuthorizationService`] over HTTP: `GET <endpoint>?key=..&collection=..`.
#[derive(Clone)]
pub struct HttpAuthorizationService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuthorizationService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> SluiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SluiceError::transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AuthorizationService for HttpAuthorizationService {
    async fn authorize(&self, key: &SecretKey, collection: &Collection) -> SluiceResult<TenantId> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("key", key.expose()), ("collection", collection.as_str())])
            .send()
            .await
            .map_err(|e| SluiceError::transport(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(SluiceError::transport(format!(
                "validator responded {}",
                response.status()
            )));
        }

        let body: ValidationResponse = response
            .json()
            .await
            .map_err(|e| SluiceError::transport(format!("unreadable validator response: {}", e)))?;

        parse_validation(body)
    }
}

fn parse_validation(body: ValidationResponse) -> SluiceResult<TenantId> {
    if body.status != STATUS_ACCEPTED {
        return Err(SluiceError::invalid_pair());
    }
    match body.project_id {
        Some(Value::String(id)) if !id.is_empty() => Ok(TenantId::new(id)),
        Some(Value::Number(id)) => Ok(TenantId::new(id.to_string())),
        _ => Err(SluiceError::transport("validator accepted the pair without a project_id")),
    }
}

// ============================================================================
// KEY VALIDATOR
// ============================================================================

/// Configuration for a [`KeyValidator`].
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// How long a binding is trusted.
    pub ttl: Duration,
    pub max_entries: usize,
    /// Bound on one call to the authorization service.
    pub timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_entries: 10_000,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Validates key/collection pairs with a per-collection binding cache.
pub struct KeyValidator {
    service: Arc<dyn AuthorizationService>,
    bindings: TtlCache<Collection, TenantBinding>,
    timeout: Duration,
}

impl KeyValidator {
    pub fn new(config: ValidatorConfig, service: Arc<dyn AuthorizationService>) -> Self {
        Self {
            service,
            bindings: TtlCache::new(TtlCacheConfig::new(config.ttl, config.max_entries)),
            timeout: config.timeout,
        }
    }

    /// Resolve the tenant for `(key, collection)`.
    ///
    /// A live binding for `collection` answers without an external call; it
    /// accepts only the key it was resolved with. On a miss the service is
    /// asked once, even under concurrent misses, and only a success is
    /// cached.
    pub async fn validate(&self, key: &SecretKey, collection: &Collection) -> SluiceResult<TenantId> {
        let lookup = self
            .bindings
            .get_or_try_insert_with(collection.clone(), || self.authorize(key, collection))
            .await
            .inspect_err(|e| match e {
                SluiceError::InvalidCredentials { .. } => record_validation("rejected"),
                _ => record_validation("error"),
            })?;

        let outcome = if lookup.was_hit() { "hit" } else { "miss" };
        let binding = lookup.into_value();

        if !binding.accepts(key) {
            tracing::debug!(
                collection = %collection,
                key = %key.fingerprint(),
                bound_key = %binding.bound_key.fingerprint(),
                "presented key does not match cached binding"
            );
            record_validation("rejected");
            return Err(SluiceError::invalid_key());
        }

        record_validation(outcome);
        Ok(binding.tenant_id)
    }

    async fn authorize(&self, key: &SecretKey, collection: &Collection) -> SluiceResult<TenantBinding> {
        let tenant_id = tokio::time::timeout(self.timeout, self.service.authorize(key, collection))
            .await
            .map_err(|_| {
                SluiceError::transport(format!(
                    "validator timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
            .inspect_err(|e| {
                tracing::info!(
                    collection = %collection,
                    key = %key.fingerprint(),
                    error = %e,
                    "key validation failed"
                );
            })?;

        tracing::debug!(
            collection = %collection,
            tenant_id = %tenant_id,
            key = %key.fingerprint(),
            "tenant binding cached"
        );
        Ok(TenantBinding::new(tenant_id, collection.clone(), key.clone()))
    }

    /// Drop the cached binding for `collection`.
    pub fn invalidate(&self, collection: &Collection) -> bool {
        self.bindings.invalidate(collection)
    }

    /// The cached binding, if live.
    pub fn cached(&self, collection: &Collection) -> Option<TenantBinding> {
        self.bindings.get(collection)
    }

    pub fn stats(&self) -> CacheStats {
        self.bindings.stats()
    }
}

fn record_validation(outcome: &str) {
    if let Some(metrics) = metrics() {
        metrics.record_validation(outcome);
    }
}
