//! Transform registry: resolves `(tenant, collection, key)` to a loaded
//! transform, loading through the artifact store on a miss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sluice_core::{artifact_digest, Collection, LoadError, SecretKey, TenantId};
use sluice_storage::{ArtifactStore, CacheLookup, CacheStats, TransformKey, TtlCache, TtlCacheConfig};

use crate::handle::TransformHandle;
use crate::transform::TransformLoader;

/// Configuration for a [`TransformRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a loaded handle stays cached.
    pub ttl: Duration,
    /// Maximum number of cached handles.
    pub max_entries: usize,
    /// Bound on a single artifact fetch.
    pub fetch_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared cache of transform handles in front of the artifact store.
pub struct TransformRegistry {
    cache: TtlCache<TransformKey, Arc<TransformHandle>>,
    artifacts: Arc<dyn ArtifactStore>,
    loader: Arc<dyn TransformLoader>,
    fetch_timeout: Duration,
    loads: AtomicU64,
}

impl TransformRegistry {
    pub fn new(
        config: RegistryConfig,
        artifacts: Arc<dyn ArtifactStore>,
        loader: Arc<dyn TransformLoader>,
    ) -> Self {
        Self {
            cache: TtlCache::new(TtlCacheConfig::new(config.ttl, config.max_entries)),
            artifacts,
            loader,
            fetch_timeout: config.fetch_timeout,
            loads: AtomicU64::new(0),
        }
    }

    /// Return the cached handle for the composite key, loading it on a miss.
    ///
    /// Concurrent misses for the same composite load the artifact once. A
    /// failed load is not cached.
    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
        collection: &Collection,
        key: &SecretKey,
    ) -> Result<Arc<TransformHandle>, LoadError> {
        let cache_key = TransformKey::new(tenant_id.clone(), collection.clone(), key.clone());

        let lookup = self
            .cache
            .get_or_try_insert_with(cache_key.clone(), || self.load(cache_key))
            .await?;

        if let CacheLookup::Loaded(handle) = &lookup {
            tracing::info!(
                tenant_id = %tenant_id,
                collection = %collection,
                key = %key.fingerprint(),
                digest = %handle.digest(),
                "transform loaded"
            );
        }
        Ok(lookup.into_value())
    }

    async fn load(&self, cache_key: TransformKey) -> Result<Arc<TransformHandle>, LoadError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let name = cache_key.artifact_name();

        let fetched = tokio::time::timeout(self.fetch_timeout, self.artifacts.get(&name))
            .await
            .map_err(|_| LoadError::Timeout {
                after_ms: u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        let bytes = fetched.ok_or_else(|| LoadError::ArtifactNotFound {
            collection: cache_key.collection().to_string(),
        })?;
        let digest = artifact_digest(&bytes);

        let loader = Arc::clone(&self.loader);
        let instance = tokio::task::spawn_blocking(move || loader.load(&bytes))
            .await
            .map_err(|e| LoadError::Instantiate {
                reason: format!("loader task failed: {e}"),
            })??;

        Ok(Arc::new(TransformHandle::new(cache_key, digest, instance)))
    }

    /// Drop the cached handle for one composite key.
    pub fn invalidate(&self, tenant_id: &TenantId, collection: &Collection, key: &SecretKey) -> bool {
        let cache_key = TransformKey::new(tenant_id.clone(), collection.clone(), key.clone());
        self.cache.invalidate(&cache_key)
    }

    /// Drop every cached handle of a tenant's collection, whatever its key.
    pub fn invalidate_collection(&self, tenant_id: &TenantId, collection: &Collection) -> usize {
        self.cache
            .invalidate_where(|cache_key| cache_key.is_for(tenant_id, collection))
    }

    /// Number of artifact loads attempted (successful or not).
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
