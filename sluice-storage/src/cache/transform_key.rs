//! Composite cache key for loaded transforms.
//!
//! A `TransformKey` can only be built from all three parts of the
//! composite, so a transform cached for one tenant can never be served
//! for another tenant's collection or for a different secret key.

use sluice_core::{ArtifactName, Collection, SecretKey, TenantId};

/// Cache key for a transform handle: `(tenantId, collection, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformKey {
    /// Private inner data - cannot be constructed externally
    inner: TransformKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransformKeyInner {
    tenant_id: TenantId,
    collection: Collection,
    key: SecretKey,
}

impl TransformKey {
    pub fn new(tenant_id: TenantId, collection: Collection, key: SecretKey) -> Self {
        Self {
            inner: TransformKeyInner {
                tenant_id,
                collection,
                key,
            },
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.inner.tenant_id
    }

    pub fn collection(&self) -> &Collection {
        &self.inner.collection
    }

    pub fn key(&self) -> &SecretKey {
        &self.inner.key
    }

    /// Blob name the artifact for this key is stored under.
    pub fn artifact_name(&self) -> ArtifactName {
        ArtifactName::new(&self.inner.tenant_id, &self.inner.collection, &self.inner.key)
    }

    /// Whether this key belongs to the given tenant's collection, whatever
    /// its secret key.
    pub fn is_for(&self, tenant_id: &TenantId, collection: &Collection) -> bool {
        &self.inner.tenant_id == tenant_id && &self.inner.collection == collection
    }
}
