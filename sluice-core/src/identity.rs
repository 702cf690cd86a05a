//! Identity types for tenants, collections and the keys that bind them.
//!
//! Physical names (destination tables, transform artifacts) are derived
//! deterministically from these types. The derivation lives here so that
//! every crate computes the same name for the same inputs.

use std::fmt;
use std::hash::{Hash, Hasher};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator used when composing physical names.
pub const NAME_SEPARATOR: char = '_';

// ============================================================================
// TENANT
// ============================================================================

/// Opaque tenant identifier, as returned by the authorization service
/// (`project_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

/// Logical table name chosen by a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection(String);

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Collection {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECRET KEY
// ============================================================================

/// Tenant secret key for a collection.
///
/// Wrapped in `secrecy` so it never ends up in logs. Equality and hashing
/// operate on the exposed value because the key participates in cache keys
/// and artifact names.
#[derive(Clone)]
pub struct SecretKey(SecretString);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        let key: String = key.into();
        Self(SecretString::new(key.into()))
    }

    /// Expose the key value (naming, comparison and the authorization call only).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Short, non-reversible fingerprint suitable for log fields.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.expose().as_bytes());
        hex::encode(&digest[..4])
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SecretKey {}

impl Hash for SecretKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.expose().hash(state);
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED, {}])", self.fingerprint())
    }
}

impl From<&str> for SecretKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// PHYSICAL NAMES
// ============================================================================

/// Physical table name in the column store: `<tenantId>_<collection>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    /// Derive the destination table for a tenant's collection.
    pub fn for_collection(tenant_id: &TenantId, collection: &Collection) -> Self {
        Self(format!(
            "{}{}{}",
            tenant_id.as_str(),
            NAME_SEPARATOR,
            collection.as_str()
        ))
    }

    /// Wrap an already-composed physical name (operator provisioning).
    pub fn from_raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blob name of a transform artifact: `<tenantId>_<collection>_<key>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn new(tenant_id: &TenantId, collection: &Collection, key: &SecretKey) -> Self {
        Self(format!(
            "{}{sep}{}{sep}{}",
            tenant_id.as_str(),
            collection.as_str(),
            key.expose(),
            sep = NAME_SEPARATOR
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// The name embeds the secret key, so it is redacted like the key itself.
impl fmt::Debug for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest = Sha256::digest(self.0.as_bytes());
        write!(f, "ArtifactName([REDACTED, {}])", hex::encode(&digest[..4]))
    }
}

/// Compute the lowercase hex SHA-256 digest of an artifact body.
pub fn artifact_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
