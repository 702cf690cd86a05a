//! In-process caches shared by concurrent pipeline executions.
//!
//! Two caches sit in front of external calls: tenant bindings (in front of
//! the authorization service) and transform handles (in front of the
//! artifact store and the sandbox compiler). Both are [`TtlCache`]
//! instances: bounded, expiring, atomic per key, and populated through a
//! per-key single-flight gate.

pub mod stats;
pub mod transform_key;
pub mod ttl;

pub use stats::CacheStats;
pub use transform_key::TransformKey;
pub use ttl::{CacheLookup, TtlCache, TtlCacheConfig};
