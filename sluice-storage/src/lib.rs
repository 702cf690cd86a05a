//! Sluice Storage - Caches and Store Boundaries
//!
//! Shared TTL caches with single-flight population, the artifact store that
//! holds uploaded processing code, and the column store that receives
//! committed batches.

pub mod artifact;
pub mod cache;
pub mod column;

pub use artifact::{ArtifactStore, ArtifactStoreError, FsArtifactStore, InMemoryArtifactStore};
pub use cache::{CacheLookup, CacheStats, TransformKey, TtlCache, TtlCacheConfig};
pub use column::{
    Batch, ColumnStore, CommitDeadline, InMemoryColumnStore, LmdbColumnStore, LmdbStoreError,
};
