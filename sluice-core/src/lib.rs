//! Sluice Core - Shared Types
//!
//! Pure data structures shared by every sluice crate: tenant identity,
//! records and batch outcomes, deterministic physical naming, the error
//! taxonomy and service configuration. No I/O happens here.

pub mod config;
pub mod error;
pub mod identity;
pub mod record;

pub use config::{CacheSettings, SluiceConfig, TimeoutSettings, TransformLimits};
pub use error::{
    CommitError, ConfigError, LoadError, SluiceError, SluiceResult, TransformError,
    MSG_ILLEGAL_COLLECTION, MSG_INVALID_KEY, MSG_INVALID_PAIR,
};
pub use identity::{
    artifact_digest, ArtifactName, Collection, SecretKey, TableName, TenantId, NAME_SEPARATOR,
};
pub use record::{
    normalize_fields, normalize_value, BatchOutcome, FieldMap, IngestRequest, Record,
    TenantBinding, TransformFailure, WrittenRecord,
};
