//! Error types for sluice operations

use thiserror::Error;

/// Message returned when the authorization service rejects a pair.
pub const MSG_INVALID_PAIR: &str = "Invalid table name/secret key.";

/// Message returned when a cached binding does not match the presented key.
pub const MSG_INVALID_KEY: &str = "Invalid secret key.";

/// Message returned when the destination table does not exist.
pub const MSG_ILLEGAL_COLLECTION: &str = "Illegal collection name.";

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Failures while resolving a tenant transform.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("No processing code uploaded for collection {collection}")]
    ArtifactNotFound { collection: String },

    #[error("Processing code is malformed: {reason}")]
    Malformed { reason: String },

    #[error("Processing code failed to instantiate: {reason}")]
    Instantiate { reason: String },

    #[error("Artifact store error: {reason}")]
    Store { reason: String },

    #[error("Loading processing code timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Failures while accumulating or committing a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("Invalid row {row_key:?}: {reason}")]
    InvalidRow { row_key: String, reason: String },

    #[error("Table {table} does not exist")]
    MissingTable { table: String },

    #[error("Store error: {reason}")]
    Store { reason: String },

    /// A store-level rejection that carries its own HTTP status.
    #[error("Store rejected batch ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Batch commit timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Per-record transform failure. Distinct from "no output", which is not
/// an error at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("transform trapped: {reason}")]
    Trap { reason: String },

    #[error("transform exceeded its execution budget")]
    FuelExhausted,

    #[error("transform reported failure code {code}")]
    Guest { code: i64 },

    #[error("transform produced invalid output: {reason}")]
    InvalidOutput { reason: String },

    #[error("transform memory access failed: {reason}")]
    Memory { reason: String },

    #[error("transform input could not be encoded: {reason}")]
    Input { reason: String },
}

/// Master error type for request-scoped failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SluiceError {
    #[error("Invalid parameters: '{field}' is required")]
    MissingParameter { field: String },

    #[error("{reason}")]
    InvalidCredentials { reason: String },

    #[error("Http error: {reason}")]
    Transport { reason: String },

    #[error("{}", MSG_ILLEGAL_COLLECTION)]
    UnknownCollection { table: String },

    #[error("{0}")]
    Load(#[from] LoadError),

    #[error("{0}")]
    Commit(#[from] CommitError),

    #[error("Only \"application/json\" content type is allowed.")]
    UnsupportedContentType { content_type: Option<String> },

    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl SluiceError {
    pub fn missing(field: &str) -> Self {
        Self::MissingParameter {
            field: field.to_string(),
        }
    }

    pub fn invalid_pair() -> Self {
        Self::InvalidCredentials {
            reason: MSG_INVALID_PAIR.to_string(),
        }
    }

    pub fn invalid_key() -> Self {
        Self::InvalidCredentials {
            reason: MSG_INVALID_KEY.to_string(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used for metric labels and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SluiceError::MissingParameter { .. } => "missing_parameter",
            SluiceError::InvalidCredentials { .. } => "invalid_credentials",
            SluiceError::Transport { .. } => "transport",
            SluiceError::UnknownCollection { .. } => "unknown_collection",
            SluiceError::Load(_) => "load",
            SluiceError::Commit(_) => "commit",
            SluiceError::UnsupportedContentType { .. } => "unsupported_content_type",
            SluiceError::Config(_) => "config",
        }
    }
}

/// Result type alias for sluice operations.
pub type SluiceResult<T> = Result<T, SluiceError>;

// =============================================================================
// TESTS
// =============================================================================
