//! Error Types for the sluice API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversion from the request-scoped `SluiceError` taxonomy
//!
//! All errors are serialized as JSON `{"code": ..., "message": ...}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sluice_core::{CommitError, SluiceError};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to an HTTP status code. Commit failures may carry a
/// store-provided status that overrides the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// `collection` or `key` absent from the request
    MissingParameter,

    /// Key/collection pair rejected, or cached binding mismatch
    InvalidCredentials,

    /// Authorization service unreachable or failed
    ValidatorUnavailable,

    // ========================================================================
    // Content Errors (415, 400)
    // ========================================================================
    /// Request body is not `application/json`
    UnsupportedContentType,

    /// Request body could not be understood
    InvalidInput,

    // ========================================================================
    // Processing Errors (400 unless overridden)
    // ========================================================================
    /// Destination table does not exist
    UnknownCollection,

    /// Processing code missing, malformed or failed to instantiate
    TransformLoadFailed,

    /// Batch accumulation or commit failed
    CommitFailed,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::MissingParameter
            | ErrorCode::InvalidCredentials
            | ErrorCode::ValidatorUnavailable => StatusCode::UNAUTHORIZED,

            ErrorCode::UnsupportedContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            ErrorCode::InvalidInput
            | ErrorCode::UnknownCollection
            | ErrorCode::TransformLoadFailed
            | ErrorCode::CommitFailed => StatusCode::BAD_REQUEST,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MissingParameter => "Invalid parameters.",
            ErrorCode::InvalidCredentials => "Invalid table name/secret key.",
            ErrorCode::ValidatorUnavailable => "Http error.",
            ErrorCode::UnsupportedContentType => {
                "Only \"application/json\" content type is allowed."
            }
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::UnknownCollection => "Illegal collection name.",
            ErrorCode::TransformLoadFailed => "Processing code could not be loaded",
            ErrorCode::CommitFailed => "Batch commit failed",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Status supplied by the column store, if any
    #[serde(skip)]
    pub status_override: Option<StatusCode>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status_override: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Replace the status derived from the code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_override = Some(status);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.status_override
            .unwrap_or_else(|| self.code.status_code())
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unsupported_content_type() -> Self {
        Self::from_code(ErrorCode::UnsupportedContentType)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<SluiceError> for ApiError {
    fn from(err: SluiceError) -> Self {
        let message = err.to_string();
        match err {
            SluiceError::MissingParameter { .. } => Self::new(ErrorCode::MissingParameter, message),
            SluiceError::InvalidCredentials { reason } => {
                Self::new(ErrorCode::InvalidCredentials, reason)
            }
            SluiceError::Transport { .. } => Self::new(ErrorCode::ValidatorUnavailable, message),
            SluiceError::UnknownCollection { .. } => Self::from_code(ErrorCode::UnknownCollection),
            SluiceError::Load(_) => Self::new(ErrorCode::TransformLoadFailed, message),
            SluiceError::Commit(CommitError::Rejected { status, reason }) => {
                let err = Self::new(ErrorCode::CommitFailed, reason);
                match StatusCode::from_u16(status) {
                    Ok(status) => err.with_status(status),
                    Err(_) => err,
                }
            }
            SluiceError::Commit(_) => Self::new(ErrorCode::CommitFailed, message),
            SluiceError::UnsupportedContentType { content_type } => {
                tracing::debug!(content_type = ?content_type, "Rejected request content type");
                Self::unsupported_content_type()
            }
            SluiceError::Config(_) => {
                tracing::error!(error = %message, "Configuration error reached a request");
                Self::internal_error(message)
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::LoadError;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::MissingParameter.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::ValidatorUnavailable.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ErrorCode::UnsupportedContentType.status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(ErrorCode::UnknownCollection.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::CommitFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_credential_messages_pass_through() {
        let err = ApiError::from(SluiceError::invalid_key());
        assert_eq!(err.code, ErrorCode::InvalidCredentials);
        assert_eq!(err.message, "Invalid secret key.");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_unknown_collection_message() {
        let err = ApiError::from(SluiceError::UnknownCollection {
            table: "42_events".to_string(),
        });
        assert_eq!(err.message, "Illegal collection name.");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rejected_commit_uses_store_status() {
        let err = ApiError::from(SluiceError::Commit(CommitError::Rejected {
            status: 507,
            reason: "region full".to_string(),
        }));
        assert_eq!(err.code, ErrorCode::CommitFailed);
        assert_eq!(err.message, "region full");
        assert_eq!(err.status_code(), StatusCode::INSUFFICIENT_STORAGE);
    }

    #[test]
    fn test_rejected_commit_with_bogus_status_falls_back() {
        let err = ApiError::from(SluiceError::Commit(CommitError::Rejected {
            status: 42,
            reason: "odd".to_string(),
        }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_load_error_is_bad_request() {
        let err = ApiError::from(SluiceError::Load(LoadError::ArtifactNotFound {
            collection: "events".to_string(),
        }));
        assert_eq!(err.code, ErrorCode::TransformLoadFailed);
        assert!(err.message.contains("events"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::from_code(ErrorCode::UnsupportedContentType)
            .with_status(StatusCode::IM_A_TEAPOT);
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("UNSUPPORTED_CONTENT_TYPE"));
        assert!(!json.contains("status_override"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized.code, err.code);
        assert_eq!(deserialized.message, err.message);
        Ok(())
    }
}
