//! Sluice API - HTTP Ingestion Service
//!
//! Accepts tenant records over HTTP, validates the tenant's key against an
//! external authorization service, runs every record through the tenant's
//! sandboxed transform and commits the results to the tenant's table in a
//! single atomic batch.
//!
//! The pieces, leaf first:
//! - [`KeyValidator`]: cached key/collection validation
//! - [`sluice_transform::TransformRegistry`]: cached transform instances
//! - [`IngestionPipeline`]: the per-request orchestration
//! - [`routes`]: the Axum surface

pub mod config;
pub mod error;
pub mod macros;
pub mod notify;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod validator;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use notify::{HttpNotifier, NoopNotifier, NotificationSink, NotifyError};
pub use pipeline::{IngestionPipeline, PipelineConfig};
pub use routes::create_router;
pub use state::{AppState, UploadState};
pub use validator::{AuthorizationService, HttpAuthorizationService, KeyValidator, ValidatorConfig};
