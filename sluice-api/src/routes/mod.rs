//! HTTP routes.
//!
//! - `POST /stream` - ingest a batch of records
//! - `POST /processing_code/{collection}/{key}` - upload a transform
//! - `/health/*` - liveness
//! - `GET /metrics` - Prometheus scrape

pub mod health;
pub mod processing_code;
pub mod stream;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Build the full router over shared state.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.upload.max_upload_bytes;

    Router::new()
        .route("/stream", post(stream::stream))
        .route(
            "/processing_code/:collection/:key",
            post(processing_code::upload_processing_code).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(observability_middleware))
        .layer(
            // The default span records the URI, which carries the upload key.
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::debug_span!(
                    "request",
                    method = %request.method(),
                    version = ?request.version(),
                )
            }),
        )
        .with_state(state)
}
