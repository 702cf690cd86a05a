//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Wraps every request in a tracing span and records Prometheus metrics.
//! The upload route carries the tenant's secret key in its path, so spans,
//! logs and labels only ever see the route template.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::metrics;

const PROCESSING_CODE_PREFIX: &str = "/processing_code/";
const PROCESSING_CODE_TEMPLATE: &str = "/processing_code/{collection}/{key}";

/// Label for requests no route matched. Keeps label cardinality bounded.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Collapse path parameters to their template.
fn normalize_path(path: &str) -> String {
    if path.starts_with(PROCESSING_CODE_PREFIX) {
        return PROCESSING_CODE_TEMPLATE.to_string();
    }
    path.to_string()
}

/// Route label for a request: the matched route template, never a raw path.
fn route_label(request: &Request) -> String {
    match request.extensions().get::<MatchedPath>() {
        Some(matched) => normalize_path(matched.as_str()),
        None => UNMATCHED_ROUTE.to_string(),
    }
}

/// Observability middleware for Axum.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let route = route_label(&request);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.route = %route,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Some(metrics) = metrics() {
        metrics.record_http_request(
            method.as_str(),
            &route,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    tracing::info!(
        method = %method,
        route = %route,
        status = status.as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
