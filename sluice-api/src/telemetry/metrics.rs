//! Prometheus Metrics Definitions
//!
//! Defines all sluice metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<SluiceMetrics>> = Lazy::new(SluiceMetrics::new);

/// The registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static SluiceMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all sluice metrics.
#[derive(Clone)]
pub struct SluiceMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Key validations - labels: outcome (hit, miss, rejected, error)
    pub validations_total: CounterVec,

    /// Transform resolutions (cache hit or load) - labels: status (success/error)
    pub transform_resolutions_total: CounterVec,

    /// Records processed - labels: outcome (written, dropped, failed)
    pub records_total: CounterVec,

    /// Batch commits - labels: status (success/error)
    pub batch_commits_total: CounterVec,

    /// Notifications sent after a commit - labels: status (success/failure)
    pub notifications_total: CounterVec,
}

impl SluiceMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "sluice_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "sluice_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            validations_total: register_counter_vec!(
                "sluice_validations_total",
                "Key validations by cache outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register validations_total: {}", e)))?,

            transform_resolutions_total: register_counter_vec!(
                "sluice_transform_resolutions_total",
                "Transform resolutions by status",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register transform_resolutions_total: {}", e)))?,

            records_total: register_counter_vec!(
                "sluice_records_total",
                "Records processed by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register records_total: {}", e)))?,

            batch_commits_total: register_counter_vec!(
                "sluice_batch_commits_total",
                "Batch commits by status",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register batch_commits_total: {}", e)))?,

            notifications_total: register_counter_vec!(
                "sluice_notifications_total",
                "Post-commit notifications by status",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register notifications_total: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a key validation outcome: `hit`, `miss`, `rejected` or `error`.
    pub fn record_validation(&self, outcome: &str) {
        self.validations_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_transform_resolution(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.transform_resolutions_total.with_label_values(&[status]).inc();
    }

    /// Record per-record outcomes of one batch.
    pub fn record_batch_outcome(&self, written: usize, dropped: usize, failed: usize) {
        for (outcome, count) in [("written", written), ("dropped", dropped), ("failed", failed)] {
            if count > 0 {
                self.records_total
                    .with_label_values(&[outcome])
                    .inc_by(count as f64);
            }
        }
    }

    pub fn record_commit(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.batch_commits_total.with_label_values(&[status]).inc();
    }

    pub fn record_notification(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.notifications_total.with_label_values(&[status]).inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
