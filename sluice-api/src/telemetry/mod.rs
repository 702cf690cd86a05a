//! Sluice Telemetry - Observability Infrastructure
//!
//! Structured JSON logging and Prometheus metrics for the API layer.

pub mod metrics;
pub mod middleware;
pub mod subscriber;

pub use self::metrics::{metrics, metrics_handler, SluiceMetrics, METRICS};
pub use self::middleware::observability_middleware;
pub use self::subscriber::{init_tracing, DEFAULT_FILTER};
