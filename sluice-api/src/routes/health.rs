//! Health endpoints. Unauthenticated.
//!
//! - `/health/ping` answers `pong`
//! - `/health/live` reports uptime and the state of both caches

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sluice_storage::CacheStats;

use crate::pipeline::IngestionPipeline;
use crate::state::AppState;

/// Size and effectiveness of one cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub entries: u64,
    pub hit_rate: f64,
    pub loads: u64,
    pub evictions: u64,
}

impl From<CacheStats> for CacheReport {
    fn from(stats: CacheStats) -> Self {
        Self {
            entries: stats.entry_count,
            hit_rate: stats.hit_rate(),
            loads: stats.loads,
            evictions: stats.evictions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessReport {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub bindings: CacheReport,
    pub transforms: CacheReport,
}

pub async fn ping() -> &'static str {
    "pong"
}

/// GET /health/live
pub async fn liveness(
    State(pipeline): State<Arc<IngestionPipeline>>,
    State(started): State<Instant>,
) -> Json<LivenessReport> {
    Json(LivenessReport {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: started.elapsed().as_secs(),
        bindings: pipeline.validator().stats().into(),
        transforms: pipeline.registry().stats().into(),
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_report_from_stats() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            loads: 1,
            entry_count: 1,
            evictions: 0,
            expirations: 0,
        };

        let report = CacheReport::from(stats);

        assert_eq!(report.entries, 1);
        assert!((report.hit_rate - 0.75).abs() < f64::EPSILON);
    }
}
