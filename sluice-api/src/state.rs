//! Shared application state for Axum routers.

use std::sync::Arc;

use sluice_storage::ArtifactStore;
use sluice_transform::TransformLoader;

use crate::pipeline::IngestionPipeline;

/// Everything the upload route needs besides the pipeline.
#[derive(Clone)]
pub struct UploadState {
    /// Where verified artifacts are written.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Used to verify an artifact before it is accepted.
    pub loader: Arc<dyn TransformLoader>,
    pub max_upload_bytes: usize,
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub upload: UploadState,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestionPipeline>, upload: UploadState) -> Self {
        Self {
            pipeline,
            upload,
            start_time: std::time::Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<IngestionPipeline>, pipeline);
crate::impl_from_ref!(UploadState, upload);
crate::impl_from_ref!(std::time::Instant, start_time);
