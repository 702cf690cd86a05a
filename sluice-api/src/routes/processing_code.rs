//! Processing code upload endpoint.
//!
//! `POST /processing_code/{collection}/{key}` with a multipart part named
//! `file` holding a WebAssembly transform module.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sluice_core::{artifact_digest, ArtifactName, Collection, SecretKey};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::pipeline::IngestionPipeline;
use crate::state::UploadState;

/// Multipart part carrying the artifact.
pub const FILE_FIELD: &str = "file";

async fn read_file_part(multipart: &mut Multipart) -> ApiResult<Option<Vec<u8>>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_input(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::invalid_input(format!("Failed to read file: {}", e)))?;
            return Ok(Some(bytes.to_vec()));
        }
    }
    Ok(None)
}

/// POST /processing_code/{collection}/{key} - Upload a tenant transform
///
/// A rejected key/collection pair answers 200 with the validator's message,
/// which is what existing clients expect.
pub async fn upload_processing_code(
    State(pipeline): State<Arc<IngestionPipeline>>,
    State(upload): State<UploadState>,
    Path((collection, key)): Path<(String, String)>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let collection = Collection::new(collection);
    let key = SecretKey::new(key);

    let tenant_id = match pipeline.validator().validate(&key, &collection).await {
        Ok(tenant_id) => tenant_id,
        Err(e) => return Ok((StatusCode::OK, e.to_string()).into_response()),
    };

    let bytes = read_file_part(&mut multipart)
        .await?
        .ok_or_else(|| ApiError::invalid_input(format!("Missing '{}' part", FILE_FIELD)))?;

    let loader = Arc::clone(&upload.loader);
    let bytes = tokio::task::spawn_blocking(move || loader.load(&bytes).map(|_| bytes))
        .await
        .map_err(|e| ApiError::internal_error(format!("Verification task failed: {}", e)))?
        .map_err(|e| ApiError::new(ErrorCode::TransformLoadFailed, e.to_string()))?;

    let digest = artifact_digest(&bytes);
    let name = ArtifactName::new(&tenant_id, &collection, &key);
    upload.artifacts.put(&name, bytes).await.map_err(|e| {
        tracing::error!(collection = %collection, error = %e, "failed to store processing code");
        ApiError::internal_error("Failed to store processing code")
    })?;

    pipeline.registry().invalidate(&tenant_id, &collection, &key);

    tracing::info!(
        tenant_id = %tenant_id,
        collection = %collection,
        key = %key.fingerprint(),
        digest = %digest,
        "processing code uploaded"
    );

    Ok("OK".into_response())
}
