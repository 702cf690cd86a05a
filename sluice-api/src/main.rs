//! Sluice API Server Entry Point
//!
//! Bootstraps configuration, opens the stores, provisions configured tables
//! and starts the Axum HTTP server.

use std::sync::Arc;

use sluice_api::{
    create_router, telemetry::init_tracing, ApiConfig, ApiError, ApiResult, AppState,
    HttpAuthorizationService, HttpNotifier, IngestionPipeline, KeyValidator, PipelineConfig,
    UploadState, ValidatorConfig,
};
use sluice_core::TableName;
use sluice_storage::{ColumnStore, FsArtifactStore, LmdbColumnStore};
use sluice_transform::{RegistryConfig, TransformRegistry, WasmLoader};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let config = ApiConfig::from_env()
        .map_err(|e| ApiError::internal_error(format!("Invalid configuration: {}", e)))?;
    let sluice = &config.sluice;

    let artifacts = Arc::new(
        FsArtifactStore::open(&sluice.artifact_dir)
            .await
            .map_err(|e| ApiError::internal_error(format!("Failed to open artifact store: {}", e)))?,
    );
    let store = Arc::new(
        LmdbColumnStore::open(&sluice.store_path, sluice.store_max_mb)
            .map_err(|e| ApiError::internal_error(format!("Failed to open column store: {}", e)))?,
    );
    provision_tables(store.as_ref(), &sluice.provision_tables).await?;

    let loader = Arc::new(
        WasmLoader::new(sluice.limits.clone())
            .map_err(|e| ApiError::internal_error(format!("Failed to build sandbox: {}", e)))?,
    );
    let registry = Arc::new(TransformRegistry::new(
        RegistryConfig {
            ttl: sluice.cache.transform_ttl,
            max_entries: sluice.cache.max_entries,
            fetch_timeout: sluice.timeouts.artifact_fetch,
        },
        artifacts.clone(),
        loader.clone(),
    ));

    let service = HttpAuthorizationService::new(&sluice.validation_url, sluice.timeouts.validator)?;
    let validator = Arc::new(KeyValidator::new(
        ValidatorConfig {
            ttl: sluice.cache.binding_ttl,
            max_entries: sluice.cache.max_entries,
            timeout: sluice.timeouts.validator,
        },
        Arc::new(service),
    ));

    let notifier = HttpNotifier::new(&sluice.notify_url, sluice.timeouts.notify)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    let pipeline = Arc::new(IngestionPipeline::new(
        validator,
        registry,
        store,
        Arc::new(notifier),
        PipelineConfig::from(&sluice.timeouts),
    ));

    let state = AppState::new(
        pipeline,
        UploadState {
            artifacts,
            loader,
            max_upload_bytes: config.max_upload_bytes,
        },
    );
    let app = create_router(state);

    let addr = config
        .socket_addr()
        .map_err(|e| ApiError::invalid_input(e.to_string()))?;
    tracing::info!(%addr, "Starting sluice API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Create the configured physical tables that do not exist yet.
async fn provision_tables(store: &dyn ColumnStore, tables: &[String]) -> ApiResult<()> {
    for raw in tables {
        let table = TableName::from_raw(raw.as_str());
        let exists = store
            .table_exists(&table)
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))?;
        if !exists {
            store
                .create_table(&table)
                .await
                .map_err(|e| ApiError::internal_error(e.to_string()))?;
            tracing::info!(table = %table, "provisioned table");
        }
    }
    Ok(())
}
