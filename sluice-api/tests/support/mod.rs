//! Shared harness for sluice-api integration tests: a scripted authorization
//! service, a recording notification sink and a fully wired pipeline over
//! in-memory stores.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use serde_json::Value;
use sluice_api::{
    create_router, AppState, AuthorizationService, IngestionPipeline, KeyValidator,
    NotificationSink, NotifyError, PipelineConfig, UploadState, ValidatorConfig,
};
use sluice_core::{ArtifactName, SluiceError, SluiceResult};
use sluice_storage::ColumnStore;
use sluice_test_utils::loaders::{test_wasm_loader, CountingLoader};
use sluice_test_utils::*;
use sluice_transform::{RegistryConfig, TransformRegistry};

pub const TENANT: &str = "42";
pub const COLLECTION: &str = "events";
pub const KEY: &str = "k1";
pub const TABLE: &str = "42_events";

// ============================================================================
// SCRIPTED AUTHORIZATION SERVICE
// ============================================================================

/// Authorization service answering from a fixed table of accepted pairs.
#[derive(Default)]
pub struct ScriptedAuthorizationService {
    accepted: Mutex<HashMap<(String, String), TenantId>>,
    unreachable: AtomicBool,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedAuthorizationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `(key, collection)` as belonging to `tenant`.
    pub fn accept(&self, key: &str, collection: &str, tenant: &str) {
        self.accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((key.to_string(), collection.to_string()), TenantId::new(tenant));
    }

    /// Stop accepting `(key, collection)`.
    pub fn revoke(&self, key: &str, collection: &str) {
        self.accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(key.to_string(), collection.to_string()));
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationService for ScriptedAuthorizationService {
    async fn authorize(&self, key: &SecretKey, collection: &Collection) -> SluiceResult<TenantId> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SluiceError::transport("connection refused"));
        }

        self.accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(key.expose().to_string(), collection.as_str().to_string()))
            .cloned()
            .ok_or_else(SluiceError::invalid_pair)
    }
}

// ============================================================================
// RECORDING NOTIFIER
// ============================================================================

/// Notification sink that remembers every collection it was told about.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Collection>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn seen(&self) -> Vec<Collection> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Wait until at least `count` notifications arrived, or give up.
    pub async fn wait_for(&self, count: usize) -> Vec<Collection> {
        for _ in 0..200 {
            let seen = self.seen();
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.seen()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, collection: &Collection) -> Result<(), NotifyError> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(collection.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Status(503));
        }
        Ok(())
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub auth: Arc<ScriptedAuthorizationService>,
    pub notifier: Arc<RecordingNotifier>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub store: Arc<InMemoryColumnStore>,
    pub loader: Arc<CountingLoader>,
    pub validator: Arc<KeyValidator>,
    pub registry: Arc<TransformRegistry>,
    pub pipeline: Arc<IngestionPipeline>,
    pub state: AppState,
}

impl Harness {
    /// `(KEY, COLLECTION)` accepted for `TENANT`, and `TABLE` provisioned.
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default(), RegistryConfig::default())
    }

    pub fn with_config(validator_config: ValidatorConfig, registry_config: RegistryConfig) -> Self {
        Self::build(
            validator_config,
            registry_config,
            PipelineConfig::default(),
            Duration::ZERO,
        )
    }

    pub fn with_pipeline_config(pipeline_config: PipelineConfig) -> Self {
        Self::build(
            ValidatorConfig::default(),
            RegistryConfig::default(),
            pipeline_config,
            Duration::ZERO,
        )
    }

    /// Every transform load takes at least `delay`.
    pub fn with_load_delay(delay: Duration) -> Self {
        Self::build(
            ValidatorConfig::default(),
            RegistryConfig::default(),
            PipelineConfig::default(),
            delay,
        )
    }

    fn build(
        validator_config: ValidatorConfig,
        registry_config: RegistryConfig,
        pipeline_config: PipelineConfig,
        load_delay: Duration,
    ) -> Self {
        let auth = Arc::new(ScriptedAuthorizationService::new());
        auth.accept(KEY, COLLECTION, TENANT);

        let notifier = Arc::new(RecordingNotifier::new());
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let store = Arc::new(InMemoryColumnStore::with_tables([TABLE]));
        let loader = Arc::new(CountingLoader::with_delay(test_wasm_loader(), load_delay));

        let validator = Arc::new(KeyValidator::new(validator_config, auth.clone()));
        let registry = Arc::new(TransformRegistry::new(
            registry_config,
            artifacts.clone(),
            loader.clone(),
        ));
        let pipeline = Arc::new(IngestionPipeline::new(
            validator.clone(),
            registry.clone(),
            store.clone(),
            notifier.clone(),
            pipeline_config,
        ));

        let state = AppState::new(
            pipeline.clone(),
            UploadState {
                artifacts: artifacts.clone(),
                loader: loader.clone(),
                max_upload_bytes: 1024 * 1024,
            },
        );

        Self {
            auth,
            notifier,
            artifacts,
            store,
            loader,
            validator,
            registry,
            pipeline,
            state,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Store an artifact for `(TENANT, COLLECTION, key)` directly.
    pub async fn install(&self, key: &str, bytes: Vec<u8>) {
        let name = ArtifactName::new(
            &TenantId::new(TENANT),
            &Collection::new(COLLECTION),
            &SecretKey::new(key),
        );
        self.artifacts
            .put(&name, bytes)
            .await
            .unwrap_or_else(|e| panic!("install failed: {e}"));
    }

    pub async fn row(&self, row_key: &str) -> Option<FieldMap> {
        self.store
            .get_row(&TableName::from_raw(TABLE), row_key)
            .await
            .unwrap_or_else(|e| panic!("get_row failed: {e}"))
    }

    pub async fn row_count(&self) -> usize {
        self.store
            .row_count(&TableName::from_raw(TABLE))
            .await
            .unwrap_or_else(|e| panic!("row_count failed: {e}"))
    }
}

// ============================================================================
// REQUEST BUILDERS
// ============================================================================

pub fn request(collection: &str, key: &str, records: Vec<Record>) -> IngestRequest {
    IngestRequest::new(Collection::new(collection), SecretKey::new(key), records)
}

pub fn stream_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "sluice-test-boundary";

pub fn upload_request(collection: &str, key: &str, part_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{part_name}\"; filename=\"transform.wasm\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/wasm\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(format!("/processing_code/{collection}/{key}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let text = body_text(response).await;
    serde_json::from_str(&text).unwrap()
}
