//! Ingestion pipeline: validate → resolve transform → transform → commit → notify.
//!
//! Each request runs the steps strictly in that order. Nothing is written
//! unless every step up to and including the commit succeeds, and no record
//! is transformed before both validation and transform resolution succeed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sluice_core::{
    BatchOutcome, CommitError, IngestRequest, SluiceError, SluiceResult, TableName,
    TimeoutSettings,
};
use sluice_storage::{Batch, ColumnStore, CommitDeadline};
use sluice_transform::TransformRegistry;

use crate::notify::{spawn_notification, NotificationSink};
use crate::telemetry::metrics;
use crate::validator::KeyValidator;

/// Timeouts for the store calls and the notification.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bound on the table check and on the batch commit.
    pub commit_timeout: Duration,
    pub notify_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let timeouts = TimeoutSettings::default();
        Self::from(&timeouts)
    }
}

impl From<&TimeoutSettings> for PipelineConfig {
    fn from(timeouts: &TimeoutSettings) -> Self {
        Self {
            commit_timeout: timeouts.commit,
            notify_timeout: timeouts.notify,
        }
    }
}

/// Per-request orchestration over the shared caches and stores.
///
/// Holds no per-request state; it is shared by every in-flight request.
pub struct IngestionPipeline {
    validator: Arc<KeyValidator>,
    registry: Arc<TransformRegistry>,
    store: Arc<dyn ColumnStore>,
    notifier: Arc<dyn NotificationSink>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        validator: Arc<KeyValidator>,
        registry: Arc<TransformRegistry>,
        store: Arc<dyn ColumnStore>,
        notifier: Arc<dyn NotificationSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            validator,
            registry,
            store,
            notifier,
            config,
        }
    }

    pub fn validator(&self) -> &Arc<KeyValidator> {
        &self.validator
    }

    pub fn registry(&self) -> &Arc<TransformRegistry> {
        &self.registry
    }

    /// Run one request through the pipeline.
    ///
    /// Returns the per-record outcome of the committed batch. Records whose
    /// transform produced nothing are listed as dropped; records whose
    /// transform failed are listed as failed. Both are left out of the batch.
    pub async fn ingest(&self, request: IngestRequest) -> SluiceResult<BatchOutcome> {
        let IngestRequest {
            collection,
            secret_key,
            records,
        } = request;
        let collection = collection.ok_or_else(|| SluiceError::missing("collection"))?;
        let key = secret_key.ok_or_else(|| SluiceError::missing("key"))?;

        let tenant_id = self.validator.validate(&key, &collection).await?;

        let table = TableName::for_collection(&tenant_id, &collection);
        if !self.read_bounded(self.store.table_exists(&table)).await? {
            return Err(SluiceError::UnknownCollection {
                table: table.to_string(),
            });
        }

        let handle = self
            .registry
            .resolve(&tenant_id, &collection, &key)
            .await
            .inspect(|_| record(|m| m.record_transform_resolution(true)))
            .inspect_err(|_| record(|m| m.record_transform_resolution(false)))?;

        let outcome = handle.apply_batch(records).await?;
        record(|m| {
            m.record_batch_outcome(
                outcome.written.len(),
                outcome.dropped.len(),
                outcome.failed.len(),
            )
        });

        let mut batch = Batch::new(table.clone());
        for written in &outcome.written {
            batch.insert(written.id.clone(), written.values.clone())?;
        }

        let deadline = CommitDeadline::after(self.config.commit_timeout);
        let committed = self
            .store
            .commit(batch, deadline)
            .await
            .inspect(|_| record(|m| m.record_commit(true)))
            .inspect_err(|e| {
                record(|m| m.record_commit(false));
                tracing::warn!(table = %table, error = %e, "batch commit failed");
            })?;

        tracing::info!(
            tenant_id = %tenant_id,
            table = %table,
            transform = %handle.digest(),
            committed,
            dropped = outcome.dropped.len(),
            failed = outcome.failed.len(),
            "batch committed"
        );

        spawn_notification(
            Arc::clone(&self.notifier),
            collection,
            self.config.notify_timeout,
        );

        Ok(outcome)
    }

    /// Apply the store timeout to a read-only column store call. Abandoning
    /// a read leaves nothing behind; commits enforce the deadline themselves.
    async fn read_bounded<T, F>(&self, call: F) -> Result<T, CommitError>
    where
        F: Future<Output = Result<T, CommitError>>,
    {
        let limit = self.config.commit_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| CommitError::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

fn record<F: FnOnce(&crate::telemetry::SluiceMetrics)>(f: F) {
    if let Some(metrics) = metrics() {
        f(metrics);
    }
}
