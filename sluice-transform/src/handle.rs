//! Cached transform handles.

use std::fmt;
use std::sync::Arc;

use sluice_core::{
    normalize_fields, BatchOutcome, LoadError, Record, TransformFailure, WrittenRecord,
};
use sluice_storage::TransformKey;
use tokio::sync::Mutex;

use crate::transform::Transform;

/// A loaded transform for one `(tenant, collection, key)` composite.
///
/// The instance may be stateful, so calls into it are serialized: at most
/// one batch runs against a handle at a time, and concurrent requests that
/// resolved the same handle queue behind each other.
pub struct TransformHandle {
    key: TransformKey,
    digest: String,
    instance: Mutex<Box<dyn Transform>>,
}

impl TransformHandle {
    pub fn new(key: TransformKey, digest: impl Into<String>, instance: Box<dyn Transform>) -> Self {
        Self {
            key,
            digest: digest.into(),
            instance: Mutex::new(instance),
        }
    }

    /// SHA-256 of the artifact this handle was loaded from.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Run every record through the transform, in input order.
    ///
    /// Values are NFC-normalized first. Records with output are returned in
    /// `written`; records without output in `dropped`; records whose
    /// transform failed in `failed`. A failed record never stops the batch.
    pub async fn apply_batch(self: &Arc<Self>, records: Vec<Record>) -> Result<BatchOutcome, LoadError> {
        let handle = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let mut instance = handle.instance.blocking_lock();
            let mut outcome = BatchOutcome::default();

            for record in records {
                let normalized = normalize_fields(&record.values);
                match instance.transform(&normalized) {
                    Ok(Some(values)) => outcome.written.push(WrittenRecord {
                        id: record.id,
                        values,
                    }),
                    Ok(None) => outcome.dropped.push(record.id),
                    Err(error) => {
                        tracing::warn!(
                            record_id = %record.id,
                            error = %error,
                            "record transform failed, skipping"
                        );
                        outcome.failed.push(TransformFailure::new(record.id, &error));
                    }
                }
            }
            outcome
        })
        .await
        .map_err(|e| LoadError::Instantiate {
            reason: format!("transform task failed: {e}"),
        })
    }
}

impl fmt::Debug for TransformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformHandle")
            .field("key", &self.key)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}
