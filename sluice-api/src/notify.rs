//! Post-commit notification sink.
//!
//! After a batch commits, the collection name is announced to an external
//! sink. Delivery is best effort: it runs detached from the request, and a
//! failure is logged and counted but never changes the ingestion result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use sluice_core::Collection;
use thiserror::Error;

use crate::telemetry::metrics;

/// Notification delivery failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification sink responded {0}")]
    Status(u16),

    #[error("notification timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("invalid notification URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, collection: &Collection) -> Result<(), NotifyError>;
}

/// `GET <base>/<collection>` for every successful commit. The collection
/// is sent as a single percent-encoded path segment.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let base_url = Url::parse(base_url).map_err(|e| NotifyError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(NotifyError::InvalidUrl(format!("{base_url} cannot carry a path")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, collection: &Collection) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(collection.as_str());
        }
        url
    }
}

#[async_trait]
impl NotificationSink for HttpNotifier {
    async fn notify(&self, collection: &Collection) -> Result<(), NotifyError> {
        let response = self
            .client
            .get(self.url_for(collection))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(response.status().as_u16()))
        }
    }
}

/// Sink that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn notify(&self, _collection: &Collection) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Deliver a notification on the runtime without waiting for it.
pub fn spawn_notification(
    sink: Arc<dyn NotificationSink>,
    collection: Collection,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let result = match tokio::time::timeout(timeout, sink.notify(&collection)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout {
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        if let Some(metrics) = metrics() {
            metrics.record_notification(result.is_ok());
        }
        if let Err(e) = result {
            tracing::warn!(collection = %collection, error = %e, "notification failed");
        }
    })
}
