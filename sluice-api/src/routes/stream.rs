//! Record ingestion endpoint.
//!
//! `POST /stream` with an `application/json` body:
//! `{"collection": "...", "key": "...", "data": [{"id": ..., "values": {...}}]}`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
};
use serde::Deserialize;
use serde_json::Value;
use sluice_core::{Collection, FieldMap, IngestRequest, Record, SecretKey, SluiceError};

use crate::error::{ApiError, ApiResult};
use crate::pipeline::IngestionPipeline;

// ============================================================================
// TYPES
// ============================================================================

/// Body of a `/stream` request as sent by clients.
///
/// Parameters are kept loose here: a missing or blank `collection`/`key` is
/// a missing-parameter error, not a parse error.
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub collection: Option<Value>,
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub data: Option<Vec<RawRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct RawRecord {
    /// String or number; numbers are stored by their decimal form.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub values: Option<FieldMap>,
}

/// Text form of a scalar parameter. Blank strings count as absent.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl StreamRequest {
    /// Convert into a pipeline request.
    pub fn into_ingest_request(self) -> ApiResult<IngestRequest> {
        let collection = scalar_text(self.collection.as_ref())
            .map(Collection::new)
            .ok_or_else(|| SluiceError::missing("collection"))?;
        let secret_key = scalar_text(self.key.as_ref())
            .map(SecretKey::new)
            .ok_or_else(|| SluiceError::missing("key"))?;

        let records = self
            .data
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let id = scalar_text(raw.id.as_ref()).ok_or_else(|| {
                    ApiError::invalid_input(format!("Record at index {} has no id", index))
                })?;
                Ok(Record::new(id, raw.values.unwrap_or_default()))
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Ok(IngestRequest::new(collection, secret_key, records))
    }
}

/// Accept any content type that mentions `application/json`.
fn require_json(headers: &HeaderMap) -> Result<(), SluiceError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    match content_type {
        Some(value) if value.contains("application/json") => Ok(()),
        other => Err(SluiceError::UnsupportedContentType {
            content_type: other.map(str::to_string),
        }),
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /stream - Validate, transform and commit a batch of records
pub async fn stream(
    State(pipeline): State<Arc<IngestionPipeline>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<&'static str> {
    require_json(&headers)?;

    let parsed: StreamRequest = serde_json::from_slice(&body)?;
    let request = parsed.into_ingest_request()?;

    pipeline.ingest(request).await?;
    Ok("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn parse(value: Value) -> ApiResult<IngestRequest> {
        let request: StreamRequest = serde_json::from_value(value)?;
        request.into_ingest_request()
    }

    #[test]
    fn test_content_type_substring_match() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            require_json(&headers),
            Err(SluiceError::UnsupportedContentType { content_type: None })
        );

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert_eq!(require_json(&headers), Ok(()));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(
            require_json(&headers),
            Err(SluiceError::UnsupportedContentType {
                content_type: Some("text/plain".to_string())
            })
        );
    }

    #[test]
    fn test_rejected_content_type_maps_to_415() {
        let err = ApiError::from(SluiceError::UnsupportedContentType {
            content_type: Some("text/plain".to_string()),
        });
        assert_eq!(err.code, ErrorCode::UnsupportedContentType);
        assert_eq!(err.status_code(), axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_missing_parameters() {
        let err = parse(json!({"key": "k", "data": []})).err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::MissingParameter));

        let err = parse(json!({"collection": "events", "key": "  "})).err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::MissingParameter));
    }

    #[test]
    fn test_missing_parameter_wins_over_bad_record() {
        let err = parse(json!({"collection": "events", "data": [{"values": {}}]})).err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::MissingParameter));
    }

    #[test]
    fn test_numeric_ids_and_missing_data() -> ApiResult<()> {
        let request = parse(json!({
            "collection": "events",
            "key": "k1",
            "data": [{"id": 7, "values": {"a": 1}}, {"id": "x"}]
        }))?;
        let ids: Vec<&str> = request.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["7", "x"]);
        assert!(request.records[1].values.is_empty());

        let request = parse(json!({"collection": "events", "key": "k1"}))?;
        assert!(request.records.is_empty());
        Ok(())
    }

    #[test]
    fn test_record_without_id_is_invalid_input() {
        let err = parse(json!({
            "collection": "events",
            "key": "k1",
            "data": [{"id": "a", "values": {}}, {"values": {}}]
        }))
        .err();
        let err = err.map(|e| (e.code, e.message));
        assert_eq!(
            err,
            Some((ErrorCode::InvalidInput, "Record at index 1 has no id".to_string()))
        );
    }
}
