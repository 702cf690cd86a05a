//! Request, record and outcome types for the ingestion pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::error::TransformError;
use crate::identity::{Collection, SecretKey, TenantId};

/// Field name to value mapping of a single record.
pub type FieldMap = serde_json::Map<String, Value>;

// ============================================================================
// RECORDS
// ============================================================================

/// One submitted record: a row key plus its raw field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub values: FieldMap,
}

impl Record {
    pub fn new(id: impl Into<String>, values: FieldMap) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }
}

/// A validated-shape ingestion request.
///
/// `collection` and `secret_key` stay optional here: their absence is a
/// client error detected by the pipeline before any external call.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub collection: Option<Collection>,
    pub secret_key: Option<SecretKey>,
    pub records: Vec<Record>,
}

impl IngestRequest {
    pub fn new(collection: Collection, secret_key: SecretKey, records: Vec<Record>) -> Self {
        Self {
            collection: Some(collection),
            secret_key: Some(secret_key),
            records,
        }
    }
}

// ============================================================================
// TENANT BINDING
// ============================================================================

/// Resolved tenant identity for a collection, together with the key that
/// resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantBinding {
    pub tenant_id: TenantId,
    pub collection: Collection,
    pub bound_key: SecretKey,
}

impl TenantBinding {
    pub fn new(tenant_id: TenantId, collection: Collection, bound_key: SecretKey) -> Self {
        Self {
            tenant_id,
            collection,
            bound_key,
        }
    }

    /// A binding is only valid for the exact key it was resolved with.
    pub fn accepts(&self, key: &SecretKey) -> bool {
        &self.bound_key == key
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// A record that made it into the committed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenRecord {
    pub id: String,
    pub values: FieldMap,
}

/// A record whose transform failed; it is skipped, not fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformFailure {
    pub record_id: String,
    pub reason: String,
}

impl TransformFailure {
    pub fn new(record_id: impl Into<String>, error: &TransformError) -> Self {
        Self {
            record_id: record_id.into(),
            reason: error.to_string(),
        }
    }
}

/// Result of one pipeline execution.
///
/// `written` preserves input order. `dropped` lists records whose transform
/// produced no output; `failed` lists records whose transform errored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub written: Vec<WrittenRecord>,
    pub dropped: Vec<String>,
    pub failed: Vec<TransformFailure>,
}

impl BatchOutcome {
    pub fn written_ids(&self) -> Vec<&str> {
        self.written.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn total(&self) -> usize {
        self.written.len() + self.dropped.len() + self.failed.len()
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a record's values before they reach a transform.
///
/// Text is brought to Unicode NFC; nested arrays and objects are walked so
/// their string leaves get the same treatment. Other values pass through.
pub fn normalize_fields(values: &FieldMap) -> FieldMap {
    values
        .iter()
        .map(|(name, value)| (name.clone(), normalize_value(value)))
        .collect()
}

pub fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(text.nfc().collect()),
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        Value::Object(fields) => Value::Object(normalize_fields(fields)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => FieldMap::new(),
        }
    }

    #[test]
    fn test_normalize_composes_decomposed_text() {
        // "e" followed by a combining acute accent
        let input = fields(json!({ "name": "Caf\u{0065}\u{0301}" }));
        let output = normalize_fields(&input);
        assert_eq!(output["name"], json!("Caf\u{00e9}"));
    }

    #[test]
    fn test_normalize_leaves_other_types_untouched() {
        let input = fields(json!({ "n": 4.5, "flag": true, "none": null, "count": 7 }));
        assert_eq!(normalize_fields(&input), input);
    }

    #[test]
    fn test_normalize_walks_nested_values() {
        let input = fields(json!({
            "tags": ["A\u{030a}", 1],
            "meta": { "city": "A\u{030a}rhus" }
        }));
        let output = normalize_fields(&input);
        assert_eq!(output["tags"], json!(["\u{00c5}", 1]));
        assert_eq!(output["meta"]["city"], json!("\u{00c5}rhus"));
    }

    #[test]
    fn test_binding_accepts_only_bound_key() {
        let binding = TenantBinding::new(
            TenantId::new("42"),
            Collection::new("events"),
            SecretKey::new("k1"),
        );
        assert!(binding.accepts(&SecretKey::new("k1")));
        assert!(!binding.accepts(&SecretKey::new("k2")));
    }

    #[test]
    fn test_outcome_counts() {
        let outcome = BatchOutcome {
            written: vec![WrittenRecord {
                id: "a".to_string(),
                values: FieldMap::new(),
            }],
            dropped: vec!["b".to_string()],
            failed: vec![TransformFailure {
                record_id: "c".to_string(),
                reason: "trap".to_string(),
            }],
        };
        assert_eq!(outcome.total(), 3);
        assert_eq!(outcome.written_ids(), vec!["a"]);
    }
}
