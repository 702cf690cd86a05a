//! Sluice Test Utilities
//!
//! Shared test infrastructure for the sluice workspace:
//! - Proptest generators for records and identities
//! - WebAssembly transform fixtures that speak the sandbox ABI
//! - Loaders that count or script transform loads
//! - Small helpers for building field maps

pub use sluice_core::{
    BatchOutcome, Collection, CommitError, FieldMap, IngestRequest, LoadError, Record, SecretKey,
    TableName, TenantId, TransformError,
};
pub use sluice_storage::{ArtifactStore, InMemoryArtifactStore, InMemoryColumnStore};
pub use sluice_transform::{Transform, TransformLoader, WasmLoader};

use serde_json::Value;

/// Build a field map from a JSON object literal. Non-objects yield an empty map.
pub fn field_map(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        _ => FieldMap::new(),
    }
}

/// Build a record from an id and a JSON object literal.
pub fn record(id: &str, values: Value) -> Record {
    Record::new(id, field_map(values))
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        "[1-9][0-9]{0,5}".prop_map(TenantId::new)
    }

    pub fn arb_collection() -> impl Strategy<Value = Collection> {
        "[a-z][a-z0-9]{0,11}".prop_map(Collection::new)
    }

    pub fn arb_secret_key() -> impl Strategy<Value = SecretKey> {
        "[A-Za-z0-9]{8,24}".prop_map(SecretKey::new)
    }

    /// Scalar JSON leaves, including text that is not in NFC.
    pub fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,12}".prop_map(Value::String),
            Just(Value::String("Cafe\u{0301}".to_string())),
        ]
    }

    /// A non-empty field map with up to `max_fields` columns.
    pub fn arb_field_map(max_fields: usize) -> impl Strategy<Value = FieldMap> {
        prop::collection::btree_map("[a-z]{1,8}", arb_leaf(), 1..=max_fields.max(1))
            .prop_map(|fields| fields.into_iter().collect())
    }

    /// Records with unique ids; about 30% of them carry no fields.
    pub fn arb_records(max_records: usize) -> impl Strategy<Value = Vec<Record>> {
        prop::collection::vec(
            (prop::bool::weighted(0.3), arb_field_map(4)),
            0..=max_records,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (empty, fields))| {
                    let values = if empty { FieldMap::new() } else { fields };
                    Record::new(format!("row-{i:04}"), values)
                })
                .collect()
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    const HEADER: &str = r#"
        (memory (export "memory") 1)
        (func (export "sluice_abi_version") (result i32) i32.const 1)
        (func (export "alloc") (param i32) (result i32) i32.const 1024)
    "#;

    const ECHO: &str = r#"
        (i64.or
          (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
          (i64.extend_i32_u (local.get $len)))
    "#;

    fn assemble(body: &str) -> Vec<u8> {
        let text = format!("(module {HEADER} {body})");
        wat::parse_str(&text).unwrap_or_else(|e| panic!("fixture failed to assemble: {e}"))
    }

    /// Echoes every record. Records with no fields serialize to `{}` and are
    /// therefore dropped.
    pub fn identity_module() -> Vec<u8> {
        assemble(&format!(
            r#"(func (export "transform") (param $ptr i32) (param $len i32) (result i64) {ECHO})"#
        ))
    }

    /// Produces no output for any record.
    pub fn drop_all_module() -> Vec<u8> {
        assemble(r#"(func (export "transform") (param i32 i32) (result i64) i64.const 0)"#)
    }

    /// Reports failure code -1 for every record.
    pub fn failing_module() -> Vec<u8> {
        assemble(r#"(func (export "transform") (param i32 i32) (result i64) i64.const -1)"#)
    }

    /// Traps on records with no fields and echoes the rest.
    pub fn trap_on_empty_module() -> Vec<u8> {
        assemble(&format!(
            r#"(func (export "transform") (param $ptr i32) (param $len i32) (result i64)
                 (if (i32.eq (local.get $len) (i32.const 2)) (then unreachable))
                 {ECHO})"#
        ))
    }

    /// Never returns; exhausts its fuel on every record.
    pub fn spinning_module() -> Vec<u8> {
        assemble(
            r#"(func (export "transform") (param i32 i32) (result i64)
                 (loop $spin (br $spin))
                 i64.const 0)"#,
        )
    }

    /// Returns the same JSON document for every record.
    pub fn constant_module(output: &str) -> Vec<u8> {
        let escaped: String = output.bytes().map(|b| format!("\\{b:02x}")).collect();
        assemble(&format!(
            r#"(data (i32.const 0) "{escaped}")
               (func (export "transform") (param i32 i32) (result i64) i64.const {len})"#,
            len = output.len()
        ))
    }

    /// Bytes that are not a WebAssembly module.
    pub fn not_a_module() -> Vec<u8> {
        b"def process(values):\n    return values\n".to_vec()
    }
}

// ============================================================================
// LOADERS
// ============================================================================

pub mod loaders {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Wraps a loader, counting calls and optionally slowing each one down.
    pub struct CountingLoader {
        inner: Arc<dyn TransformLoader>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingLoader {
        pub fn new(inner: Arc<dyn TransformLoader>) -> Self {
            Self::with_delay(inner, Duration::ZERO)
        }

        pub fn with_delay(inner: Arc<dyn TransformLoader>, delay: Duration) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
                delay,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TransformLoader for CountingLoader {
        fn load(&self, artifact: &[u8]) -> Result<Box<dyn Transform>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.inner.load(artifact)
        }
    }

    /// Loader that builds transforms from a closure, ignoring artifact bytes.
    pub struct FnLoader<F> {
        build: F,
    }

    impl<F> FnLoader<F>
    where
        F: Fn(&[u8]) -> Result<Box<dyn Transform>, LoadError> + Send + Sync,
    {
        pub fn new(build: F) -> Self {
            Self { build }
        }
    }

    impl<F> TransformLoader for FnLoader<F>
    where
        F: Fn(&[u8]) -> Result<Box<dyn Transform>, LoadError> + Send + Sync,
    {
        fn load(&self, artifact: &[u8]) -> Result<Box<dyn Transform>, LoadError> {
            (self.build)(artifact)
        }
    }

    /// A sandbox loader with small limits suited to tests.
    pub fn test_wasm_loader() -> Arc<WasmLoader> {
        let limits = sluice_core::TransformLimits {
            fuel_per_record: 500_000,
            max_memory_bytes: 16 * 65_536,
        };
        match WasmLoader::new(limits) {
            Ok(loader) => Arc::new(loader),
            Err(e) => panic!("sandbox engine should build: {e}"),
        }
    }
}
