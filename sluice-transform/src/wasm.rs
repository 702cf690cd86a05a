//! WebAssembly sandbox for tenant processing code.
//!
//! Uploaded processing code is a core WebAssembly module. It runs with no
//! host imports, a per-record fuel budget and a linear memory cap, so a
//! tenant transform can burn its own budget but cannot reach the host.
//!
//! # ABI (version 1)
//!
//! | export               | signature              |
//! |----------------------|------------------------|
//! | `memory`             | linear memory          |
//! | `sluice_abi_version` | `() -> i32`, returns 1 |
//! | `alloc`              | `(len: i32) -> i32`    |
//! | `transform`          | `(ptr: i32, len: i32) -> i64` |
//!
//! The host writes the record's values as a JSON object into a buffer from
//! `alloc` and calls `transform`. A non-negative result packs the output
//! location as `(ptr << 32) | len`. Zero length, `null` or `{}` mean "no
//! output". A negative result is a guest-reported failure.

use serde_json::Value;
use sluice_core::{FieldMap, LoadError, TransformError, TransformLimits};
use wasmtime::{
    Config, Engine, Instance, Memory, Module, Store, StoreLimits, StoreLimitsBuilder, Trap,
    TypedFunc,
};

use crate::transform::{Transform, TransformLoader};

/// ABI version this host speaks.
pub const ABI_VERSION: i32 = 1;

const WASM_MAGIC: &[u8; 4] = b"\0asm";

pub const EXPORT_MEMORY: &str = "memory";
pub const EXPORT_ABI_VERSION: &str = "sluice_abi_version";
pub const EXPORT_ALLOC: &str = "alloc";
pub const EXPORT_TRANSFORM: &str = "transform";

struct SandboxState {
    limits: StoreLimits,
}

// ============================================================================
// LOADER
// ============================================================================

/// Compiles and instantiates uploaded modules.
#[derive(Clone)]
pub struct WasmLoader {
    engine: Engine,
    limits: TransformLimits,
}

impl WasmLoader {
    pub fn new(limits: TransformLimits) -> Result<Self, LoadError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        let engine = Engine::new(&config).map_err(|e| LoadError::Instantiate {
            reason: format!("sandbox engine unavailable: {e}"),
        })?;
        Ok(Self { engine, limits })
    }

    pub fn limits(&self) -> &TransformLimits {
        &self.limits
    }

    /// Compile a module and check that it is self-contained.
    pub fn compile(&self, artifact: &[u8]) -> Result<Module, LoadError> {
        if artifact.len() < 8 || !artifact.starts_with(WASM_MAGIC) {
            return Err(LoadError::Malformed {
                reason: "not a WebAssembly binary".to_string(),
            });
        }

        let module = Module::new(&self.engine, artifact).map_err(|e| LoadError::Malformed {
            reason: e.to_string(),
        })?;

        if let Some(import) = module.imports().next() {
            return Err(LoadError::Malformed {
                reason: format!(
                    "imports are not allowed, found {}::{}",
                    import.module(),
                    import.name()
                ),
            });
        }

        Ok(module)
    }
}

impl TransformLoader for WasmLoader {
    fn load(&self, artifact: &[u8]) -> Result<Box<dyn Transform>, LoadError> {
        let module = self.compile(artifact)?;
        let live = SandboxInstance::new(&self.engine, &module, &self.limits)?;
        Ok(Box::new(WasmTransform {
            engine: self.engine.clone(),
            module,
            limits: self.limits.clone(),
            live: Some(live),
        }))
    }
}

// ============================================================================
// INSTANCE
// ============================================================================

struct SandboxInstance {
    store: Store<SandboxState>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    entry: TypedFunc<(i32, i32), i64>,
}

impl SandboxInstance {
    fn new(engine: &Engine, module: &Module, limits: &TransformLimits) -> Result<Self, LoadError> {
        let instantiate = |reason: String| LoadError::Instantiate { reason };

        let state = SandboxState {
            limits: StoreLimitsBuilder::new()
                .memory_size(limits.max_memory_bytes)
                .instances(1)
                .build(),
        };
        let mut store = Store::new(engine, state);
        store.limiter(|state| &mut state.limits);
        store
            .set_fuel(limits.fuel_per_record)
            .map_err(|e| instantiate(e.to_string()))?;

        let instance =
            Instance::new(&mut store, module, &[]).map_err(|e| instantiate(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, EXPORT_MEMORY)
            .ok_or_else(|| instantiate(format!("missing export '{EXPORT_MEMORY}'")))?;
        let version = instance
            .get_typed_func::<(), i32>(&mut store, EXPORT_ABI_VERSION)
            .map_err(|e| instantiate(format!("export '{EXPORT_ABI_VERSION}': {e}")))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, EXPORT_ALLOC)
            .map_err(|e| instantiate(format!("export '{EXPORT_ALLOC}': {e}")))?;
        let entry = instance
            .get_typed_func::<(i32, i32), i64>(&mut store, EXPORT_TRANSFORM)
            .map_err(|e| instantiate(format!("export '{EXPORT_TRANSFORM}': {e}")))?;

        let reported = version
            .call(&mut store, ())
            .map_err(|e| instantiate(e.to_string()))?;
        if reported != ABI_VERSION {
            return Err(instantiate(format!(
                "unsupported ABI version {reported}, expected {ABI_VERSION}"
            )));
        }

        Ok(Self {
            store,
            memory,
            alloc,
            entry,
        })
    }

    fn call(&mut self, input: &[u8], fuel: u64) -> Result<Option<FieldMap>, TransformError> {
        let len = i32::try_from(input.len()).map_err(|_| TransformError::Input {
            reason: format!("record of {} bytes is too large", input.len()),
        })?;

        self.store
            .set_fuel(fuel)
            .map_err(|e| TransformError::Trap {
                reason: e.to_string(),
            })?;

        let ptr = self.alloc.call(&mut self.store, len).map_err(classify)?;
        let offset = usize::try_from(ptr).map_err(|_| TransformError::Memory {
            reason: format!("alloc returned negative pointer {ptr}"),
        })?;
        self.memory
            .write(&mut self.store, offset, input)
            .map_err(|e| TransformError::Memory {
                reason: e.to_string(),
            })?;

        let packed = self
            .entry
            .call(&mut self.store, (ptr, len))
            .map_err(classify)?;
        if packed < 0 {
            return Err(TransformError::Guest { code: packed });
        }

        let out_ptr = (packed as u64 >> 32) as usize;
        let out_len = (packed as u64 & 0xFFFF_FFFF) as usize;
        if out_len == 0 {
            return Ok(None);
        }
        let end = out_ptr.saturating_add(out_len);
        if end > self.memory.data_size(&self.store) {
            return Err(TransformError::Memory {
                reason: format!("output {out_ptr}+{out_len} is outside linear memory"),
            });
        }

        let mut output = vec![0u8; out_len];
        self.memory
            .read(&self.store, out_ptr, &mut output)
            .map_err(|e| TransformError::Memory {
                reason: e.to_string(),
            })?;
        decode_output(&output)
    }
}

fn classify(err: wasmtime::Error) -> TransformError {
    match err.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => TransformError::FuelExhausted,
        _ => TransformError::Trap {
            reason: err.to_string(),
        },
    }
}

/// Interpret a transform's output bytes.
pub fn decode_output(bytes: &[u8]) -> Result<Option<FieldMap>, TransformError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(bytes).map_err(|e| TransformError::InvalidOutput {
        reason: e.to_string(),
    })?;
    match value {
        Value::Null => Ok(None),
        Value::Object(fields) if fields.is_empty() => Ok(None),
        Value::Object(fields) => Ok(Some(fields)),
        other => Err(TransformError::InvalidOutput {
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// TRANSFORM
// ============================================================================

/// A sandboxed transform instance.
///
/// A trap leaves guest state undefined, so the instance is discarded and a
/// fresh one is created from the compiled module before the next call.
pub struct WasmTransform {
    engine: Engine,
    module: Module,
    limits: TransformLimits,
    live: Option<SandboxInstance>,
}

impl Transform for WasmTransform {
    fn transform(&mut self, fields: &FieldMap) -> Result<Option<FieldMap>, TransformError> {
        let input = serde_json::to_vec(fields).map_err(|e| TransformError::Input {
            reason: e.to_string(),
        })?;

        let mut live = match self.live.take() {
            Some(live) => live,
            None => SandboxInstance::new(&self.engine, &self.module, &self.limits).map_err(|e| {
                TransformError::Trap {
                    reason: format!("re-instantiation failed: {e}"),
                }
            })?,
        };

        let result = live.call(&input, self.limits.fuel_per_record);
        if !matches!(
            result,
            Err(TransformError::Trap { .. } | TransformError::FuelExhausted)
        ) {
            self.live = Some(live);
        }
        result
    }
}
