//! Sluice Transform - Sandboxed Tenant Transforms
//!
//! Tenants upload processing code that reshapes each record before it is
//! written. Running tenant code inside the service is a trust boundary:
//! artifacts are WebAssembly modules executed without host imports, under
//! a fuel budget and a memory cap (see [`wasm`]).
//!
//! Loaded transforms are cached per `(tenant, collection, key)` in the
//! [`TransformRegistry`]; calls into one handle are serialized.

pub mod handle;
pub mod registry;
pub mod transform;
pub mod wasm;

pub use handle::TransformHandle;
pub use registry::{RegistryConfig, TransformRegistry};
pub use transform::{Transform, TransformLoader};
pub use wasm::{decode_output, WasmLoader, WasmTransform, ABI_VERSION};
