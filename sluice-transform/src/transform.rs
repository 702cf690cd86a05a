//! Transform and loader traits.

use sluice_core::{FieldMap, LoadError, TransformError};

/// A loaded tenant transform.
///
/// Instances may keep state between calls, so callers hold exclusive access
/// (`&mut self`) for the duration of a call.
pub trait Transform: Send {
    /// Transform one record's normalized values.
    ///
    /// `Ok(None)` means "no output": the record is dropped without error.
    fn transform(&mut self, fields: &FieldMap) -> Result<Option<FieldMap>, TransformError>;
}

impl<F> Transform for F
where
    F: FnMut(&FieldMap) -> Result<Option<FieldMap>, TransformError> + Send,
{
    fn transform(&mut self, fields: &FieldMap) -> Result<Option<FieldMap>, TransformError> {
        self(fields)
    }
}

/// Turns artifact bytes into a ready-to-call [`Transform`].
///
/// Loading is CPU-bound and synchronous; async callers run it on the
/// blocking pool.
pub trait TransformLoader: Send + Sync {
    fn load(&self, artifact: &[u8]) -> Result<Box<dyn Transform>, LoadError>;
}
