use thiserror::Error;

use crate::handle::Handle;

/// Failure while substituting handle references with live objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("handle not found: {0}")]
    HandleNotFound(Handle),

    #[error("field '{field}' does not hold a handle reference")]
    MalformedHandle { field: String },
}

/// Failure raised by a kernel operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    /// The kernel panicked mid-computation; nothing from the call was stored.
    #[error("kernel panicked: {0}")]
    Panicked(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        KernelError::InvalidInput(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("operation registered twice: {0}")]
    DuplicateOperation(String),

    #[error("operation name collides with a reserved name: {0}")]
    ReservedName(String),
}
