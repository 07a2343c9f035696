use shapeworker_core::{Handle, KernelError, RegistryError, ResolveError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("handle not found: {0}")]
    HandleNotFound(Handle),

    #[error("kernel computation failed: {0}")]
    KernelComputationFailure(#[from] KernelError),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("operation registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("worker is no longer running")]
    WorkerUnavailable,

    #[error("{0}")]
    OperationFailed(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<ResolveError> for ProxyError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::HandleNotFound(handle) => ProxyError::HandleNotFound(handle),
            malformed @ ResolveError::MalformedHandle { .. } => {
                ProxyError::MalformedRequest(malformed.to_string())
            }
        }
    }
}
