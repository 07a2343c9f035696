use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::identity::OperationIdentity;

/// Opaque reference to a kernel object living inside the worker.
///
/// The value is the hex SHA-256 digest of the [`OperationIdentity`] that
/// produced the object, so equal operations always yield equal handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wire form of a handle returned to the host: `{"hash": ..., "type": "shape"}`.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({ "hash": self.0, "type": "shape" })
    }

    /// Parse a handle reference sent by the host.
    ///
    /// Accepts either the bare hash string or the object form produced by
    /// [`Handle::to_wire`].
    pub fn from_reference(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            serde_json::Value::Object(map) => map
                .get("hash")
                .and_then(|h| h.as_str())
                .filter(|h| !h.is_empty())
                .map(|h| Self(h.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&OperationIdentity> for Handle {
    fn from(identity: &OperationIdentity) -> Self {
        Self(identity.digest().to_string())
    }
}

/// Maps handles to live kernel objects.
///
/// Objects are stored behind `Arc` so a resolved request can hold them while
/// the table itself is mutated by the cache.
pub struct HandleTable<T> {
    entries: HashMap<Handle, Arc<T>>,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Store an object under the handle derived from `identity`.
    ///
    /// If the handle is already present the existing object is kept: a
    /// handle's content never changes once issued.
    pub fn put(&mut self, identity: &OperationIdentity, value: T) -> Handle {
        let handle = Handle::from(identity);
        if !self.entries.contains_key(&handle) {
            self.entries.insert(handle.clone(), Arc::new(value));
        } else {
            tracing::debug!(handle = %handle, "Handle already issued, keeping existing object");
        }
        handle
    }

    pub fn get(&self, handle: &Handle) -> Result<Arc<T>, ResolveError> {
        self.entries
            .get(handle)
            .cloned()
            .ok_or_else(|| ResolveError::HandleNotFound(handle.clone()))
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every object. Returns how many were held.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
