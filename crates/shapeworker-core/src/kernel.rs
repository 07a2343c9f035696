use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{KernelError, RegistryError};
use crate::protocol::ReservedOperation;
use crate::resolver::ResolvedInputs;

/// Result of one kernel operation.
#[derive(Debug)]
pub enum KernelOutput<T> {
    /// A kernel-native object; stored in the handle table, host receives a handle.
    Object(T),
    /// A number, array or other JSON payload returned as-is.
    Value(Value),
}

/// Typed handler for one named operation.
pub type OperationHandler<K> =
    fn(&K, ResolvedInputs<<K as Kernel>::Object>) -> Result<KernelOutput<<K as Kernel>::Object>, KernelError>;

/// The geometry kernel behind the proxy.
///
/// Cacheable operations are declared through [`Kernel::register_operations`];
/// tessellation and export are always computed fresh and so sit outside the
/// registry.
pub trait Kernel: Sized {
    type Object: Send + Sync + 'static;

    /// Add every cacheable operation this kernel serves.
    fn register_operations(registry: &mut OperationRegistry<Self>) -> Result<(), RegistryError>;

    /// Tessellate an object into mesh buffers.
    fn tessellate(&self, object: &Self::Object, params: &Map<String, Value>) -> Result<Value, KernelError>;

    /// Serialize an object into an exchange document.
    fn export(&self, object: &Self::Object, params: &Map<String, Value>) -> Result<Value, KernelError>;
}

/// Name → handler dispatch table, built once at startup.
pub struct OperationRegistry<K: Kernel> {
    handlers: BTreeMap<String, OperationHandler<K>>,
}

impl<K: Kernel> OperationRegistry<K> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Build the registry for `K`, rejecting duplicate or reserved names.
    pub fn for_kernel() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        K::register_operations(&mut registry)?;
        tracing::debug!(operations = registry.len(), "Operation registry built");
        Ok(registry)
    }

    pub fn register(&mut self, name: &str, handler: OperationHandler<K>) -> Result<(), RegistryError> {
        if name.parse::<ReservedOperation>().is_ok() {
            return Err(RegistryError::ReservedName(name.to_string()));
        }
        if self.handlers.contains_key(name) {
            return Err(RegistryError::DuplicateOperation(name.to_string()));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<OperationHandler<K>> {
        self.handlers.get(name).copied()
    }

    /// Registered operation names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<K: Kernel> Default for OperationRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Numbers;

    fn double(_: &Numbers, inputs: ResolvedInputs<f64>) -> Result<KernelOutput<f64>, KernelError> {
        let value = inputs
            .params
            .get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| KernelError::InvalidInput("missing value".into()))?;
        Ok(KernelOutput::Object(value * 2.0))
    }

    impl Kernel for Numbers {
        type Object = f64;

        fn register_operations(registry: &mut OperationRegistry<Self>) -> Result<(), RegistryError> {
            registry.register("double", double)
        }

        fn tessellate(&self, object: &f64, _: &Map<String, Value>) -> Result<Value, KernelError> {
            Ok(Value::from(*object))
        }

        fn export(&self, object: &f64, _: &Map<String, Value>) -> Result<Value, KernelError> {
            Ok(Value::String(object.to_string()))
        }
    }

    #[test]
    fn registry_is_built_from_kernel() {
        let registry = OperationRegistry::<Numbers>::for_kernel().unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["double"]);
        assert!(registry.get("triple").is_none());

        let handler = registry.get("double").unwrap();
        let mut params = Map::new();
        params.insert("value".into(), Value::from(2.5));
        let inputs = ResolvedInputs {
            shape: None,
            shapes: Vec::new(),
            params,
        };
        assert!(matches!(handler(&Numbers, inputs), Ok(KernelOutput::Object(v)) if v == 5.0));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = OperationRegistry::<Numbers>::new();
        registry.register("double", double).unwrap();

        let err = registry.register("double", double).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateOperation("double".into()));
    }

    #[test]
    fn reserved_names_cannot_be_registered() {
        let mut registry = OperationRegistry::<Numbers>::new();
        let err = registry.register("shapeToMesh", double).unwrap_err();
        assert_eq!(err, RegistryError::ReservedName("shapeToMesh".into()));
    }
}
