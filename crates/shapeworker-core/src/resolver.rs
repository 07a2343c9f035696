use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{KernelError, ResolveError};
use crate::handle::{Handle, HandleTable};
use crate::identity::{SHAPE_FIELD, SHAPES_FIELD};

/// Request inputs with every handle reference replaced by its live object.
///
/// Built fresh from the request; the request itself is left untouched.
#[derive(Debug)]
pub struct ResolvedInputs<T> {
    pub shape: Option<Arc<T>>,
    pub shapes: Vec<Arc<T>>,
    /// Literal parameters (everything except `shape` and `shapes`).
    pub params: Map<String, Value>,
}

impl<T> ResolvedInputs<T> {
    /// Deserialize the literal parameters into an operation's typed input.
    pub fn params<P: DeserializeOwned>(&self) -> Result<P, KernelError> {
        Ok(serde_json::from_value(Value::Object(self.params.clone()))?)
    }

    /// The single subject shape, or an input error naming what is missing.
    pub fn subject(&self) -> Result<&T, KernelError> {
        self.shape
            .as_deref()
            .ok_or_else(|| KernelError::InvalidInput(format!("missing field `{SHAPE_FIELD}`")))
    }
}

/// Substitute `shape` / `shapes` handle references with objects from `table`.
///
/// `inputs` that are `null` resolve to an empty parameter set.
pub fn resolve<T>(
    table: &HandleTable<T>,
    inputs: &Value,
) -> Result<ResolvedInputs<T>, ResolveError> {
    let mut params = match inputs {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => {
            return Err(ResolveError::MalformedHandle {
                field: "inputs".into(),
            });
        }
    };

    let shape = match params.remove(SHAPE_FIELD) {
        Some(Value::Null) | None => None,
        Some(reference) => Some(lookup(table, SHAPE_FIELD, &reference)?),
    };

    let shapes = match params.remove(SHAPES_FIELD) {
        Some(Value::Null) | None => Vec::new(),
        Some(Value::Array(references)) => references
            .iter()
            .map(|reference| lookup(table, SHAPES_FIELD, reference))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ResolveError::MalformedHandle {
                field: SHAPES_FIELD.into(),
            });
        }
    };

    Ok(ResolvedInputs {
        shape,
        shapes,
        params,
    })
}

fn lookup<T>(table: &HandleTable<T>, field: &str, reference: &Value) -> Result<Arc<T>, ResolveError> {
    let handle = Handle::from_reference(reference).ok_or_else(|| ResolveError::MalformedHandle {
        field: field.to_string(),
    })?;
    table.get(&handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OperationIdentity;
    use serde::Deserialize;
    use serde_json::json;

    fn table_with(names: &[&str]) -> (HandleTable<String>, Vec<Handle>) {
        let mut table = HandleTable::new();
        let handles = names
            .iter()
            .map(|name| {
                let identity = OperationIdentity::compute("make", &json!({ "name": name }));
                table.put(&identity, name.to_string())
            })
            .collect();
        (table, handles)
    }

    #[test]
    fn resolves_single_shape_and_keeps_literals() {
        let (table, handles) = table_with(&["a"]);
        let inputs = json!({ "shape": handles[0].to_wire(), "factor": 2.0 });

        let resolved = resolve(&table, &inputs).unwrap();

        assert_eq!(resolved.subject().unwrap(), "a");
        assert!(resolved.shapes.is_empty());
        assert_eq!(resolved.params.get("factor"), Some(&json!(2.0)));
        assert!(!resolved.params.contains_key("shape"));
    }

    #[test]
    fn resolves_shape_list_in_order() {
        let (table, handles) = table_with(&["a", "b", "c"]);
        let inputs = json!({ "shapes": [handles[2].as_str(), handles[0].to_wire(), handles[1].as_str()] });

        let resolved = resolve(&table, &inputs).unwrap();
        let names: Vec<&str> = resolved.shapes.iter().map(|s| s.as_str()).collect();

        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn request_inputs_are_not_mutated() {
        let (table, handles) = table_with(&["a"]);
        let inputs = json!({ "shape": handles[0].as_str() });
        let before = inputs.clone();

        resolve(&table, &inputs).unwrap();

        assert_eq!(inputs, before);
    }

    #[test]
    fn unknown_handle_fails() {
        let (table, _) = table_with(&["a"]);
        let inputs = json!({ "shapes": ["not-a-real-handle"] });

        let err = resolve(&table, &inputs).unwrap_err();
        assert_eq!(err, ResolveError::HandleNotFound(Handle::new("not-a-real-handle")));
    }

    #[test]
    fn malformed_reference_names_the_field() {
        let (table, _) = table_with(&[]);

        let err = resolve(&table, &json!({ "shape": 17 })).unwrap_err();
        assert_eq!(err, ResolveError::MalformedHandle { field: "shape".into() });

        let err = resolve(&table, &json!({ "shapes": "abc" })).unwrap_err();
        assert_eq!(err, ResolveError::MalformedHandle { field: "shapes".into() });
    }

    #[test]
    fn typed_params_and_missing_subject() {
        #[derive(Deserialize)]
        struct Scale {
            factor: f64,
        }

        let (table, _) = table_with(&[]);
        let resolved = resolve(&table, &json!({ "factor": 3 })).unwrap();

        let scale: Scale = resolved.params().unwrap();
        assert_eq!(scale.factor, 3.0);
        assert!(matches!(resolved.subject(), Err(KernelError::InvalidInput(_))));
    }

    #[test]
    fn null_inputs_resolve_empty() {
        let (table, _) = table_with(&[]);
        let resolved = resolve(&table, &Value::Null).unwrap();
        assert!(resolved.shape.is_none());
        assert!(resolved.params.is_empty());
    }
}
