use std::fmt;

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

/// Fields whose values are handle references rather than literals.
pub const SHAPE_FIELD: &str = "shape";
pub const SHAPES_FIELD: &str = "shapes";

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Cache key for one kernel call: a SHA-256 digest over the operation name
/// and the canonical encoding of its inputs.
///
/// Canonical encoding rules:
/// - object keys are sorted, arrays keep their order
/// - `null` inputs encode as `{}`; a `null` `shape` and a `null` or empty
///   `shapes` are dropped
/// - `shape` / `shapes` references are reduced to the bare handle hash, so the
///   string and `{hash, type}` forms of the same handle are equal
/// - floats with an integral value are encoded as integers, `-0.0` as `0`
/// - all other floats use their shortest round-trip form; no rounding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationIdentity {
    digest: String,
}

impl OperationIdentity {
    pub fn compute(function_name: &str, inputs: &Value) -> Self {
        let canonical = canonical_encoding(inputs);
        let mut hasher = Sha256::new();
        hasher.update(function_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        Self {
            digest: hex::encode(hasher.finalize()),
        }
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for OperationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

/// Deterministic text form of a request's inputs. Independent of the
/// key order the host happened to serialize.
pub fn canonical_encoding(inputs: &Value) -> String {
    let mut out = String::new();
    match inputs {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .iter()
                .filter(|(key, value)| !is_absent_reference(key, value))
                .map(|(key, _)| key)
                .collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(&mut out, key);
                out.push(':');
                let value = &map[key.as_str()];
                match key.as_str() {
                    SHAPE_FIELD => write_value(&mut out, &handle_reference(value)),
                    SHAPES_FIELD => write_value(&mut out, &handle_references(value)),
                    _ => write_value(&mut out, value),
                }
            }
            out.push('}');
        }
        Value::Null => out.push_str("{}"),
        other => write_value(&mut out, other),
    }
    out
}

/// A `shape` / `shapes` field that resolves to nothing, same as leaving it out.
fn is_absent_reference(key: &str, value: &Value) -> bool {
    match (key, value) {
        (SHAPE_FIELD | SHAPES_FIELD, Value::Null) => true,
        (SHAPES_FIELD, Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn handle_reference(value: &Value) -> Value {
    match value {
        Value::Object(map) => match map.get("hash") {
            Some(Value::String(hash)) => Value::String(hash.clone()),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

fn handle_references(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(handle_reference).collect()),
        other => other.clone(),
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key.as_str()]);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // Serializing a str cannot fail.
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}

fn canonical_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f == 0.0 => "0".into(),
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}
