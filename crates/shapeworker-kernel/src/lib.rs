//! Reference geometry kernel for the shapeworker proxy.
//!
//! Shapes are analytic primitives (box, sphere, cylinder) under similarity
//! transforms, grouped into compounds. This is enough geometry to drive the
//! proxy end to end: handle-producing operations, value-returning queries,
//! tessellation and STL export.

pub mod geometry;
pub mod mesh;
mod operations;
pub mod shape;
pub mod stl;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use shapeworker_core::{Kernel, KernelError, OperationRegistry, RegistryError};

pub use mesh::{DEFAULT_PRECISION, MeshData};
pub use shape::{BoundingBox, Primitive, Shape};

/// Kernel adapter over the reference shape model.
#[derive(Debug, Clone)]
pub struct ShapeKernel {
    default_precision: f64,
}

impl ShapeKernel {
    pub fn new(default_precision: f64) -> Self {
        Self { default_precision }
    }

    fn precision(&self, requested: Option<f64>) -> Result<f64, KernelError> {
        match requested {
            None => Ok(self.default_precision),
            Some(p) if p.is_finite() && p > 0.0 => Ok(p),
            Some(p) => Err(KernelError::InvalidInput(format!(
                "precision must be a positive finite number, got {p}"
            ))),
        }
    }
}

impl Default for ShapeKernel {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MeshParams {
    precision: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ExportParams {
    file_name: Option<String>,
    precision: Option<f64>,
}

fn parse<P: for<'de> Deserialize<'de>>(params: &Map<String, Value>) -> Result<P, KernelError> {
    Ok(serde_json::from_value(Value::Object(params.clone()))?)
}

impl Kernel for ShapeKernel {
    type Object = Shape;

    fn register_operations(registry: &mut OperationRegistry<Self>) -> Result<(), RegistryError> {
        operations::register(registry)
    }

    fn tessellate(&self, object: &Shape, params: &Map<String, Value>) -> Result<Value, KernelError> {
        let p: MeshParams = parse(params)?;
        let precision = self.precision(p.precision)?;
        let mesh = mesh::tessellate(object, precision);
        tracing::debug!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            precision,
            "Shape tessellated"
        );
        Ok(serde_json::to_value(mesh)?)
    }

    fn export(&self, object: &Shape, params: &Map<String, Value>) -> Result<Value, KernelError> {
        let p: ExportParams = parse(params)?;
        let precision = self.precision(p.precision)?;
        let file_name = p.file_name.unwrap_or_else(|| "shape.stl".into());
        let solid_name = file_name.strip_suffix(".stl").unwrap_or(&file_name);
        let content = stl::to_ascii_stl(solid_name, &mesh::tessellate(object, precision));
        Ok(json!({ "fileName": file_name, "content": content }))
    }
}
