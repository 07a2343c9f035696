use serde::Deserialize;
use serde_json::json;
use shapeworker_core::{KernelError, KernelOutput, OperationRegistry, RegistryError, ResolvedInputs};

use crate::ShapeKernel;
use crate::geometry::{self, Transform, Vec3};
use crate::shape::{Primitive, Shape};

type OpResult = Result<KernelOutput<Shape>, KernelError>;

pub(crate) fn register(registry: &mut OperationRegistry<ShapeKernel>) -> Result<(), RegistryError> {
    registry.register("shapes.solid.createBox", create_box)?;
    registry.register("shapes.solid.createCube", create_cube)?;
    registry.register("shapes.solid.createSphere", create_sphere)?;
    registry.register("shapes.solid.createCylinder", create_cylinder)?;
    registry.register("shapes.compound.makeCompound", make_compound)?;
    registry.register("transforms.translate", translate)?;
    registry.register("transforms.rotate", rotate)?;
    registry.register("transforms.scale", scale)?;
    registry.register("shapes.solid.getSolidVolume", solid_volume)?;
    registry.register("operations.boundingBox", bounding_box)?;
    Ok(())
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BoxInputs {
    width: f64,
    length: f64,
    height: f64,
    #[serde(default)]
    center: Vec3,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CubeInputs {
    size: f64,
    #[serde(default)]
    center: Vec3,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SphereInputs {
    radius: f64,
    #[serde(default)]
    center: Vec3,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CylinderInputs {
    radius: f64,
    height: f64,
    #[serde(default)]
    center: Vec3,
    #[serde(default = "default_direction")]
    direction: Vec3,
}

fn default_direction() -> Vec3 {
    [0.0, 1.0, 0.0]
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TranslateInputs {
    translation: Vec3,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RotateInputs {
    axis: Vec3,
    /// Degrees.
    angle: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScaleInputs {
    factor: f64,
}

fn positive(name: &str, value: f64) -> Result<f64, KernelError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(KernelError::Geometry(format!("{name} must be a positive finite number, got {value}")))
    }
}

fn finite_point(name: &str, p: Vec3) -> Result<Vec3, KernelError> {
    if geometry::is_finite(p) {
        Ok(p)
    } else {
        Err(KernelError::InvalidInput(format!("{name} must be finite")))
    }
}

fn no_literals(inputs: &ResolvedInputs<Shape>) -> Result<(), KernelError> {
    match inputs.params.keys().next() {
        Some(key) => Err(KernelError::InvalidInput(format!("unknown field `{key}`"))),
        None => Ok(()),
    }
}

fn create_box(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    let p: BoxInputs = inputs.params()?;
    let primitive = Primitive::Box {
        width: positive("width", p.width)?,
        length: positive("length", p.length)?,
        height: positive("height", p.height)?,
    };
    let center = finite_point("center", p.center)?;
    Ok(KernelOutput::Object(Shape::solid(primitive, Transform::translation(center))))
}

fn create_cube(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    let p: CubeInputs = inputs.params()?;
    let size = positive("size", p.size)?;
    let primitive = Primitive::Box {
        width: size,
        length: size,
        height: size,
    };
    let center = finite_point("center", p.center)?;
    Ok(KernelOutput::Object(Shape::solid(primitive, Transform::translation(center))))
}

fn create_sphere(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    let p: SphereInputs = inputs.params()?;
    let primitive = Primitive::Sphere {
        radius: positive("radius", p.radius)?,
    };
    let center = finite_point("center", p.center)?;
    Ok(KernelOutput::Object(Shape::solid(primitive, Transform::translation(center))))
}

fn create_cylinder(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    let p: CylinderInputs = inputs.params()?;
    let height = positive("height", p.height)?;
    let primitive = Primitive::Cylinder {
        radius: positive("radius", p.radius)?,
        height,
    };
    let center = finite_point("center", p.center)?;
    let orient = Transform::align_z(p.direction)
        .ok_or_else(|| KernelError::Geometry("direction must be a non-zero vector".into()))?;
    // The primitive starts at its base disc; shift it so its mid-height sits on `center`.
    let placement = Transform::translation([0.0, 0.0, -height / 2.0])
        .then(&orient)
        .then(&Transform::translation(center));
    Ok(KernelOutput::Object(Shape::solid(primitive, placement)))
}

fn make_compound(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    no_literals(&inputs)?;
    if inputs.shapes.is_empty() {
        return Err(KernelError::InvalidInput("compound needs at least one shape".into()));
    }
    let compound = Shape::compound(inputs.shapes.iter().map(|s| s.as_ref()));
    Ok(KernelOutput::Object(compound))
}

fn translate(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    let p: TranslateInputs = inputs.params()?;
    let offset = finite_point("translation", p.translation)?;
    let shape = inputs.subject()?;
    Ok(KernelOutput::Object(shape.transformed(&Transform::translation(offset))))
}

fn rotate(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    let p: RotateInputs = inputs.params()?;
    if !p.angle.is_finite() {
        return Err(KernelError::InvalidInput("angle must be finite".into()));
    }
    let rotation = Transform::rotation(finite_point("axis", p.axis)?, p.angle.to_radians())
        .ok_or_else(|| KernelError::Geometry("rotation axis must be a non-zero vector".into()))?;
    let shape = inputs.subject()?;
    Ok(KernelOutput::Object(shape.transformed(&rotation)))
}

fn scale(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    let p: ScaleInputs = inputs.params()?;
    let factor = positive("factor", p.factor)?;
    let shape = inputs.subject()?;
    Ok(KernelOutput::Object(shape.transformed(&Transform::uniform_scale(factor))))
}

fn solid_volume(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    no_literals(&inputs)?;
    let shape = inputs.subject()?;
    Ok(KernelOutput::Value(json!(shape.volume())))
}

fn bounding_box(_: &ShapeKernel, inputs: ResolvedInputs<Shape>) -> OpResult {
    no_literals(&inputs)?;
    let bounds = inputs.subject()?.bounds();
    Ok(KernelOutput::Value(json!({
        "min": bounds.min,
        "max": bounds.max,
        "center": bounds.center(),
        "size": bounds.size(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shapeworker_core::{HandleTable, OperationIdentity, resolve};
    use std::sync::Arc;

    fn registry() -> OperationRegistry<ShapeKernel> {
        OperationRegistry::for_kernel().unwrap()
    }

    fn run(name: &str, inputs: Value, table: &HandleTable<Shape>) -> OpResult {
        let handler = registry().get(name).unwrap();
        handler(&ShapeKernel::default(), resolve(table, &inputs).unwrap())
    }

    fn object(result: OpResult) -> Shape {
        match result.unwrap() {
            KernelOutput::Object(shape) => shape,
            KernelOutput::Value(v) => panic!("expected shape, got {v}"),
        }
    }

    fn value(result: OpResult) -> Value {
        match result.unwrap() {
            KernelOutput::Value(v) => v,
            KernelOutput::Object(_) => panic!("expected value"),
        }
    }

    fn store(table: &mut HandleTable<Shape>, name: &str, inputs: Value) -> String {
        let shape = object(run(name, inputs.clone(), table));
        table
            .put(&OperationIdentity::compute(name, &inputs), shape)
            .to_string()
    }

    #[test]
    fn registers_all_operations() {
        assert_eq!(registry().len(), 10);
    }

    #[test]
    fn cube_volume_through_handles() {
        let mut table = HandleTable::new();
        let cube = store(&mut table, "shapes.solid.createCube", json!({ "size": 2 }));

        let volume = value(run("shapes.solid.getSolidVolume", json!({ "shape": cube }), &table));
        assert_eq!(volume, json!(8.0));
    }

    #[test]
    fn translate_moves_bounds() {
        let mut table = HandleTable::new();
        let cube = store(&mut table, "shapes.solid.createCube", json!({ "size": 2 }));
        let moved = store(
            &mut table,
            "transforms.translate",
            json!({ "shape": cube, "translation": [10, 0, 0] }),
        );

        let bounds = value(run("operations.boundingBox", json!({ "shape": moved }), &table));
        assert_eq!(bounds["min"], json!([9.0, -1.0, -1.0]));
        assert_eq!(bounds["center"], json!([10.0, 0.0, 0.0]));
    }

    #[test]
    fn compound_requires_shapes() {
        let table = HandleTable::new();
        let err = run("shapes.compound.makeCompound", json!({ "shapes": [] }), &table).unwrap_err();
        assert!(matches!(err, KernelError::InvalidInput(_)));
    }

    #[test]
    fn compound_joins_inputs() {
        let mut table = HandleTable::new();
        let a = store(&mut table, "shapes.solid.createSphere", json!({ "radius": 1 }));
        let b = store(&mut table, "shapes.solid.createCube", json!({ "size": 1, "center": [5, 0, 0] }));

        let compound = object(run("shapes.compound.makeCompound", json!({ "shapes": [a, b] }), &table));
        assert_eq!(compound.solids().len(), 2);
    }

    #[test]
    fn degenerate_inputs_fail() {
        let mut table = HandleTable::new();
        let cube = store(&mut table, "shapes.solid.createCube", json!({ "size": 1 }));

        let cases = [
            ("shapes.solid.createBox", json!({ "width": -1, "length": 1, "height": 1 })),
            ("shapes.solid.createSphere", json!({ "radius": 0 })),
            ("shapes.solid.createCylinder", json!({ "radius": 1, "height": 1, "direction": [0, 0, 0] })),
            ("transforms.scale", json!({ "shape": cube, "factor": 0 })),
            ("transforms.rotate", json!({ "shape": cube, "axis": [0, 0, 0], "angle": 90 })),
        ];
        for (name, inputs) in cases {
            let err = run(name, inputs, &table).unwrap_err();
            assert!(matches!(err, KernelError::Geometry(_)), "{name}: {err}");
        }
    }

    #[test]
    fn malformed_literals_fail() {
        let table = HandleTable::new();

        let err = run("shapes.solid.createBox", json!({ "width": 1 }), &table).unwrap_err();
        assert!(matches!(err, KernelError::InvalidInput(_)));

        let err = run("shapes.solid.createCube", json!({ "size": 1, "colour": "red" }), &table).unwrap_err();
        assert!(matches!(err, KernelError::InvalidInput(_)));

        let err = run("transforms.scale", json!({ "factor": 2 }), &table).unwrap_err();
        assert!(matches!(err, KernelError::InvalidInput(_)));
    }

    #[test]
    fn rotation_turns_cylinder_axis() {
        let mut table = HandleTable::new();
        let cyl = store(
            &mut table,
            "shapes.solid.createCylinder",
            json!({ "radius": 1, "height": 4, "direction": [0, 0, 1] }),
        );
        let turned = store(
            &mut table,
            "transforms.rotate",
            json!({ "shape": cyl, "axis": [0, 1, 0], "angle": 90 }),
        );

        let shape: Arc<Shape> = table.get(&shapeworker_core::Handle::new(turned)).unwrap();
        let size = shape.bounds().size();
        assert!((size[0] - 4.0).abs() < 1e-9);
        assert!((size[2] - 2.0).abs() < 1e-9);
        assert!(shape.bounds().center().iter().all(|c| c.abs() < 1e-9));
    }

    #[test]
    fn cylinder_is_centred_on_center() {
        let mut table = HandleTable::new();
        let at_origin = store(
            &mut table,
            "shapes.solid.createCylinder",
            json!({ "radius": 1, "height": 4, "direction": [0, 0, 1] }),
        );
        let bounds = value(run("operations.boundingBox", json!({ "shape": at_origin }), &table));
        assert_eq!(bounds["min"], json!([-1.0, -1.0, -2.0]));
        assert_eq!(bounds["max"], json!([1.0, 1.0, 2.0]));

        let offset = store(
            &mut table,
            "shapes.solid.createCylinder",
            json!({ "radius": 1, "height": 4, "center": [3, 0, 0] }),
        );
        let bounds = value(run("operations.boundingBox", json!({ "shape": offset }), &table));
        let center: Vec<f64> = serde_json::from_value(bounds["center"].clone()).unwrap();
        assert!((center[0] - 3.0).abs() < 1e-9);
        assert!(center[1].abs() < 1e-9 && center[2].abs() < 1e-9);
        let size: Vec<f64> = serde_json::from_value(bounds["size"].clone()).unwrap();
        assert!((size[1] - 4.0).abs() < 1e-9);
    }
}
