use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::geometry::{Transform, Vec3};
use crate::shape::{Primitive, Shape, Solid};

pub const DEFAULT_PRECISION: f64 = 0.01;
const MIN_SEGMENTS: usize = 8;
const MAX_SEGMENTS: usize = 512;

/// Flat triangle buffers, ready for upload to a renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub positions: Vec<f64>,
    pub normals: Vec<f64>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex(&self, i: usize) -> Vec3 {
        [self.positions[3 * i], self.positions[3 * i + 1], self.positions[3 * i + 2]]
    }

    /// Iterate triangles as vertex triples.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.vertex(tri[0] as usize),
                self.vertex(tri[1] as usize),
                self.vertex(tri[2] as usize),
            ]
        })
    }

    fn push(&mut self, placement: &Transform, position: Vec3, normal: Vec3) -> u32 {
        let index = self.vertex_count() as u32;
        self.positions.extend(placement.apply_point(position));
        self.normals.extend(placement.apply_normal(normal));
        index
    }

    fn triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend([a, b, c]);
    }
}

/// Segments needed around a circle of `radius` so the chord deviation stays
/// under `precision`.
pub fn segments_for(radius: f64, precision: f64) -> usize {
    if precision >= radius {
        return MIN_SEGMENTS;
    }
    let step = 2.0 * (1.0 - precision / radius).acos();
    ((TAU / step).ceil() as usize).clamp(MIN_SEGMENTS, MAX_SEGMENTS)
}

pub fn tessellate(shape: &Shape, precision: f64) -> MeshData {
    let mut mesh = MeshData::default();
    for solid in shape.solids() {
        tessellate_solid(&mut mesh, solid, precision);
    }
    mesh
}

fn tessellate_solid(mesh: &mut MeshData, solid: &Solid, precision: f64) {
    let t = &solid.placement;
    // Precision is a world-space tolerance; convert it to the local frame.
    let local_precision = precision / t.scale_factor();
    match solid.primitive {
        Primitive::Box {
            width,
            length,
            height,
        } => box_faces(mesh, t, [width / 2.0, length / 2.0, height / 2.0]),
        Primitive::Sphere { radius } => sphere(mesh, t, radius, segments_for(radius, local_precision)),
        Primitive::Cylinder { radius, height } => {
            cylinder(mesh, t, radius, height, segments_for(radius, local_precision))
        }
    }
}

fn box_faces(mesh: &mut MeshData, t: &Transform, half: Vec3) {
    // Each face: normal axis and sign; corners wound counter-clockwise seen from outside.
    for axis in 0..3 {
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        for sign in [1.0, -1.0] {
            let mut normal = [0.0; 3];
            normal[axis] = sign;
            let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
            let mut ids = [0u32; 4];
            for (k, (cu, cv)) in corners.into_iter().enumerate() {
                let mut p = [0.0; 3];
                p[axis] = sign * half[axis];
                p[u] = cu * half[u];
                p[v] = cv * half[v];
                ids[k] = mesh.push(t, p, normal);
            }
            if sign > 0.0 {
                mesh.triangle(ids[0], ids[1], ids[2]);
                mesh.triangle(ids[0], ids[2], ids[3]);
            } else {
                mesh.triangle(ids[0], ids[2], ids[1]);
                mesh.triangle(ids[0], ids[3], ids[2]);
            }
        }
    }
}

fn sphere(mesh: &mut MeshData, t: &Transform, radius: f64, segments: usize) {
    let rings = (segments / 2).max(2);
    let first = mesh.vertex_count() as u32;
    for ring in 0..=rings {
        let phi = PI * ring as f64 / rings as f64;
        let (sin_phi, cos_phi) = phi.sin_cos();
        for seg in 0..=segments {
            let theta = TAU * seg as f64 / segments as f64;
            let (sin_theta, cos_theta) = theta.sin_cos();
            let n = [sin_phi * cos_theta, sin_phi * sin_theta, cos_phi];
            mesh.push(t, [n[0] * radius, n[1] * radius, n[2] * radius], n);
        }
    }
    let stride = (segments + 1) as u32;
    for ring in 0..rings as u32 {
        for seg in 0..segments as u32 {
            let a = first + ring * stride + seg;
            let b = a + stride;
            if ring != 0 {
                mesh.triangle(a, b, a + 1);
            }
            if ring != rings as u32 - 1 {
                mesh.triangle(a + 1, b, b + 1);
            }
        }
    }
}

fn cylinder(mesh: &mut MeshData, t: &Transform, radius: f64, height: f64, segments: usize) {
    let ring = |seg: usize| {
        let theta = TAU * seg as f64 / segments as f64;
        let (s, c) = theta.sin_cos();
        [c, s]
    };

    // Side wall.
    let first = mesh.vertex_count() as u32;
    for seg in 0..=segments {
        let [c, s] = ring(seg);
        let n = [c, s, 0.0];
        mesh.push(t, [c * radius, s * radius, 0.0], n);
        mesh.push(t, [c * radius, s * radius, height], n);
    }
    for seg in 0..segments as u32 {
        let bottom = first + 2 * seg;
        let top = bottom + 1;
        mesh.triangle(bottom, bottom + 2, top);
        mesh.triangle(top, bottom + 2, bottom + 3);
    }

    // Caps.
    for (z, normal_z) in [(0.0, -1.0), (height, 1.0)] {
        let normal = [0.0, 0.0, normal_z];
        let center = mesh.push(t, [0.0, 0.0, z], normal);
        let rim = mesh.vertex_count() as u32;
        for seg in 0..=segments {
            let [c, s] = ring(seg);
            mesh.push(t, [c * radius, s * radius, z], normal);
        }
        for seg in 0..segments as u32 {
            if normal_z > 0.0 {
                mesh.triangle(center, rim + seg, rim + seg + 1);
            } else {
                mesh.triangle(center, rim + seg + 1, rim + seg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{cross, dot, length, sub};

    /// Signed volume via the divergence theorem; positive for outward winding.
    fn signed_volume(mesh: &MeshData) -> f64 {
        mesh.triangles()
            .map(|[a, b, c]| dot(a, cross(b, c)) / 6.0)
            .sum()
    }

    fn unit_box() -> Shape {
        Shape::solid(
            Primitive::Box {
                width: 1.0,
                length: 2.0,
                height: 3.0,
            },
            Transform::IDENTITY,
        )
    }

    #[test]
    fn box_mesh_is_closed_and_outward() {
        let mesh = tessellate(&unit_box(), DEFAULT_PRECISION);

        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        assert!((signed_volume(&mesh) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn sphere_mesh_approaches_volume() {
        let shape = Shape::solid(Primitive::Sphere { radius: 2.0 }, Transform::translation([1.0, 1.0, 1.0]));
        let mesh = tessellate(&shape, 0.001);
        let expected = shape.volume();

        let v = signed_volume(&mesh);
        assert!(v > 0.0);
        assert!((v - expected).abs() / expected < 0.01, "volume {v} vs {expected}");
        for i in 0..mesh.vertex_count() {
            let d = length(sub(mesh.vertex(i), [1.0, 1.0, 1.0]));
            assert!((d - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn cylinder_mesh_is_outward() {
        let shape = Shape::solid(
            Primitive::Cylinder {
                radius: 1.0,
                height: 2.0,
            },
            Transform::IDENTITY,
        );
        let mesh = tessellate(&shape, 0.001);
        let v = signed_volume(&mesh);
        assert!((v - shape.volume()).abs() / shape.volume() < 0.01, "volume {v}");
    }

    #[test]
    fn finer_precision_means_more_segments() {
        assert!(segments_for(1.0, 0.001) > segments_for(1.0, 0.1));
        assert_eq!(segments_for(1.0, 5.0), MIN_SEGMENTS);
        assert_eq!(segments_for(1000.0, 1e-9), MAX_SEGMENTS);
    }

    #[test]
    fn compound_mesh_holds_every_solid() {
        let a = unit_box();
        let b = unit_box().transformed(&Transform::translation([10.0, 0.0, 0.0]));
        let mesh = tessellate(&Shape::compound([&a, &b]), DEFAULT_PRECISION);
        assert_eq!(mesh.triangle_count(), 24);
    }
}
