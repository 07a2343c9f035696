use std::f64::consts::PI;

use serde::Serialize;

use crate::geometry::{self, Transform, Vec3};

/// Analytic solid in its local frame.
///
/// - box: centered on the origin
/// - sphere: centered on the origin
/// - cylinder: base disc centered on the origin, extruded along +Z
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Box { width: f64, length: f64, height: f64 },
    Sphere { radius: f64 },
    Cylinder { radius: f64, height: f64 },
}

impl Primitive {
    fn volume(&self) -> f64 {
        match *self {
            Primitive::Box {
                width,
                length,
                height,
            } => width * length * height,
            Primitive::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Primitive::Cylinder { radius, height } => PI * radius * radius * height,
        }
    }
}

/// A primitive placed in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solid {
    pub primitive: Primitive,
    pub placement: Transform,
}

impl Solid {
    pub fn new(primitive: Primitive, placement: Transform) -> Self {
        Self {
            primitive,
            placement,
        }
    }

    pub fn volume(&self) -> f64 {
        self.primitive.volume() * self.placement.scale_factor().powi(3)
    }

    pub fn bounds(&self) -> BoundingBox {
        let t = &self.placement;
        match self.primitive {
            Primitive::Box {
                width,
                length,
                height,
            } => {
                let (hx, hy, hz) = (width / 2.0, length / 2.0, height / 2.0);
                let mut bounds = BoundingBox::empty();
                for sx in [-hx, hx] {
                    for sy in [-hy, hy] {
                        for sz in [-hz, hz] {
                            bounds.include(t.apply_point([sx, sy, sz]));
                        }
                    }
                }
                bounds
            }
            Primitive::Sphere { radius } => {
                let center = t.apply_point([0.0, 0.0, 0.0]);
                let r = radius * t.scale_factor();
                BoundingBox {
                    min: geometry::sub(center, [r, r, r]),
                    max: geometry::add(center, [r, r, r]),
                }
            }
            Primitive::Cylinder { radius, height } => {
                let base = t.apply_point([0.0, 0.0, 0.0]);
                let top = t.apply_point([0.0, 0.0, height]);
                let axis = t.apply_normal([0.0, 0.0, 1.0]);
                let r = radius * t.scale_factor();
                // Extent of a disc of radius r with unit normal a along world axis i.
                let extent: Vec3 = std::array::from_fn(|i| r * (1.0 - axis[i] * axis[i]).max(0.0).sqrt());
                let mut bounds = BoundingBox::empty();
                for center in [base, top] {
                    bounds.include(geometry::sub(center, extent));
                    bounds.include(geometry::add(center, extent));
                }
                bounds
            }
        }
    }
}

/// The kernel object behind a handle: one or more placed solids.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    solids: Vec<Solid>,
}

impl Shape {
    pub fn solid(primitive: Primitive, placement: Transform) -> Self {
        Self {
            solids: vec![Solid::new(primitive, placement)],
        }
    }

    /// Group several shapes without merging their geometry.
    pub fn compound<'a>(parts: impl IntoIterator<Item = &'a Shape>) -> Self {
        Self {
            solids: parts
                .into_iter()
                .flat_map(|shape| shape.solids.iter().copied())
                .collect(),
        }
    }

    pub fn solids(&self) -> &[Solid] {
        &self.solids
    }

    pub fn transformed(&self, transform: &Transform) -> Self {
        Self {
            solids: self
                .solids
                .iter()
                .map(|s| Solid::new(s.primitive, s.placement.then(transform)))
                .collect(),
        }
    }

    /// Sum of solid volumes. Overlaps inside a compound are counted twice.
    pub fn volume(&self) -> f64 {
        self.solids.iter().map(Solid::volume).sum()
    }

    pub fn bounds(&self) -> BoundingBox {
        self.solids
            .iter()
            .map(Solid::bounds)
            .fold(BoundingBox::empty(), |acc, b| acc.union(&b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn include(&mut self, p: Vec3) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut out = *self;
        out.include(other.min);
        out.include(other.max);
        out
    }

    pub fn center(&self) -> Vec3 {
        geometry::scale(geometry::add(self.min, self.max), 0.5)
    }

    pub fn size(&self) -> Vec3 {
        geometry::sub(self.max, self.min)
    }
}
