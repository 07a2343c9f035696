//! Small vector and similarity-transform helpers.

pub type Vec3 = [f64; 3];

pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn length(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

/// Unit vector in the direction of `a`, or `None` for a (near) zero vector.
pub fn normalize(a: Vec3) -> Option<Vec3> {
    let len = length(a);
    if len <= f64::EPSILON || !len.is_finite() {
        return None;
    }
    Some(scale(a, 1.0 / len))
}

pub fn is_finite(a: Vec3) -> bool {
    a.iter().all(|c| c.is_finite())
}

/// Rotation + uniform scale + translation.
///
/// `linear` already includes the scale factor; `scale` is kept alongside so
/// volumes and tolerances can be mapped without decomposing the matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    linear: [[f64; 3]; 3],
    translation: Vec3,
    scale: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        linear: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.0, 0.0, 0.0],
        scale: 1.0,
    };

    pub fn translation(offset: Vec3) -> Self {
        Self {
            translation: offset,
            ..Self::IDENTITY
        }
    }

    pub fn uniform_scale(factor: f64) -> Self {
        Self {
            linear: [[factor, 0.0, 0.0], [0.0, factor, 0.0], [0.0, 0.0, factor]],
            translation: [0.0, 0.0, 0.0],
            scale: factor,
        }
    }

    /// Rotation about `axis` (through the origin) by `radians`. Rodrigues' formula.
    pub fn rotation(axis: Vec3, radians: f64) -> Option<Self> {
        let [x, y, z] = normalize(axis)?;
        let (s, c) = radians.sin_cos();
        let t = 1.0 - c;
        Some(Self {
            linear: [
                [t * x * x + c, t * x * y - s * z, t * x * z + s * y],
                [t * x * y + s * z, t * y * y + c, t * y * z - s * x],
                [t * x * z - s * y, t * y * z + s * x, t * z * z + c],
            ],
            translation: [0.0, 0.0, 0.0],
            scale: 1.0,
        })
    }

    /// Rotation taking +Z onto `direction`.
    pub fn align_z(direction: Vec3) -> Option<Self> {
        let dir = normalize(direction)?;
        let z = [0.0, 0.0, 1.0];
        let cos = dot(z, dir);
        if cos > 1.0 - 1e-12 {
            return Some(Self::IDENTITY);
        }
        if cos < -1.0 + 1e-12 {
            return Self::rotation([1.0, 0.0, 0.0], std::f64::consts::PI);
        }
        Self::rotation(cross(z, dir), cos.acos())
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &Transform) -> Transform {
        let mut linear = [[0.0; 3]; 3];
        for (i, row) in linear.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| next.linear[i][k] * self.linear[k][j]).sum();
            }
        }
        Transform {
            linear,
            translation: add(next.apply_vector(self.translation), next.translation),
            scale: self.scale * next.scale,
        }
    }

    pub fn apply_point(&self, p: Vec3) -> Vec3 {
        add(self.apply_vector(p), self.translation)
    }

    pub fn apply_vector(&self, v: Vec3) -> Vec3 {
        [
            dot(self.linear[0], v),
            dot(self.linear[1], v),
            dot(self.linear[2], v),
        ]
    }

    /// Normals only see the rotation part.
    pub fn apply_normal(&self, n: Vec3) -> Vec3 {
        normalize(self.apply_vector(n)).unwrap_or(n)
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
