/// Ray: half-line used for picking.

use glam::{Mat4, Vec3};
use super::aabb::AABB;
use super::sphere::Sphere;

/// A half-line with a normalized direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray. The direction is normalized; a zero direction falls back to -Z.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.try_normalize().unwrap_or(Vec3::NEG_Z),
        }
    }

    /// Build a picking ray from normalized device coordinates (x, y in [-1, 1]).
    ///
    /// Returns `None` if the view-projection matrix is not invertible.
    pub fn from_ndc(view_projection: &Mat4, ndc_x: f32, ndc_y: f32) -> Option<Self> {
        if view_projection.determinant().abs() <= f32::EPSILON {
            return None;
        }
        let inverse = view_projection.inverse();
        let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        let direction = (far - near).try_normalize()?;
        Some(Self { origin: near, direction })
    }

    /// Point at distance `t` along the ray.
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance to the first intersection with a box, 0 if the origin is inside.
    ///
    /// Slab test with closed intervals: grazing a face or edge counts as a hit.
    pub fn hit_distance(&self, aabb: &AABB) -> Option<f32> {
        self.hit_box(aabb).map(|(t, _)| t)
    }

    /// Distance and surface normal of the first box intersection.
    ///
    /// The normal is zero when the origin is inside the box.
    pub fn hit_box(&self, aabb: &AABB) -> Option<(f32, Vec3)> {
        if aabb.contains_point(self.origin) {
            return Some((0.0, Vec3::ZERO));
        }

        let mut t_min = 0.0f32;
        let mut t_max = f32::INFINITY;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let o = self.origin[axis];
            let d = self.direction[axis];
            let lo = aabb.min[axis];
            let hi = aabb.max[axis];

            if d.abs() < 1.0e-12 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let (mut t0, mut t1) = ((lo - o) * inv, (hi - o) * inv);
            let mut face = Vec3::ZERO;
            face[axis] = -d.signum();
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_min {
                t_min = t0;
                normal = face;
            }
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some((t_min, normal))
    }

    /// Distance to the first intersection with a sphere, 0 if the origin is inside.
    pub fn hit_sphere(&self, sphere: &Sphere) -> Option<f32> {
        let offset = self.origin - sphere.center;
        let c = offset.length_squared() - sphere.radius * sphere.radius;
        if c <= 0.0 {
            return Some(0.0);
        }
        let b = offset.dot(self.direction);
        if b > 0.0 {
            return None;
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        Some(-b - discriminant.sqrt())
    }
}
