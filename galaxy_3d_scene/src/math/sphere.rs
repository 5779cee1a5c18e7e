/// Bounding sphere, used for point-light volumes and sphere queries.

use glam::Vec3;
use super::aabb::AABB;

/// A sphere defined by center and radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center point
    pub center: Vec3,
    /// Radius (non-negative)
    pub radius: f32,
}

impl Sphere {
    /// Create a sphere. Negative radii are clamped to zero.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius: radius.max(0.0) }
    }

    /// Box enclosing the sphere.
    pub fn to_aabb(&self) -> AABB {
        AABB::from_center_half_extents(self.center, Vec3::splat(self.radius))
    }

    /// Test if the sphere overlaps or touches a box.
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        aabb.distance_squared_to_point(self.center) <= self.radius * self.radius
    }
}
