/// Axis-Aligned Bounding Box.
///
/// Used everywhere a world-space extent is needed: drawable bounds,
/// octant loose bounds, light volumes. All predicates use closed
/// intervals so that touching boxes count as overlapping.

use glam::{Mat4, Vec3};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner (x, y, z)
    pub min: Vec3,
    /// Maximum corner (x, y, z)
    pub max: Vec3,
}

impl AABB {
    /// Extent used for objects without a finite volume (directional lights).
    pub const HUGE_EXTENT: f32 = 1.0e30;

    /// Create a box from its two corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box from a center and half extents.
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Box covering (practically) all of space.
    pub fn huge() -> Self {
        Self::from_center_half_extents(Vec3::ZERO, Vec3::splat(Self::HUGE_EXTENT))
    }

    /// Smallest box containing all the given points.
    ///
    /// Returns `None` for an empty point set.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = AABB { min: *first, max: *first };
        for p in rest {
            aabb.min = aabb.min.min(*p);
            aabb.max = aabb.max.max(*p);
        }
        Some(aabb)
    }

    /// Compute the center point of this AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full size along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Half size along each axis.
    pub fn half_size(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// True when every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// True when the box has a positive extent on every axis.
    pub fn is_valid(&self) -> bool {
        self.is_finite()
            && self.max.x > self.min.x
            && self.max.y > self.min.y
            && self.max.z > self.min.z
    }

    /// Return a copy whose extent is at least `min_size` on every axis.
    ///
    /// Inverted axes are re-ordered first. Non-finite boxes are returned
    /// unchanged; the caller decides where those go.
    pub fn with_min_size(&self, min_size: f32) -> AABB {
        if !self.is_finite() {
            return *self;
        }
        let lo = self.min.min(self.max);
        let hi = self.min.max(self.max);
        let center = (lo + hi) * 0.5;
        let half = ((hi - lo) * 0.5).max(Vec3::splat(min_size * 0.5));
        AABB::from_center_half_extents(center, half)
    }

    /// Transform this local-space AABB by a matrix, returning a new AABB.
    ///
    /// Uses the Arvo method: projects each matrix axis onto the AABB extents
    /// for an exact (tight) result without transforming all 8 corners.
    pub fn transformed(&self, matrix: &Mat4) -> AABB {
        let translation = matrix.col(3).truncate();
        let mut new_min = translation;
        let mut new_max = translation;

        for i in 0..3 {
            let axis = matrix.col(i).truncate();
            let a = axis * self.min[i];
            let b = axis * self.max[i];
            new_min += a.min(b);
            new_max += a.max(b);
        }

        AABB { min: new_min, max: new_max }
    }

    /// Test if this AABB fully contains another AABB.
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x && self.max.x >= other.max.x
        && self.min.y <= other.min.y && self.max.y >= other.max.y
        && self.min.z <= other.min.z && self.max.z >= other.max.z
    }

    /// Test if a point lies inside or on the surface of this AABB.
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Test if this AABB intersects (overlaps) another AABB.
    ///
    /// Returns `true` if the two AABBs overlap or touch.
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x
        && self.min.y <= other.max.y && self.max.y >= other.min.y
        && self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Squared distance from a point to the closest point of the box (0 inside).
    pub fn distance_squared_to_point(&self, point: Vec3) -> f32 {
        let closest = point.clamp(self.min, self.max);
        closest.distance_squared(point)
    }
}

#[cfg(test)]
#[path = "aabb_tests.rs"]
mod tests;
