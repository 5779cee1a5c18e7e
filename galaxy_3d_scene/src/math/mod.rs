//! Geometry value types consumed by the octree and culling passes.
//!
//! Vectors, matrices and quaternions come from `glam`; this module only
//! adds the bounding volumes and the picking ray.

mod aabb;
mod ray;
mod sphere;

pub use aabb::AABB;
pub use ray::Ray;
pub use sphere::Sphere;
