//! Camera module: frustum and passive camera.
//!
//! Cameras are owned and driven by the caller; the scene never stores them.

mod camera;
mod frustum;

pub use camera::{Camera, VIEW_MASK_ALL};
pub use frustum::{
    Frustum, FrustumTest,
    PLANE_LEFT, PLANE_RIGHT, PLANE_BOTTOM, PLANE_TOP, PLANE_NEAR, PLANE_FAR,
};
