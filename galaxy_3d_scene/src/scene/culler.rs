/// Camera culling strategies.
///
/// A CameraCuller determines which drawables are visible from a given
/// camera. Implementations range from a linear scan of every drawable to
/// the octree frustum query.

use crate::camera::Camera;
use super::drawable::{DrawableFlags, DrawableKey, DrawableState};
use super::scene::Scene;

/// Strategy for determining visible drawables from a camera.
///
/// Called once per view before render preparation. Drawables must carry
/// every bit of `flags` (empty = any) and share a bit with the camera's
/// view mask. Results are appended to `results`.
///
/// `&mut self` allows stateful implementations (e.g. caching)
/// to maintain state across frames.
pub trait CameraCuller: Send + Sync {
    fn cull(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        flags: DrawableFlags,
        results: &mut Vec<DrawableKey>,
    );
}

/// Brute-force culler: frustum test on every drawable in the octree.
///
/// O(n). Suitable for small scenes or as a baseline for comparison.
#[derive(Debug, Default)]
pub struct BruteForceCuller;

impl BruteForceCuller {
    pub fn new() -> Self {
        Self
    }
}

impl CameraCuller for BruteForceCuller {
    fn cull(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        flags: DrawableFlags,
        results: &mut Vec<DrawableKey>,
    ) {
        let frustum = camera.frustum();
        let view_mask = camera.view_mask();
        results.extend(scene.drawables()
            .filter(|(_, drawable)| {
                drawable.state() != DrawableState::Unattached
                    && drawable.flags().contains(flags)
                    && drawable.view_mask() & view_mask != 0
                    && frustum.intersects_aabb(drawable.world_bounds())
            })
            .map(|(key, _)| key));
    }
}

/// Frustum culler: hierarchical octree query.
///
/// Octants fully inside the frustum are collected without per-drawable
/// tests, octants outside are pruned with their whole subtree.
#[derive(Debug, Default)]
pub struct FrustumCuller;

impl FrustumCuller {
    pub fn new() -> Self {
        Self
    }
}

impl CameraCuller for FrustumCuller {
    fn cull(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        flags: DrawableFlags,
        results: &mut Vec<DrawableKey>,
    ) {
        scene.octree().query_frustum(camera.frustum(), flags, camera.view_mask(), results);
    }
}

#[cfg(test)]
#[path = "culler_tests.rs"]
mod tests;
