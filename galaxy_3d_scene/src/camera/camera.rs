/// Camera: passive view description consumed by view preparation.
///
/// The camera is not a scene node. The caller owns it and sets the view
/// and projection matrices; the frustum and world position are derived
/// whenever one of them changes.

use glam::{Mat4, Vec3};
use super::frustum::Frustum;

/// View mask that matches every drawable.
pub const VIEW_MASK_ALL: u32 = u32::MAX;

/// Camera used to cull and sort one view.
#[derive(Debug, Clone)]
pub struct Camera {
    view_matrix: Mat4,
    projection_matrix: Mat4,
    frustum: Frustum,
    position: Vec3,
    forward: Vec3,
    view_mask: u32,
    lod_bias: f32,
}

impl Camera {
    /// Create a camera from a view and a projection matrix.
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        let mut camera = Self {
            view_matrix: view,
            projection_matrix: projection,
            frustum: Frustum::from_view_projection(&(projection * view)),
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            view_mask: VIEW_MASK_ALL,
            lod_bias: 1.0,
        };
        camera.update_derived();
        camera
    }

    /// Right-handed perspective camera at `eye` looking at `target`.
    pub fn perspective_look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self::new(
            Mat4::look_at_rh(eye, target, up),
            Mat4::perspective_rh(fov_y, aspect, near, far),
        )
    }

    // ===== GETTERS =====

    /// View matrix (inverse of the camera's world transform).
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    /// Projection matrix (perspective or orthographic).
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    /// Combined view-projection matrix (projection * view).
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    /// Frustum planes for culling.
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit view direction in world space.
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    /// View mask; drawables whose mask shares no bit with it are skipped.
    pub fn view_mask(&self) -> u32 {
        self.view_mask
    }

    /// Multiplier applied to camera distance when selecting LOD levels.
    pub fn lod_bias(&self) -> f32 {
        self.lod_bias
    }

    /// Distance from the camera to a world-space point.
    pub fn distance(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }

    // ===== SETTERS =====

    /// Set the view matrix. Frustum and position follow.
    pub fn set_view(&mut self, matrix: Mat4) {
        self.view_matrix = matrix;
        self.update_derived();
    }

    /// Set the projection matrix. The frustum follows.
    pub fn set_projection(&mut self, matrix: Mat4) {
        self.projection_matrix = matrix;
        self.update_derived();
    }

    /// Override the culling frustum, e.g. with a tighter custom volume.
    pub fn set_frustum(&mut self, frustum: Frustum) {
        self.frustum = frustum;
    }

    /// Set the view mask.
    pub fn set_view_mask(&mut self, mask: u32) {
        self.view_mask = mask;
    }

    /// Set the LOD bias. Non-positive or non-finite values fall back to 1.
    pub fn set_lod_bias(&mut self, bias: f32) {
        self.lod_bias = if bias.is_finite() && bias > 0.0 { bias } else { 1.0 };
    }

    fn update_derived(&mut self) {
        self.frustum = Frustum::from_view_projection(&self.view_projection_matrix());
        let world = self.view_matrix.inverse();
        if world.is_finite() {
            self.position = world.w_axis.truncate();
            self.forward = (-world.z_axis.truncate())
                .try_normalize()
                .unwrap_or(Vec3::NEG_Z);
        }
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
