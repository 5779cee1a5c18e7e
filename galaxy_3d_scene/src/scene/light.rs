/// Light drawable payload and its culling volumes.

use glam::{Mat4, Quat, Vec3};
use crate::camera::{Camera, Frustum};
use crate::math::{AABB, Sphere};
use super::spatial_node::NODE_FORWARD;

/// Half extent of a directional light's shadow volume when no shadow
/// distance is set.
pub const DEFAULT_DIRECTIONAL_SHADOW_EXTENT: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

/// Volume used to gather shadow casters for a light.
#[derive(Debug, Clone, Copy)]
pub enum ShadowVolume {
    Frustum(Frustum),
    Box(AABB),
}

/// Light parameters. Position and direction come from the owning node.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    light_type: LightType,
    color: Vec3,
    range: f32,
    fov: f32,
    shadow_max_distance: f32,
    shadow_map_size: u32,
}

impl Light {
    pub fn new(light_type: LightType) -> Self {
        Self {
            light_type,
            color: Vec3::ONE,
            range: 10.0,
            fov: std::f32::consts::FRAC_PI_6,
            shadow_max_distance: 0.0,
            shadow_map_size: 512,
        }
    }

    pub fn directional() -> Self {
        Self::new(LightType::Directional)
    }

    pub fn point(range: f32) -> Self {
        let mut light = Self::new(LightType::Point);
        light.set_range(range);
        light
    }

    pub fn spot(range: f32, fov: f32) -> Self {
        let mut light = Self::new(LightType::Spot);
        light.set_range(range);
        light.set_fov(fov);
        light
    }

    // ===== ACCESSORS =====

    pub fn light_type(&self) -> LightType {
        self.light_type
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    /// Full spot cone angle in radians.
    pub fn fov(&self) -> f32 {
        self.fov
    }

    /// Distance beyond which shadows fade out, 0 = unlimited.
    pub fn shadow_max_distance(&self) -> f32 {
        self.shadow_max_distance
    }

    pub fn shadow_map_size(&self) -> u32 {
        self.shadow_map_size
    }

    // ===== SETTERS (clamping) =====

    pub fn set_light_type(&mut self, light_type: LightType) {
        self.light_type = light_type;
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = if color.is_finite() { color.max(Vec3::ZERO) } else { Vec3::ZERO };
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = if range.is_finite() { range.max(0.0) } else { 0.0 };
    }

    pub fn set_fov(&mut self, fov: f32) {
        let max_fov = std::f32::consts::PI - 0.01;
        self.fov = if fov.is_finite() { fov.clamp(0.001, max_fov) } else { std::f32::consts::FRAC_PI_6 };
    }

    pub fn set_shadow_max_distance(&mut self, distance: f32) {
        self.shadow_max_distance = if distance.is_finite() { distance.max(0.0) } else { 0.0 };
    }

    /// Set the shadow map size, rounded up to a power of two.
    pub fn set_shadow_map_size(&mut self, size: u32) {
        self.shadow_map_size = size.clamp(1, 1 << 14).next_power_of_two();
    }

    // ===== VOLUMES =====

    /// Whether the light contributes anything.
    pub fn is_lit(&self) -> bool {
        self.color.max_element() > 0.0
            && (self.light_type == LightType::Directional || self.range > 0.0)
    }

    /// World bounds. Directional lights cover everything.
    pub fn world_bounds(&self, world_transform: &Mat4) -> AABB {
        let (position, rotation) = rigid_parts(world_transform);
        match self.light_type {
            LightType::Directional => AABB::huge(),
            LightType::Point => self.world_sphere(world_transform).to_aabb(),
            LightType::Spot => {
                let radius = self.range * (self.fov * 0.5).tan();
                let far = -self.range;
                let corners = [
                    Vec3::ZERO,
                    Vec3::new(-radius, -radius, far),
                    Vec3::new(radius, -radius, far),
                    Vec3::new(-radius, radius, far),
                    Vec3::new(radius, radius, far),
                ];
                let rigid = Mat4::from_rotation_translation(rotation, position);
                AABB::from_points(&corners)
                    .map(|local| local.transformed(&rigid))
                    .unwrap_or_else(|| AABB::new(position, position))
            }
        }
    }

    /// Range sphere around the light position.
    pub fn world_sphere(&self, world_transform: &Mat4) -> Sphere {
        Sphere::new(world_transform.w_axis.truncate(), self.range)
    }

    /// Volume that must contain every caster of this light's shadows.
    pub fn shadow_volume(&self, world_transform: &Mat4, camera: &Camera) -> ShadowVolume {
        let (position, rotation) = rigid_parts(world_transform);
        let direction = rotation * NODE_FORWARD;
        match self.light_type {
            LightType::Point => ShadowVolume::Box(self.world_sphere(world_transform).to_aabb()),
            LightType::Spot => {
                let near = (self.range * 0.01).max(0.01);
                let view = Mat4::look_to_rh(position, direction, up_for(direction));
                let projection = Mat4::perspective_rh(self.fov, 1.0, near, self.range.max(near * 2.0));
                ShadowVolume::Frustum(Frustum::from_view_projection(&(projection * view)))
            }
            LightType::Directional => {
                let extent = if self.shadow_max_distance > 0.0 {
                    self.shadow_max_distance
                } else {
                    DEFAULT_DIRECTIONAL_SHADOW_EXTENT
                };
                let eye = camera.position() - direction * extent * 2.0;
                let view = Mat4::look_to_rh(eye, direction, up_for(direction));
                let projection = Mat4::orthographic_rh(-extent, extent, -extent, extent, 0.0, extent * 4.0);
                ShadowVolume::Frustum(Frustum::from_view_projection(&(projection * view)))
            }
        }
    }
}

/// World position and rotation, ignoring scale.
fn rigid_parts(world_transform: &Mat4) -> (Vec3, Quat) {
    let (_, rotation, position) = world_transform.to_scale_rotation_translation();
    let rotation = if rotation.is_finite() { rotation.normalize() } else { Quat::IDENTITY };
    (position, rotation)
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y }
}
