/// Drawable: render-facing record of one scene object.
///
/// Drawables live in their own SlotMap, apart from the scene nodes that own
/// them, so the octree update and culling passes touch compact records
/// only. Behaviour that differs per kind (bounds, render preparation, ray
/// tests) dispatches on `DrawableKind`.

use bitflags::bitflags;
use glam::{Mat4, Vec3};
use slotmap::new_key_type;
use crate::camera::Camera;
use crate::math::{AABB, Ray};
use super::light::{Light, LightType};
use super::model::{SkinnedModel, StaticModel};
use super::octree::OctantId;
use super::spatial_node::NodeKey;

new_key_type! {
    /// Stable handle to a Drawable in a Scene.
    pub struct DrawableKey;
}

bitflags! {
    /// Configuration flags of a drawable.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DrawableFlags: u32 {
        /// Renders geometry
        const GEOMETRY           = 1 << 0;
        /// Is a light
        const LIGHT              = 1 << 1;
        /// Not expected to move
        const STATIC             = 1 << 2;
        /// Rendered into shadow maps
        const CAST_SHADOWS       = 1 << 3;
        /// Keep animating while out of view
        const UPDATE_INVISIBLE   = 1 << 4;
        /// At least one geometry has several LOD levels
        const HAS_LOD_LEVELS     = 1 << 5;
        /// Receives a per-frame call from the octree update pass
        const OCTREE_UPDATE_CALL = 1 << 6;
    }
}

/// Octree lifecycle of a drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawableState {
    /// Not in the octree (node disabled, removed, or not yet attached)
    Unattached,
    /// In the octree with up-to-date bounds
    Inserted,
    /// In the octree, bounds to be refreshed by the next update pass
    ReinsertQueued,
}

/// Outcome of `Drawable::prepare_render`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderPrep {
    /// Beyond the max render distance
    OutOfRange,
    /// Within range; `render` is false when there is nothing to draw
    InRange { distance: f32, render: bool },
}

/// Per-kind payload.
#[derive(Debug, Clone)]
pub enum DrawableKind {
    StaticModel(StaticModel),
    SkinnedModel(SkinnedModel),
    Light(Light),
}

impl DrawableKind {
    fn base_flags(&self) -> DrawableFlags {
        match self {
            DrawableKind::StaticModel(model) => {
                let mut flags = DrawableFlags::GEOMETRY;
                flags.set(DrawableFlags::HAS_LOD_LEVELS, model.geometries.has_lod_levels());
                flags
            }
            DrawableKind::SkinnedModel(model) => {
                let mut flags = DrawableFlags::GEOMETRY | DrawableFlags::OCTREE_UPDATE_CALL;
                flags.set(DrawableFlags::HAS_LOD_LEVELS, model.geometries.has_lod_levels());
                flags
            }
            DrawableKind::Light(_) => DrawableFlags::LIGHT,
        }
    }
}

/// Previous frame number, skipping 0 like the frame counter does.
pub fn previous_frame_number(frame_number: u16) -> u16 {
    match frame_number.wrapping_sub(1) {
        0 => u16::MAX,
        previous => previous,
    }
}

/// Render-facing record of one scene object.
#[derive(Debug, Clone)]
pub struct Drawable {
    kind: DrawableKind,
    flags: DrawableFlags,
    owner: NodeKey,
    pub(crate) state: DrawableState,
    pub(crate) octant: Option<OctantId>,
    pub(crate) world_transform: Mat4,
    pub(crate) world_bounds: AABB,
    pub(crate) bounds_dirty: bool,
    pub(crate) last_frame_number: u16,
    pub(crate) last_update_frame_number: u16,
    distance: f32,
    max_distance: f32,
    view_mask: u32,
    opacity: f32,
}

impl Drawable {
    pub(crate) fn new(kind: DrawableKind, owner: NodeKey) -> Self {
        let mut flags = kind.base_flags();
        // Geometry casts shadows by default, lights opt in.
        if flags.contains(DrawableFlags::GEOMETRY) {
            flags |= DrawableFlags::CAST_SHADOWS;
        }
        Self {
            kind,
            flags,
            owner,
            state: DrawableState::Unattached,
            octant: None,
            world_transform: Mat4::IDENTITY,
            world_bounds: AABB::new(Vec3::ZERO, Vec3::ZERO),
            bounds_dirty: true,
            last_frame_number: 0,
            last_update_frame_number: 0,
            distance: 0.0,
            max_distance: 0.0,
            view_mask: u32::MAX,
            opacity: 1.0,
        }
    }

    // ===== ACCESSORS =====

    pub fn kind(&self) -> &DrawableKind {
        &self.kind
    }

    pub fn flags(&self) -> DrawableFlags {
        self.flags
    }

    pub fn test_flag(&self, flag: DrawableFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Node that owns this drawable.
    pub fn owner(&self) -> NodeKey {
        self.owner
    }

    pub fn state(&self) -> DrawableState {
        self.state
    }

    /// Octant currently holding this drawable.
    pub fn octant(&self) -> Option<OctantId> {
        self.octant
    }

    /// World transform copied from the owner at the last refresh.
    pub fn world_transform(&self) -> &Mat4 {
        &self.world_transform
    }

    pub fn world_position(&self) -> Vec3 {
        self.world_transform.w_axis.truncate()
    }

    /// World bounds as of the last update pass.
    pub fn world_bounds(&self) -> &AABB {
        &self.world_bounds
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(DrawableFlags::STATIC)
    }

    pub fn is_light(&self) -> bool {
        self.flags.contains(DrawableFlags::LIGHT)
    }

    pub fn is_geometry(&self) -> bool {
        self.flags.contains(DrawableFlags::GEOMETRY)
    }

    pub fn light(&self) -> Option<&Light> {
        match &self.kind {
            DrawableKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn static_model(&self) -> Option<&StaticModel> {
        match &self.kind {
            DrawableKind::StaticModel(model) => Some(model),
            _ => None,
        }
    }

    pub fn skinned_model(&self) -> Option<&SkinnedModel> {
        match &self.kind {
            DrawableKind::SkinnedModel(model) => Some(model),
            _ => None,
        }
    }

    /// Camera distance from the last render preparation.
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Maximum render distance, 0 = unlimited.
    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn view_mask(&self) -> u32 {
        self.view_mask
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn last_frame_number(&self) -> u16 {
        self.last_frame_number
    }

    pub fn last_update_frame_number(&self) -> u16 {
        self.last_update_frame_number
    }

    /// Whether the drawable was found visible in this frame.
    pub fn in_view(&self, frame_number: u16) -> bool {
        self.last_frame_number == frame_number
    }

    /// Whether the drawable was visible in the frame before this one.
    pub fn was_in_view(&self, frame_number: u16) -> bool {
        self.last_frame_number == previous_frame_number(frame_number)
    }

    // ===== CONFIGURATION =====

    pub fn set_static(&mut self, enable: bool) {
        self.flags.set(DrawableFlags::STATIC, enable);
    }

    pub fn set_cast_shadows(&mut self, enable: bool) {
        self.flags.set(DrawableFlags::CAST_SHADOWS, enable);
    }

    pub fn set_update_invisible(&mut self, enable: bool) {
        self.flags.set(DrawableFlags::UPDATE_INVISIBLE, enable);
    }

    /// Set the maximum render distance. Negative values mean unlimited.
    pub fn set_max_distance(&mut self, distance: f32) {
        self.max_distance = if distance.is_finite() { distance.max(0.0) } else { 0.0 };
    }

    pub fn set_view_mask(&mut self, mask: u32) {
        self.view_mask = mask;
    }

    /// Set opacity in [0, 1]. Fully transparent drawables are not rendered.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() { 0.0 } else { opacity.clamp(0.0, 1.0) };
    }

    /// Replace the local bounding box of a static model.
    /// Returns false for other kinds.
    pub fn set_local_bounding_box(&mut self, bounds: AABB) -> bool {
        match &mut self.kind {
            DrawableKind::StaticModel(model) => {
                model.local_bounds = bounds;
                self.bounds_dirty = true;
                true
            }
            _ => false,
        }
    }

    /// Publish a new model-space bone bounding box for a skinned model.
    /// Returns false for other kinds.
    pub fn set_bone_bounding_box(&mut self, bounds: AABB) -> bool {
        match &mut self.kind {
            DrawableKind::SkinnedModel(model) => {
                if model.bone_bounds != bounds {
                    model.bone_bounds = bounds;
                    self.bounds_dirty = true;
                }
                true
            }
            _ => false,
        }
    }

    /// Set the total animation weight of a skinned model.
    /// Returns false for other kinds.
    pub fn set_animation_weight(&mut self, weight: f32) -> bool {
        match &mut self.kind {
            DrawableKind::SkinnedModel(model) => {
                model.animation_weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
                true
            }
            _ => false,
        }
    }

    /// Mutable light parameters. Bounds are refreshed on the next update.
    pub fn light_mut(&mut self) -> Option<&mut Light> {
        match &mut self.kind {
            DrawableKind::Light(light) => {
                self.bounds_dirty = true;
                Some(light)
            }
            _ => None,
        }
    }

    // ===== FRAME PROCESSING =====

    /// World bounds for the current world transform, clamped to a
    /// minimum size. Pure: safe to call from worker tasks.
    pub fn compute_world_bounds(&self, min_size: f32) -> AABB {
        let bounds = match &self.kind {
            DrawableKind::StaticModel(model) => model.local_bounds.transformed(&self.world_transform),
            DrawableKind::SkinnedModel(model) => model.bone_bounds.transformed(&self.world_transform),
            DrawableKind::Light(light) => light.world_bounds(&self.world_transform),
        };
        bounds.with_min_size(min_size)
    }

    /// Per-frame hook for drawables flagged `OCTREE_UPDATE_CALL`.
    pub(crate) fn on_octree_update(&mut self, frame_number: u16) {
        self.last_update_frame_number = frame_number;
        if let DrawableKind::SkinnedModel(model) = &mut self.kind {
            model.animation_updates += 1;
        }
    }

    /// Whether the update pass should call `on_octree_update` this frame.
    pub(crate) fn needs_octree_update(&self, frame_number: u16) -> bool {
        self.flags.contains(DrawableFlags::OCTREE_UPDATE_CALL)
            && self.state == DrawableState::Inserted
            && (self.flags.contains(DrawableFlags::UPDATE_INVISIBLE) || self.was_in_view(frame_number))
    }

    /// Camera distance used for range culling, LOD and sorting.
    ///
    /// Directional lights are at distance 0, other lights at their
    /// position, geometry at the center of its world bounds.
    pub fn render_distance(&self, camera: &Camera) -> f32 {
        match &self.kind {
            DrawableKind::Light(light) if light.light_type() == LightType::Directional => 0.0,
            DrawableKind::Light(_) => camera.distance(self.world_position()),
            _ => camera.distance(self.world_bounds.center()),
        }
    }

    /// Whether a camera distance is within the max render distance.
    pub fn within_range(&self, distance: f32) -> bool {
        self.max_distance <= 0.0 || distance <= self.max_distance
    }

    /// Whether the drawable has anything to render once in range.
    pub fn has_content(&self) -> bool {
        match &self.kind {
            DrawableKind::StaticModel(model) => self.opacity > 0.0 && !model.geometries.is_empty(),
            DrawableKind::SkinnedModel(model) => {
                self.opacity > 0.0 && model.animation_weight > 0.0 && !model.geometries.is_empty()
            }
            DrawableKind::Light(light) => light.is_lit(),
        }
    }

    /// Record a visible frame: camera distance, frame number and LODs.
    pub(crate) fn commit_render(&mut self, frame_number: u16, distance: f32, lod_bias: f32) {
        self.distance = distance;
        self.last_frame_number = frame_number;
        if self.flags.contains(DrawableFlags::HAS_LOD_LEVELS) {
            let lod_distance = distance * lod_bias;
            match &mut self.kind {
                DrawableKind::StaticModel(model) => model.geometries.select_lods(lod_distance),
                DrawableKind::SkinnedModel(model) => model.geometries.select_lods(lod_distance),
                DrawableKind::Light(_) => {}
            }
        }
    }

    /// Evaluate the drawable for a view without touching it.
    ///
    /// In-range drawables are committed afterwards with `commit_render`,
    /// even when they have nothing to draw.
    pub fn prepare_render(&self, camera: &Camera) -> RenderPrep {
        let distance = self.render_distance(camera);
        if !self.within_range(distance) {
            return RenderPrep::OutOfRange;
        }
        RenderPrep::InRange { distance, render: self.has_content() }
    }

    /// Exact ray test against the drawable's volume.
    ///
    /// Geometry is tested against its world box, point lights against
    /// their range sphere. Directional lights are not pickable.
    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<(f32, Vec3)> {
        let hit = match &self.kind {
            DrawableKind::Light(light) => match light.light_type() {
                LightType::Directional => None,
                LightType::Point => {
                    let sphere = light.world_sphere(&self.world_transform);
                    ray.hit_sphere(&sphere).map(|t| {
                        let normal = (ray.point_at(t) - sphere.center).normalize_or_zero();
                        (t, normal)
                    })
                }
                LightType::Spot => ray.hit_box(&self.world_bounds),
            },
            _ => ray.hit_box(&self.world_bounds),
        };
        hit.filter(|(t, _)| *t <= max_distance)
    }
}

#[cfg(test)]
#[path = "drawable_tests.rs"]
mod tests;
