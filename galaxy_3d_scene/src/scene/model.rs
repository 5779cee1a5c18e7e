/// Geometry-carrying drawable payloads: static and skinned models.
///
/// Both hold a list of geometries, each with its LOD chain and material.
/// The selected LOD per geometry is refreshed during view preparation
/// from the camera distance scaled by the camera's LOD bias.

use std::sync::Arc;
use crate::math::AABB;
use crate::render::{GeometryId, Material};

// ===== LOD =====

/// One level of detail of a geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodLevel {
    /// Geometry drawn at this level
    pub geometry: GeometryId,
    /// Scaled camera distance from which this level is used
    pub distance: f32,
}

/// One geometry slot of a model: LOD chain plus material.
#[derive(Debug, Clone)]
pub struct ModelGeometry {
    lod_levels: Vec<LodLevel>,
    material: Arc<Material>,
}

impl ModelGeometry {
    /// Create a geometry slot with a single LOD level.
    pub fn new(geometry: GeometryId, material: Arc<Material>) -> Self {
        Self {
            lod_levels: vec![LodLevel { geometry, distance: 0.0 }],
            material,
        }
    }

    /// Builder: add a coarser level used from `distance` on.
    ///
    /// Levels stay sorted by distance. Negative or non-finite distances
    /// are ignored.
    pub fn with_lod(mut self, geometry: GeometryId, distance: f32) -> Self {
        if distance.is_finite() && distance >= 0.0 {
            let at = self.lod_levels.partition_point(|level| level.distance <= distance);
            self.lod_levels.insert(at, LodLevel { geometry, distance });
        }
        self
    }

    pub fn lod_levels(&self) -> &[LodLevel] {
        &self.lod_levels
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    pub fn set_material(&mut self, material: Arc<Material>) {
        self.material = material;
    }

    /// Index of the level for a scaled camera distance: the last level
    /// whose start distance is not beyond it.
    pub fn select_lod(&self, lod_distance: f32) -> usize {
        self.lod_levels
            .partition_point(|level| level.distance <= lod_distance)
            .saturating_sub(1)
    }

    /// Geometry of a level, clamped to the coarsest one.
    pub fn geometry_at(&self, lod: usize) -> GeometryId {
        let index = lod.min(self.lod_levels.len().saturating_sub(1));
        self.lod_levels[index].geometry
    }
}

/// Geometry slots with their currently selected LOD levels.
#[derive(Debug, Clone, Default)]
pub struct GeometryList {
    geometries: Vec<ModelGeometry>,
    selected: Vec<usize>,
}

impl GeometryList {
    pub fn push(&mut self, geometry: ModelGeometry) {
        self.geometries.push(geometry);
        self.selected.push(0);
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ModelGeometry> {
        self.geometries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelGeometry> {
        self.geometries.iter()
    }

    /// Whether any slot has more than one level.
    pub fn has_lod_levels(&self) -> bool {
        self.geometries.iter().any(|g| g.lod_levels.len() > 1)
    }

    /// Selected level of a slot.
    pub fn selected_lod(&self, index: usize) -> usize {
        self.selected.get(index).copied().unwrap_or(0)
    }

    /// Geometry to draw for a slot at its selected level.
    pub fn current_geometry(&self, index: usize) -> Option<GeometryId> {
        self.geometries.get(index).map(|g| g.geometry_at(self.selected_lod(index)))
    }

    pub(crate) fn select_lods(&mut self, lod_distance: f32) {
        for (selected, geometry) in self.selected.iter_mut().zip(&self.geometries) {
            *selected = geometry.select_lod(lod_distance);
        }
    }
}

// ===== STATIC MODEL =====

/// Model drawn with a plain world transform. Eligible for instancing.
#[derive(Debug, Clone)]
pub struct StaticModel {
    pub(crate) geometries: GeometryList,
    pub(crate) local_bounds: AABB,
}

impl StaticModel {
    /// Create a model with a local-space bounding box and no geometry.
    pub fn new(local_bounds: AABB) -> Self {
        Self {
            geometries: GeometryList::default(),
            local_bounds,
        }
    }

    /// Builder: append a geometry slot.
    pub fn with_geometry(mut self, geometry: ModelGeometry) -> Self {
        self.geometries.push(geometry);
        self
    }

    pub fn geometries(&self) -> &GeometryList {
        &self.geometries
    }

    pub fn local_bounds(&self) -> &AABB {
        &self.local_bounds
    }
}

// ===== SKINNED MODEL =====

/// Animated model. Always drawn as complex batches; its bounds follow the
/// bone bounding box published by the external animation system.
#[derive(Debug, Clone)]
pub struct SkinnedModel {
    pub(crate) geometries: GeometryList,
    pub(crate) bone_bounds: AABB,
    pub(crate) animation_weight: f32,
    pub(crate) animation_updates: u64,
}

impl SkinnedModel {
    /// Create a skinned model with its model-space bone bounding box.
    pub fn new(bone_bounds: AABB) -> Self {
        Self {
            geometries: GeometryList::default(),
            bone_bounds,
            animation_weight: 1.0,
            animation_updates: 0,
        }
    }

    /// Builder: append a geometry slot.
    pub fn with_geometry(mut self, geometry: ModelGeometry) -> Self {
        self.geometries.push(geometry);
        self
    }

    pub fn geometries(&self) -> &GeometryList {
        &self.geometries
    }

    /// Model-space box around all bones.
    pub fn bone_bounds(&self) -> &AABB {
        &self.bone_bounds
    }

    /// Total weight of the active animations. Zero means nothing to draw.
    pub fn animation_weight(&self) -> f32 {
        self.animation_weight
    }

    /// Number of per-frame octree update calls received.
    pub fn animation_updates(&self) -> u64 {
        self.animation_updates
    }
}
