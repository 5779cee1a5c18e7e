/// Construction-time configuration for the octree, the scene and views.
///
/// Every value is fixed once the owning object is built. Out-of-range
/// values are clamped by `sanitized()` with a warning instead of failing.

use glam::Vec3;
use crate::engine_warn;
use crate::math::AABB;
use crate::render::BatchSortMode;

/// Half extent of the default world cube.
pub const DEFAULT_WORLD_HALF_EXTENT: f32 = 1000.0;
/// Deepest subdivision level accepted by `OctreeConfig::sanitized`.
pub const MAX_OCTREE_DEPTH: u32 = 16;

// ============================================================================
// OctreeConfig
// ============================================================================

/// Octree layout and rebalancing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OctreeConfig {
    /// World extent covered by the root octant
    pub world_bounds: AABB,
    /// Levels kept permanently subdivided (never merged)
    pub initial_depth: u32,
    /// Deepest level an octant may reach (root = 0)
    pub max_depth: u32,
    /// Loose bounds = nominal half size × this factor
    pub loose_factor: f32,
    /// An octant holding more drawables than this subdivides
    pub split_threshold: usize,
    /// A subtree holding fewer drawables than this collapses
    pub merge_threshold: usize,
    /// Minimum edge length of a drawable's world box
    pub min_drawable_size: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            world_bounds: AABB::new(
                Vec3::splat(-DEFAULT_WORLD_HALF_EXTENT),
                Vec3::splat(DEFAULT_WORLD_HALF_EXTENT),
            ),
            initial_depth: 2,
            max_depth: 8,
            loose_factor: 2.0,
            split_threshold: 16,
            merge_threshold: 8,
            min_drawable_size: 0.001,
        }
    }
}

impl OctreeConfig {
    /// Copy with every field clamped into its valid range.
    ///
    /// The world bounds are made cubic around their center, since octants
    /// are cubes.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut config = self.clone();

        let size = config.world_bounds.size();
        if !config.world_bounds.is_finite() || size.min_element() <= 0.0 {
            engine_warn!("galaxy3d::OctreeConfig",
                "Degenerate world bounds {:?}, using default extent", config.world_bounds);
            config.world_bounds = defaults.world_bounds;
        } else if size.max_element() != size.min_element() {
            let half = size.max_element() * 0.5;
            config.world_bounds =
                AABB::from_center_half_extents(config.world_bounds.center(), Vec3::splat(half));
        }

        if config.max_depth == 0 || config.max_depth > MAX_OCTREE_DEPTH {
            let clamped = config.max_depth.clamp(1, MAX_OCTREE_DEPTH);
            engine_warn!("galaxy3d::OctreeConfig",
                "max_depth {} out of range, clamped to {}", config.max_depth, clamped);
            config.max_depth = clamped;
        }

        if config.initial_depth == 0 || config.initial_depth > config.max_depth {
            let clamped = config.initial_depth.clamp(1, config.max_depth);
            engine_warn!("galaxy3d::OctreeConfig",
                "initial_depth {} out of range, clamped to {}", config.initial_depth, clamped);
            config.initial_depth = clamped;
        }

        if !(1.0..=4.0).contains(&config.loose_factor) {
            let clamped = if config.loose_factor.is_nan() {
                defaults.loose_factor
            } else {
                config.loose_factor.clamp(1.0, 4.0)
            };
            engine_warn!("galaxy3d::OctreeConfig",
                "loose_factor {} out of range, clamped to {}", config.loose_factor, clamped);
            config.loose_factor = clamped;
        }

        if config.split_threshold < 2 {
            engine_warn!("galaxy3d::OctreeConfig",
                "split_threshold {} too small, using 2", config.split_threshold);
            config.split_threshold = 2;
        }

        if config.merge_threshold >= config.split_threshold {
            let clamped = config.split_threshold / 2;
            engine_warn!("galaxy3d::OctreeConfig",
                "merge_threshold {} must stay below split_threshold {}, using {}",
                config.merge_threshold, config.split_threshold, clamped);
            config.merge_threshold = clamped;
        }

        if !(config.min_drawable_size.is_finite() && config.min_drawable_size > 0.0) {
            engine_warn!("galaxy3d::OctreeConfig",
                "min_drawable_size {} invalid, using {}",
                config.min_drawable_size, defaults.min_drawable_size);
            config.min_drawable_size = defaults.min_drawable_size;
        }

        config
    }
}

// ============================================================================
// SceneConfig
// ============================================================================

/// Scene construction parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneConfig {
    /// Octree layout
    pub octree: OctreeConfig,
    /// Worker threads for the update pass (0 = available parallelism)
    pub worker_threads: usize,
}

// ============================================================================
// ViewConfig
// ============================================================================

/// View preparation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    /// Maximum number of lights handed to the renderer, nearest first
    pub max_lights: usize,
    /// Collect shadow caster queues for shadow-casting lights
    pub shadows: bool,
    /// Merge runs of identical static batches into instanced draws
    pub instancing: bool,
    /// Sort mode of the opaque queue
    pub opaque_sort: BatchSortMode,
    /// Sort mode of the alpha queue
    pub alpha_sort: BatchSortMode,
    /// Drawables per parallel prepare task
    pub prepare_chunk_size: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            max_lights: 255,
            shadows: true,
            instancing: true,
            opaque_sort: BatchSortMode::State,
            alpha_sort: BatchSortMode::BackToFront,
            prepare_chunk_size: 64,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
