/// View preparation: culling results turned into sorted batch queues.
///
/// `ViewPreparer::prepare_view` runs once per camera per frame, after the
/// update pass. Visible drawables are evaluated in parallel chunks that
/// only read the scene; the resulting render state (frame number, distance,
/// LOD levels) is committed on the calling thread afterwards, in culling
/// order, so the produced queues do not depend on the worker count.
///
/// The returned RenderView is ephemeral: it lives for one frame and is
/// consumed by a Drawer.

use slotmap::SlotMap;
use crate::camera::Camera;
use crate::config::ViewConfig;
use crate::error::Result;
use crate::render::{Batch, BatchQueue, BatchSortMode, PassType};
use crate::utils::TaskPool;
use crate::{engine_debug, engine_trace};
use super::culler::CameraCuller;
use super::drawable::{Drawable, DrawableFlags, DrawableKey, DrawableKind, RenderPrep};
use super::light::ShadowVolume;
use super::scene::Scene;

// ===== RENDER VIEW =====

/// A light found visible by view preparation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleLight {
    pub drawable: DrawableKey,
    /// Camera distance (0 for directional lights)
    pub distance: f32,
    /// Index into `RenderView::shadow_views` if the light casts shadows
    pub shadow_view: Option<usize>,
}

/// Shadow casters of one light.
#[derive(Debug, Clone)]
pub struct ShadowView {
    pub light: DrawableKey,
    /// Volume the casters were gathered from
    pub volume: ShadowVolume,
    /// Caster drawables with content, in query order
    pub casters: Vec<DrawableKey>,
    /// Shadow pass batches, sorted by state
    pub queue: BatchQueue,
}

/// Result of view preparation. Ephemeral: lives for one frame.
#[derive(Debug, Clone)]
pub struct RenderView {
    camera: Camera,
    frame_number: u16,
    geometries: Vec<DrawableKey>,
    lights: Vec<VisibleLight>,
    opaque: BatchQueue,
    alpha: BatchQueue,
    shadow_views: Vec<ShadowView>,
    cull_occluded: bool,
    time_step: f32,
}

impl RenderView {
    /// Camera snapshot at preparation time.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn frame_number(&self) -> u16 {
        self.frame_number
    }

    /// Visible geometry drawables that produced batches, in culling order.
    pub fn geometries(&self) -> &[DrawableKey] {
        &self.geometries
    }

    /// Visible lights, nearest first, capped at `ViewConfig::max_lights`.
    pub fn lights(&self) -> &[VisibleLight] {
        &self.lights
    }

    pub fn opaque_queue(&self) -> &BatchQueue {
        &self.opaque
    }

    pub fn alpha_queue(&self) -> &BatchQueue {
        &self.alpha
    }

    pub fn shadow_views(&self) -> &[ShadowView] {
        &self.shadow_views
    }

    /// Whether the renderer was asked to run occlusion culling for this view.
    pub fn cull_occluded(&self) -> bool {
        self.cull_occluded
    }

    /// Frame time step handed to preparation.
    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    /// Total number of batches over every queue.
    pub fn batch_count(&self) -> usize {
        self.opaque.len()
            + self.alpha.len()
            + self.shadow_views.iter().map(|view| view.queue.len()).sum::<usize>()
    }
}

// ===== CHUNK EVALUATION =====

/// Output of one parallel evaluation task.
#[derive(Default)]
struct ChunkResult {
    /// In-range drawables to commit, with their camera distance
    visible: Vec<(DrawableKey, f32)>,
    geometries: Vec<DrawableKey>,
    lights: Vec<VisibleLight>,
    opaque: Vec<Batch>,
    alpha: Vec<Batch>,
}

/// Append the batches of a geometry drawable for one pass type.
///
/// LOD levels are picked from the distance directly, matching what
/// `Drawable::commit_render` selects.
fn push_batches(
    key: DrawableKey,
    drawable: &Drawable,
    pass_type: PassType,
    distance: f32,
    lod_bias: f32,
    out: &mut Vec<Batch>,
) {
    let (geometries, complex) = match drawable.kind() {
        DrawableKind::StaticModel(model) => (model.geometries(), false),
        DrawableKind::SkinnedModel(model) => (model.geometries(), true),
        DrawableKind::Light(_) => return,
    };
    let lod_distance = distance * lod_bias;

    for (index, slot) in geometries.iter().enumerate() {
        let Some(pass) = slot.material().pass(pass_type) else { continue };
        let geometry = slot.geometry_at(slot.select_lod(lod_distance));
        let batch = if complex {
            Batch::new_complex(pass.clone(), geometry, index as u32, key, distance)
        } else {
            Batch::new_static(pass.clone(), geometry, index as u32, *drawable.world_transform(), distance)
        };
        out.push(batch);
    }
}

fn evaluate_chunk(
    drawables: &SlotMap<DrawableKey, Drawable>,
    keys: &[DrawableKey],
    camera: &Camera,
) -> ChunkResult {
    let mut result = ChunkResult::default();
    let lod_bias = camera.lod_bias();

    for &key in keys {
        let Some(drawable) = drawables.get(key) else { continue };
        let RenderPrep::InRange { distance, render } = drawable.prepare_render(camera) else { continue };
        result.visible.push((key, distance));
        if !render {
            continue;
        }

        if drawable.is_light() {
            result.lights.push(VisibleLight { drawable: key, distance, shadow_view: None });
        } else {
            let opaque_start = result.opaque.len();
            let alpha_start = result.alpha.len();
            push_batches(key, drawable, PassType::Opaque, distance, lod_bias, &mut result.opaque);
            push_batches(key, drawable, PassType::Alpha, distance, lod_bias, &mut result.alpha);
            if result.opaque.len() > opaque_start || result.alpha.len() > alpha_start {
                result.geometries.push(key);
            }
        }
    }
    result
}

/// Gather the shadow casters of one light and their shadow batches.
fn evaluate_shadow_view(
    scene: &Scene,
    camera: &Camera,
    light: DrawableKey,
    volume: ShadowVolume,
) -> (ShadowView, Vec<(DrawableKey, f32)>) {
    let mut candidates = Vec::new();
    let flags = DrawableFlags::GEOMETRY | DrawableFlags::CAST_SHADOWS;
    match &volume {
        ShadowVolume::Frustum(frustum) => {
            scene.octree().query_frustum(frustum, flags, camera.view_mask(), &mut candidates)
        }
        ShadowVolume::Box(bounds) => {
            scene.octree().query_box(bounds, flags, camera.view_mask(), &mut candidates)
        }
    }

    let mut view = ShadowView { light, volume, casters: Vec::new(), queue: BatchQueue::new() };
    let mut visible = Vec::new();
    let mut batches = Vec::new();
    for key in candidates {
        let Some(drawable) = scene.drawable(key) else { continue };
        let RenderPrep::InRange { distance, render } = drawable.prepare_render(camera) else { continue };
        visible.push((key, distance));
        if !render {
            continue;
        }
        let start = batches.len();
        push_batches(key, drawable, PassType::Shadow, distance, camera.lod_bias(), &mut batches);
        if batches.len() > start {
            view.casters.push(key);
        }
    }
    for batch in batches {
        view.queue.push(batch);
    }
    (view, visible)
}

// ===== VIEW PREPARER =====

/// Culler-driven view preparation with a parallel evaluation step.
pub struct ViewPreparer {
    config: ViewConfig,
    culler: Box<dyn CameraCuller>,
    pool: TaskPool,
    candidates: Vec<DrawableKey>,
}

impl ViewPreparer {
    /// Create a preparer with its own worker pool (0 = available parallelism).
    pub fn new(config: ViewConfig, culler: Box<dyn CameraCuller>, num_threads: usize) -> Result<Self> {
        let mut config = config;
        config.prepare_chunk_size = config.prepare_chunk_size.max(1);
        Ok(Self {
            config,
            culler,
            pool: TaskPool::new(num_threads)?,
            candidates: Vec::new(),
        })
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Replace the culling strategy.
    pub fn set_culler(&mut self, culler: Box<dyn CameraCuller>) {
        self.culler = culler;
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    /// Cull the scene for a camera and build the sorted batch queues.
    ///
    /// Uses the scene's current frame number: run the update pass first.
    /// Every drawable within range, including shadow casters outside the
    /// camera frustum, is marked as seen in this frame.
    pub fn prepare_view(
        &mut self,
        scene: &mut Scene,
        camera: &Camera,
        cull_occluded: bool,
        time_step: f32,
    ) -> RenderView {
        let frame_number = scene.frame_number();

        self.candidates.clear();
        self.culler.cull(scene, camera, DrawableFlags::empty(), &mut self.candidates);

        let drawables = &scene.drawables;
        let chunks: Vec<&[DrawableKey]> = self.candidates.chunks(self.config.prepare_chunk_size).collect();
        let results = self.pool.run_all(chunks, |chunk| evaluate_chunk(drawables, chunk, camera));

        let mut view = RenderView {
            camera: camera.clone(),
            frame_number,
            geometries: Vec::new(),
            lights: Vec::new(),
            opaque: BatchQueue::new(),
            alpha: BatchQueue::new(),
            shadow_views: Vec::new(),
            cull_occluded,
            time_step,
        };
        let mut committed = Vec::new();
        for result in results {
            committed.extend(result.visible);
            view.geometries.extend(result.geometries);
            view.lights.extend(result.lights);
            for batch in result.opaque {
                view.opaque.push(batch);
            }
            for batch in result.alpha {
                view.alpha.push(batch);
            }
        }

        view.lights.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        if view.lights.len() > self.config.max_lights {
            engine_trace!("galaxy3d::ViewPreparer",
                "Dropping {} light(s) beyond the limit of {}",
                view.lights.len() - self.config.max_lights, self.config.max_lights);
            view.lights.truncate(self.config.max_lights);
        }

        if self.config.shadows {
            committed.extend(self.prepare_shadow_views(scene, camera, &mut view));
        }

        for (key, distance) in committed {
            if let Some(drawable) = scene.drawables.get_mut(key) {
                drawable.commit_render(frame_number, distance, camera.lod_bias());
            }
        }

        view.opaque.sort(self.config.opaque_sort, self.config.instancing);
        view.alpha.sort(self.config.alpha_sort, false);

        engine_debug!("galaxy3d::ViewPreparer",
            "Frame {}: {} candidate(s), {} geometries, {} light(s), {} shadow view(s), {} batch(es)",
            frame_number, self.candidates.len(), view.geometries.len(), view.lights.len(),
            view.shadow_views.len(), view.batch_count());
        view
    }

    /// Build one shadow view per visible shadow-casting light.
    ///
    /// Returns the in-range casters to commit.
    fn prepare_shadow_views(
        &self,
        scene: &Scene,
        camera: &Camera,
        view: &mut RenderView,
    ) -> Vec<(DrawableKey, f32)> {
        let mut tasks = Vec::new();
        for (index, visible) in view.lights.iter().enumerate() {
            let Some(drawable) = scene.drawable(visible.drawable) else { continue };
            let Some(light) = drawable.light() else { continue };
            if drawable.test_flag(DrawableFlags::CAST_SHADOWS) {
                tasks.push((index, visible.drawable, light.shadow_volume(drawable.world_transform(), camera)));
            }
        }

        let results = self.pool.run_all(tasks, |(index, light, volume)| {
            (index, evaluate_shadow_view(scene, camera, light, volume))
        });

        let mut committed = Vec::new();
        for (index, (mut shadow_view, visible)) in results {
            shadow_view.queue.sort(BatchSortMode::State, self.config.instancing);
            view.lights[index].shadow_view = Some(view.shadow_views.len());
            view.shadow_views.push(shadow_view);
            committed.extend(visible);
        }
        committed
    }
}

impl std::fmt::Debug for ViewPreparer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewPreparer")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
#[path = "view_tests.rs"]
mod tests;
