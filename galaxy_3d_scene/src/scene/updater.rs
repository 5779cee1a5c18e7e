/// Update strategies.
///
/// An Updater reconciles the scene once per frame, before culling: it
/// advances the frame number, runs the per-frame octree update calls, then
/// refreshes the world bounds and octree placement of every drawable queued
/// for reinsertion since the previous frame.

use rustc_hash::FxHashSet;
use crate::config::SceneConfig;
use crate::error::Result;
use crate::utils::TaskPool;
use crate::engine_debug;
use super::drawable::{DrawableKey, DrawableState};
use super::octree::{OctreeEntry, ReinsertRequest};
use super::scene::Scene;

/// Counters of one update pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateStats {
    /// Frame number the pass ran for
    pub frame_number: u16,
    /// Drawables whose bounds were refreshed
    pub processed: usize,
    /// Drawables that changed octant
    pub relocated: usize,
    /// Drawables placed by the single-threaded finalize step
    pub deferred: usize,
    /// Branch tasks submitted to the worker pool
    pub partitions: usize,
    /// Per-frame octree update calls made
    pub update_calls: usize,
}

/// Strategy for the per-frame scene reconciliation.
///
/// `&mut self` allows stateful implementations (worker pools, caches).
pub trait Updater: Send + Sync {
    /// Run one update pass. Blocks until every task has completed.
    fn update(&mut self, scene: &mut Scene) -> Result<UpdateStats>;
}

/// Parallel updater: one worker task per octree branch.
///
/// Drawables are partitioned by the root child holding them. Each task
/// owns its branch exclusively, recomputes bounds from the shared
/// read-only drawable table, relocates inside the branch and defers
/// drawables leaving it. The finalize step then places deferred drawables
/// from the root on the calling thread.
pub struct ParallelUpdater {
    pool: TaskPool,
}

impl ParallelUpdater {
    /// Create an updater with its own worker pool (0 = available parallelism).
    pub fn new(num_threads: usize) -> Result<Self> {
        Ok(Self { pool: TaskPool::new(num_threads)? })
    }

    /// Create an updater sized by the scene configuration.
    pub fn from_config(config: &SceneConfig) -> Result<Self> {
        Self::new(config.worker_threads)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    /// Run the update calls of drawables that asked for them this frame.
    fn run_update_calls(scene: &mut Scene, frame_number: u16) -> usize {
        let mut calls = 0;
        let Scene { drawables, update_calls, reinsert_queue, .. } = scene;
        for &key in update_calls.iter() {
            let Some(drawable) = drawables.get_mut(key) else { continue };
            if !drawable.needs_octree_update(frame_number) {
                continue;
            }
            drawable.on_octree_update(frame_number);
            calls += 1;
            if drawable.bounds_dirty && drawable.state == DrawableState::Inserted {
                drawable.state = DrawableState::ReinsertQueued;
                reinsert_queue.push(key);
            }
        }
        calls
    }

    /// Drain the reinsertion queue, refreshing world transforms of the
    /// drawables still waiting.
    fn collect_requests(scene: &mut Scene) -> Vec<ReinsertRequest> {
        let queue = std::mem::take(&mut scene.reinsert_queue);
        let mut seen: FxHashSet<DrawableKey> = FxHashSet::default();
        let mut requests = Vec::with_capacity(queue.len());

        for key in queue {
            if !seen.insert(key) {
                continue;
            }
            let owner = match scene.drawables.get(key) {
                Some(drawable) if drawable.state == DrawableState::ReinsertQueued => drawable.owner(),
                _ => continue,
            };
            let Some(world) = scene.world_transform(owner) else { continue };
            if let Some(drawable) = scene.drawables.get_mut(key) {
                drawable.world_transform = world;
                requests.push(ReinsertRequest { key, from: drawable.octant });
            }
        }
        requests
    }
}

impl Updater for ParallelUpdater {
    fn update(&mut self, scene: &mut Scene) -> Result<UpdateStats> {
        let frame_number = scene.advance_frame();
        let update_calls = Self::run_update_calls(scene, frame_number);
        let requests = Self::collect_requests(scene);

        let min_size = scene.octree.config().min_drawable_size;
        let drawables = &scene.drawables;
        let report = scene.octree.reinsert(&self.pool, &requests, |key| {
            let drawable = drawables.get(key)?;
            Some(OctreeEntry {
                key,
                bounds: drawable.compute_world_bounds(min_size),
                flags: drawable.flags(),
                view_mask: drawable.view_mask(),
            })
        });

        for &(key, bounds) in &report.bounds {
            if let Some(drawable) = scene.drawables.get_mut(key) {
                drawable.world_bounds = bounds;
                drawable.bounds_dirty = false;
                drawable.state = DrawableState::Inserted;
            }
        }
        scene.apply_moves(&report.moves);

        let stats = UpdateStats {
            frame_number,
            processed: report.processed,
            relocated: report.relocated,
            deferred: report.deferred,
            partitions: report.partitions,
            update_calls,
        };
        if stats.processed > 0 {
            engine_debug!("galaxy3d::Updater",
                "Frame {}: {} reinserted, {} relocated, {} deferred over {} partition(s)",
                frame_number, stats.processed, stats.relocated, stats.deferred, stats.partitions);
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for ParallelUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelUpdater")
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
#[path = "updater_tests.rs"]
mod tests;
