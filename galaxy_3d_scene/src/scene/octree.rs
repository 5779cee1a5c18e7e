/// Octree: loose, dynamically subdividing spatial index of drawables.
///
/// Layout:
/// - A pinned root octant covering the configured world. It also holds the
///   drawables that fit nowhere else: huge, outside the world, non-finite.
/// - Eight *branches*, one per root child. Each branch owns the arena of
///   octants below that child. The update pass hands `&mut Branch` to one
///   worker task per branch, so no two tasks can touch the same octant.
///
/// Placement: a drawable descends from an octant into the child selected by
/// its box center as long as the octant is split, below `max_depth`, and
/// the child's loose bounds contain the box. Children are created on
/// demand. A drawable that still fits its current octant (loose bounds
/// contain it and it could not descend further) is never moved.
///
/// Structure changes happen only in `rebalance`, after all relocations of
/// a step: merges of underpopulated subtrees, pruning of empty leaves, then
/// splits of overfull leaves. Each of them depends only on the populations
/// reached, not on the order drawables arrived in.

use glam::Vec3;
use crate::camera::{Frustum, FrustumTest};
use crate::config::OctreeConfig;
use crate::math::{AABB, Ray, Sphere};
use crate::utils::TaskPool;
use crate::{engine_error, engine_trace};
use super::drawable::{DrawableFlags, DrawableKey};

/// Branch id used for the root octant.
const ROOT_BRANCH: u8 = 8;
/// Arena index of the top octant of every branch.
const BRANCH_TOP: u32 = 0;

// ===== IDENTIFIERS =====

/// Location of an octant: branch (root child) plus arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OctantId {
    branch: u8,
    index: u32,
}

impl OctantId {
    /// The root octant.
    pub const ROOT: OctantId = OctantId { branch: ROOT_BRANCH, index: 0 };

    pub fn is_root(&self) -> bool {
        self.branch == ROOT_BRANCH
    }

    /// Root child this octant descends from, `None` for the root.
    pub fn branch(&self) -> Option<usize> {
        (self.branch < ROOT_BRANCH).then_some(self.branch as usize)
    }
}

/// What the octree stores per drawable: enough to cull without touching
/// the drawable itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeEntry {
    pub key: DrawableKey,
    pub bounds: AABB,
    pub flags: DrawableFlags,
    pub view_mask: u32,
}

impl OctreeEntry {
    /// All of `flags` set and at least one view mask bit shared.
    #[inline]
    fn matches(&self, flags: DrawableFlags, view_mask: u32) -> bool {
        self.flags.contains(flags) && (self.view_mask & view_mask) != 0
    }
}

/// Closest-hit record of a ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastResult {
    /// World-space hit position
    pub position: Vec3,
    /// Surface normal at the hit (zero if the ray starts inside)
    pub normal: Vec3,
    /// Distance along the ray
    pub distance: f32,
    /// Drawable hit
    pub drawable: DrawableKey,
}

/// Structural counters, accumulated since creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OctreeStats {
    /// Drawables processed by reinsertion
    pub reinsertions: u64,
    /// Reinsertions that changed the drawable's octant
    pub octant_changes: u64,
    /// Octants subdivided
    pub splits: u64,
    /// Subtrees collapsed into their top octant
    pub merges: u64,
    /// Live octants, root included
    pub octants: usize,
}

impl OctreeStats {
    fn accumulate(&mut self, other: &OctreeStats) {
        self.reinsertions += other.reinsertions;
        self.octant_changes += other.octant_changes;
        self.splits += other.splits;
        self.merges += other.merges;
    }
}

/// A drawable whose octree placement must be refreshed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReinsertRequest {
    pub key: DrawableKey,
    /// Current octant, `None` if not in the tree yet
    pub from: Option<OctantId>,
}

/// Result of a reinsertion pass.
#[derive(Debug, Clone, Default)]
pub struct ReinsertReport {
    /// New octant of every drawable that moved, including drawables
    /// displaced by splits and merges
    pub moves: Vec<(DrawableKey, OctantId)>,
    /// Fresh world bounds of every processed drawable
    pub bounds: Vec<(DrawableKey, AABB)>,
    /// Requests processed
    pub processed: usize,
    /// Requests that changed octant
    pub relocated: usize,
    /// Requests handed to the single-threaded finalize step
    pub deferred: usize,
    /// Branch tasks submitted
    pub partitions: usize,
}

// ===== OCTANT =====

/// One cubic cell of the octree.
#[derive(Debug, Clone)]
pub struct Octant {
    center: Vec3,
    half_size: f32,
    level: u32,
    loose_bounds: AABB,
    parent: Option<u32>,
    children: [Option<u32>; 8],
    split: bool,
    entries: Vec<OctreeEntry>,
    subtree_count: usize,
}

impl Octant {
    fn new(center: Vec3, half_size: f32, level: u32, loose_factor: f32, parent: Option<u32>) -> Self {
        Self {
            center,
            half_size,
            level,
            loose_bounds: AABB::from_center_half_extents(center, Vec3::splat(half_size * loose_factor)),
            parent,
            children: [None; 8],
            split: false,
            entries: Vec::new(),
            subtree_count: 0,
        }
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Nominal half edge length.
    pub fn half_size(&self) -> f32 {
        self.half_size
    }

    /// Depth, root = 0.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Nominal cube.
    pub fn bounds(&self) -> AABB {
        AABB::from_center_half_extents(self.center, Vec3::splat(self.half_size))
    }

    /// Containment region (nominal cube scaled by the loose factor).
    pub fn loose_bounds(&self) -> &AABB {
        &self.loose_bounds
    }

    /// Whether drawables may descend into children.
    pub fn is_split(&self) -> bool {
        self.split
    }

    pub fn entries(&self) -> &[OctreeEntry] {
        &self.entries
    }

    /// Drawables in this octant and all its descendants.
    pub fn subtree_count(&self) -> usize {
        self.subtree_count
    }

    fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    /// Child slot containing a point. Bit 0 = +X, bit 1 = +Y, bit 2 = +Z.
    #[inline]
    fn child_slot(&self, point: Vec3) -> usize {
        (point.x >= self.center.x) as usize
            | ((point.y >= self.center.y) as usize) << 1
            | ((point.z >= self.center.z) as usize) << 2
    }

    fn child_center(&self, slot: usize) -> Vec3 {
        let quarter = self.half_size * 0.5;
        let sign = |bit: usize| if slot & bit != 0 { quarter } else { -quarter };
        self.center + Vec3::new(sign(1), sign(2), sign(4))
    }

    /// Child slot a box would descend into, if any.
    fn descend_slot(&self, bounds: &AABB, config: &OctreeConfig) -> Option<usize> {
        if !self.split || self.level >= config.max_depth {
            return None;
        }
        let slot = self.child_slot(bounds.center());
        let half = self.half_size * 0.5 * config.loose_factor;
        let child_loose = AABB::from_center_half_extents(self.child_center(slot), Vec3::splat(half));
        child_loose.contains(bounds).then_some(slot)
    }

    /// Whether a box may stay in this octant.
    fn still_fits(&self, bounds: &AABB, config: &OctreeConfig) -> bool {
        self.loose_bounds.contains(bounds) && self.descend_slot(bounds, config).is_none()
    }

    fn remove_entry(&mut self, key: DrawableKey) -> Option<OctreeEntry> {
        let position = self.entries.iter().position(|entry| entry.key == key)?;
        Some(self.entries.swap_remove(position))
    }
}

/// 3-way classification of an octant's loose bounds against a box.
fn classify_box(volume: &AABB, bounds: &AABB) -> FrustumTest {
    if volume.contains(bounds) {
        FrustumTest::Inside
    } else if volume.intersects(bounds) {
        FrustumTest::Partial
    } else {
        FrustumTest::Outside
    }
}

/// 3-way classification of an octant's loose bounds against a sphere.
fn classify_sphere(sphere: &Sphere, bounds: &AABB) -> FrustumTest {
    if !sphere.intersects_aabb(bounds) {
        return FrustumTest::Outside;
    }
    let far = (bounds.min - sphere.center).abs().max((bounds.max - sphere.center).abs());
    if far.length_squared() <= sphere.radius * sphere.radius {
        FrustumTest::Inside
    } else {
        FrustumTest::Partial
    }
}

// ===== BRANCH =====

/// Octant arena below one root child.
#[derive(Debug, Clone)]
pub(crate) struct Branch {
    slot: u8,
    octants: Vec<Option<Octant>>,
    free: Vec<u32>,
    stats: OctreeStats,
}

/// Output of one branch task.
#[derive(Debug, Default)]
struct BranchUpdate {
    moves: Vec<(DrawableKey, OctantId)>,
    bounds: Vec<(DrawableKey, AABB)>,
    deferred: Vec<OctreeEntry>,
    processed: usize,
    relocated: usize,
}

impl Branch {
    fn new(slot: u8, top: Octant, config: &OctreeConfig) -> Self {
        let mut branch = Self {
            slot,
            octants: vec![Some(top)],
            free: Vec::new(),
            stats: OctreeStats::default(),
        };
        branch.build_pinned(BRANCH_TOP, config);
        branch
    }

    /// Split and populate every octant above `initial_depth`.
    fn build_pinned(&mut self, index: u32, config: &OctreeConfig) {
        let level = match self.get(index) {
            Some(octant) => octant.level,
            None => return,
        };
        if level >= config.initial_depth || level >= config.max_depth {
            return;
        }
        if let Some(octant) = self.get_mut(index) {
            octant.split = true;
        }
        for slot in 0..8 {
            let child = self.child_or_create(index, slot, config);
            self.build_pinned(child, config);
        }
    }

    fn id(&self, index: u32) -> OctantId {
        OctantId { branch: self.slot, index }
    }

    fn get(&self, index: u32) -> Option<&Octant> {
        self.octants.get(index as usize).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: u32) -> Option<&mut Octant> {
        self.octants.get_mut(index as usize).and_then(Option::as_mut)
    }

    fn top(&self) -> Option<&Octant> {
        self.get(BRANCH_TOP)
    }

    fn live_count(&self) -> usize {
        self.octants.len() - self.free.len()
    }

    fn alloc(&mut self, octant: Octant) -> u32 {
        match self.free.pop() {
            Some(index) => {
                self.octants[index as usize] = Some(octant);
                index
            }
            None => {
                self.octants.push(Some(octant));
                (self.octants.len() - 1) as u32
            }
        }
    }

    fn release(&mut self, index: u32) {
        if index != BRANCH_TOP {
            if let Some(slot) = self.octants.get_mut(index as usize) {
                if slot.take().is_some() {
                    self.free.push(index);
                }
            }
        }
    }

    fn child_or_create(&mut self, index: u32, slot: usize, config: &OctreeConfig) -> u32 {
        let Some(parent) = self.get(index) else { return index };
        if let Some(child) = parent.children[slot] {
            return child;
        }
        let child = Octant::new(
            parent.child_center(slot),
            parent.half_size * 0.5,
            parent.level + 1,
            config.loose_factor,
            Some(index),
        );
        let child_index = self.alloc(child);
        if let Some(parent) = self.get_mut(index) {
            parent.children[slot] = Some(child_index);
        }
        child_index
    }

    /// Walk down from `start` to the octant a box belongs in, creating
    /// children on the way.
    fn find_target(&mut self, start: u32, bounds: &AABB, config: &OctreeConfig) -> u32 {
        let mut index = start;
        while let Some(slot) = self.get(index).and_then(|o| o.descend_slot(bounds, config)) {
            index = self.child_or_create(index, slot, config);
        }
        index
    }

    fn adjust_counts(&mut self, index: u32, added: bool) {
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            let Some(octant) = self.get_mut(current) else { break };
            if added {
                octant.subtree_count += 1;
            } else {
                octant.subtree_count = octant.subtree_count.saturating_sub(1);
            }
            cursor = octant.parent;
        }
    }

    fn add_entry(&mut self, index: u32, entry: OctreeEntry) {
        if let Some(octant) = self.get_mut(index) {
            octant.entries.push(entry);
            self.adjust_counts(index, true);
        }
    }

    fn remove_entry(&mut self, index: u32, key: DrawableKey) -> Option<OctreeEntry> {
        let entry = self.get_mut(index)?.remove_entry(key)?;
        self.adjust_counts(index, false);
        Some(entry)
    }

    fn entry_mut(&mut self, index: u32, key: DrawableKey) -> Option<&mut OctreeEntry> {
        self.get_mut(index)?.entries.iter_mut().find(|entry| entry.key == key)
    }

    /// Whether a box belongs to this branch when placed from the root.
    fn accepts(&self, root_slot: usize, bounds: &AABB) -> bool {
        root_slot == self.slot as usize
            && self.top().is_some_and(|top| top.loose_bounds.contains(bounds))
    }

    /// Relocate requests whose drawables currently live in this branch.
    ///
    /// Drawables that now belong outside the branch are removed and
    /// returned as deferred entries.
    fn relocate<B>(
        &mut self,
        requests: Vec<(DrawableKey, u32)>,
        root_center: Vec3,
        config: &OctreeConfig,
        entry_of: &B,
    ) -> BranchUpdate
    where
        B: Fn(DrawableKey) -> Option<OctreeEntry>,
    {
        let mut update = BranchUpdate::default();
        let mut touched: Vec<u32> = Vec::new();

        for (key, from) in requests {
            let Some(fresh) = entry_of(key) else { continue };
            update.processed += 1;
            update.bounds.push((key, fresh.bounds));
            self.stats.reinsertions += 1;

            let stays = self.get(from).is_some_and(|octant| octant.still_fits(&fresh.bounds, config));
            if stays {
                if let Some(entry) = self.entry_mut(from, key) {
                    *entry = fresh;
                    continue;
                }
            }

            if self.remove_entry(from, key).is_none() {
                engine_error!("galaxy3d::Octree",
                    "Drawable {:?} missing from its octant {:?}", key, self.id(from));
                debug_assert!(false, "octree back-reference out of sync");
            }
            touched.push(from);

            let root_slot = root_child_slot(root_center, fresh.bounds.center());
            if self.accepts(root_slot, &fresh.bounds) {
                let target = self.find_target(BRANCH_TOP, &fresh.bounds, config);
                self.add_entry(target, fresh);
                touched.push(target);
                if target != from {
                    self.stats.octant_changes += 1;
                    update.relocated += 1;
                    update.moves.push((key, self.id(target)));
                }
            } else {
                update.deferred.push(fresh);
            }
        }

        self.rebalance(touched, config, &mut update.moves);
        update
    }

    // ===== REBALANCE =====

    /// Merge, prune and split around the octants touched by a step.
    fn rebalance(
        &mut self,
        mut touched: Vec<u32>,
        config: &OctreeConfig,
        moves: &mut Vec<(DrawableKey, OctantId)>,
    ) {
        if touched.is_empty() {
            return;
        }
        touched.sort_unstable();
        touched.dedup();

        for &index in &touched {
            if let Some(top) = self.merge_candidate(index, config) {
                self.collapse(top, moves);
            }
        }
        for &index in &touched {
            self.prune(index, config);
        }
        for &index in &touched {
            self.split_overfull(index, config, moves);
        }
    }

    /// Highest split ancestor (or self) whose subtree is small enough to
    /// collapse. Levels above `initial_depth` are pinned.
    fn merge_candidate(&self, index: u32, config: &OctreeConfig) -> Option<u32> {
        let mut candidate = None;
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            let octant = self.get(current)?;
            if octant.level < config.initial_depth {
                break;
            }
            if octant.split && octant.subtree_count < config.merge_threshold {
                candidate = Some(current);
            }
            cursor = octant.parent;
        }
        candidate
    }

    /// Pull every entry of a subtree up into its top octant.
    fn collapse(&mut self, index: u32, moves: &mut Vec<(DrawableKey, OctantId)>) {
        let Some(octant) = self.get_mut(index) else { return };
        let mut pending: Vec<u32> = octant.children.iter().flatten().copied().collect();
        octant.children = [None; 8];
        octant.split = false;

        let mut gathered = Vec::new();
        while let Some(child) = pending.pop() {
            if let Some(octant) = self.octants.get_mut(child as usize).and_then(Option::take) {
                pending.extend(octant.children.iter().flatten());
                gathered.extend(octant.entries);
                self.free.push(child);
            }
        }

        let id = self.id(index);
        moves.extend(gathered.iter().map(|entry| (entry.key, id)));
        if let Some(octant) = self.get_mut(index) {
            octant.entries.extend(gathered);
            engine_trace!("galaxy3d::Octree", "Merged octant {:?} ({} drawables)", id, octant.subtree_count);
        }
        self.stats.merges += 1;
    }

    /// Remove an empty leaf and any ancestors left empty by it.
    fn prune(&mut self, index: u32, config: &OctreeConfig) {
        let mut cursor = index;
        loop {
            let Some(octant) = self.get(cursor) else { return };
            let removable = cursor != BRANCH_TOP
                && octant.level > config.initial_depth
                && octant.entries.is_empty()
                && !octant.has_children();
            let parent = match (removable, octant.parent) {
                (true, Some(parent)) => parent,
                _ => return,
            };
            let center = octant.center;
            if let Some(parent_octant) = self.get_mut(parent) {
                let child_slot = parent_octant.child_slot(center);
                parent_octant.children[child_slot] = None;
            }
            self.release(cursor);
            cursor = parent;
        }
    }

    /// Subdivide an overfull leaf, then any overfull children it produced.
    fn split_overfull(
        &mut self,
        index: u32,
        config: &OctreeConfig,
        moves: &mut Vec<(DrawableKey, OctantId)>,
    ) {
        let mut pending = vec![index];
        while let Some(current) = pending.pop() {
            let Some(octant) = self.get_mut(current) else { continue };
            if octant.split
                || octant.level >= config.max_depth
                || octant.entries.len() <= config.split_threshold
            {
                continue;
            }
            octant.split = true;
            let entries = std::mem::take(&mut octant.entries);
            let count = entries.len();

            let mut targets = Vec::new();
            for entry in entries {
                let target = self.find_target(current, &entry.bounds, config);
                if target == current {
                    if let Some(octant) = self.get_mut(current) {
                        octant.entries.push(entry);
                    }
                } else {
                    // Counts from `current` up are unchanged.
                    self.add_entry_below(target, current, entry);
                    moves.push((entry.key, self.id(target)));
                    targets.push(target);
                }
            }

            self.stats.splits += 1;
            engine_trace!("galaxy3d::Octree", "Split octant {:?} ({} drawables)", self.id(current), count);

            targets.sort_unstable();
            targets.dedup();
            pending.extend(targets);
        }
    }

    /// Add an entry to `index` and bump the counts of octants strictly
    /// below `top` on the way up.
    fn add_entry_below(&mut self, index: u32, top: u32, entry: OctreeEntry) {
        if let Some(octant) = self.get_mut(index) {
            octant.entries.push(entry);
        }
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            if current == top {
                break;
            }
            let Some(octant) = self.get_mut(current) else { break };
            octant.subtree_count += 1;
            cursor = octant.parent;
        }
    }

    // ===== QUERIES =====

    fn query<C, T>(
        &self,
        index: u32,
        class: FrustumTest,
        classify: &C,
        test: &T,
        flags: DrawableFlags,
        view_mask: u32,
        results: &mut Vec<DrawableKey>,
    ) where
        C: Fn(&AABB) -> FrustumTest,
        T: Fn(&AABB) -> bool,
    {
        let Some(octant) = self.get(index) else { return };

        match class {
            FrustumTest::Outside => {}

            FrustumTest::Inside => self.collect_all(index, flags, view_mask, results),

            FrustumTest::Partial => {
                results.extend(octant.entries.iter()
                    .filter(|entry| entry.matches(flags, view_mask) && test(&entry.bounds))
                    .map(|entry| entry.key));

                for &child in octant.children.iter().flatten() {
                    if let Some(child_octant) = self.get(child) {
                        let child_class = classify(&child_octant.loose_bounds);
                        self.query(child, child_class, classify, test, flags, view_mask, results);
                    }
                }
            }
        }
    }

    /// Collect a whole subtree without per-drawable volume tests.
    fn collect_all(&self, index: u32, flags: DrawableFlags, view_mask: u32, results: &mut Vec<DrawableKey>) {
        let Some(octant) = self.get(index) else { return };
        results.extend(octant.entries.iter()
            .filter(|entry| entry.matches(flags, view_mask))
            .map(|entry| entry.key));
        for &child in octant.children.iter().flatten() {
            self.collect_all(child, flags, view_mask, results);
        }
    }

    /// Octants whose loose bounds a ray enters within `max_distance`,
    /// visited nearest child first.
    fn raycast_visit<V>(&self, index: u32, ray: &Ray, max_distance: &mut f32, visit: &mut V)
    where
        V: FnMut(&OctreeEntry, &mut f32),
    {
        let Some(octant) = self.get(index) else { return };
        match ray.hit_distance(&octant.loose_bounds) {
            Some(t) if t <= *max_distance => {}
            _ => return,
        }

        for entry in &octant.entries {
            visit(entry, max_distance);
        }

        let mut children: Vec<(f32, u32)> = octant.children.iter()
            .flatten()
            .filter_map(|&child| {
                let t = ray.hit_distance(&self.get(child)?.loose_bounds)?;
                Some((t, child))
            })
            .collect();
        children.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (t, child) in children {
            if t <= *max_distance {
                self.raycast_visit(child, ray, max_distance, visit);
            }
        }
    }
}

/// Root child slot of a point.
#[inline]
fn root_child_slot(root_center: Vec3, point: Vec3) -> usize {
    (point.x >= root_center.x) as usize
        | ((point.y >= root_center.y) as usize) << 1
        | ((point.z >= root_center.z) as usize) << 2
}

// ===== OCTREE =====

/// Loose octree of drawables.
#[derive(Debug, Clone)]
pub struct Octree {
    config: OctreeConfig,
    root: Octant,
    branches: Vec<Branch>,
    stats: OctreeStats,
}

impl Octree {
    /// Create an octree. The configuration is sanitized first.
    pub fn new(config: &OctreeConfig) -> Self {
        let config = config.sanitized();
        let center = config.world_bounds.center();
        let half_size = config.world_bounds.half_size().x;

        let mut root = Octant::new(center, half_size, 0, config.loose_factor, None);
        root.split = true;

        let branches = (0..8u8)
            .map(|slot| {
                let top = Octant::new(
                    root.child_center(slot as usize),
                    half_size * 0.5,
                    1,
                    config.loose_factor,
                    None,
                );
                Branch::new(slot, top, &config)
            })
            .collect();

        Self { config, root, branches, stats: OctreeStats::default() }
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    pub fn world_bounds(&self) -> &AABB {
        &self.config.world_bounds
    }

    /// Octant by id, if it is alive.
    pub fn octant(&self, id: OctantId) -> Option<&Octant> {
        match id.branch() {
            None => Some(&self.root),
            Some(branch) => self.branches.get(branch)?.get(id.index),
        }
    }

    /// All live octants, root first.
    pub fn octants(&self) -> impl Iterator<Item = (OctantId, &Octant)> + '_ {
        std::iter::once((OctantId::ROOT, &self.root)).chain(
            self.branches.iter().flat_map(|branch| {
                branch.octants.iter().enumerate().filter_map(move |(index, octant)| {
                    octant.as_ref().map(|octant| (branch.id(index as u32), octant))
                })
            }),
        )
    }

    /// Number of drawables in the tree.
    pub fn drawable_count(&self) -> usize {
        self.root.entries.len()
            + self.branches.iter()
                .filter_map(|branch| branch.top())
                .map(|top| top.subtree_count)
                .sum::<usize>()
    }

    pub fn stats(&self) -> OctreeStats {
        let mut stats = self.stats;
        for branch in &self.branches {
            stats.accumulate(&branch.stats);
        }
        stats.octants = 1 + self.branches.iter().map(Branch::live_count).sum::<usize>();
        stats
    }

    /// Whether an octant is a valid home for a box: its loose bounds contain
    /// the box and the box could not descend further. Anything may live in
    /// the root.
    pub fn is_valid_placement(&self, id: OctantId, bounds: &AABB) -> bool {
        if id.is_root() {
            return !self.fits_branch(bounds);
        }
        self.octant(id).is_some_and(|octant| octant.still_fits(bounds, &self.config))
    }

    // ===== INSERT / REMOVE =====

    /// Insert a drawable entry. Returns every placement change, the new
    /// entry's included.
    pub fn insert(&mut self, entry: OctreeEntry) -> Vec<(DrawableKey, OctantId)> {
        let mut moves = Vec::new();
        let mut touched: Vec<Vec<u32>> = vec![Vec::new(); 8];
        let id = self.place_from_root(entry, &mut touched);
        moves.push((entry.key, id));
        self.rebalance_all(touched, &mut moves);
        moves
    }

    /// Remove a drawable from its octant. Returns the placement changes
    /// caused by the resulting merges, or `None` if it was not there.
    pub fn remove(&mut self, key: DrawableKey, from: OctantId) -> Option<Vec<(DrawableKey, OctantId)>> {
        let mut moves = Vec::new();
        match from.branch() {
            None => {
                self.root.remove_entry(key)?;
            }
            Some(slot) => {
                let config = &self.config;
                let branch = self.branches.get_mut(slot)?;
                branch.remove_entry(from.index, key)?;
                branch.rebalance(vec![from.index], config, &mut moves);
            }
        }
        Some(moves)
    }

    /// Refresh the cached flags and view mask of an entry.
    pub fn update_entry_info(&mut self, key: DrawableKey, at: OctantId, flags: DrawableFlags, view_mask: u32) -> bool {
        let entry = match at.branch() {
            None => self.root.entries.iter_mut().find(|entry| entry.key == key),
            Some(slot) => match self.branches.get_mut(slot) {
                Some(branch) => branch.entry_mut(at.index, key),
                None => None,
            },
        };
        match entry {
            Some(entry) => {
                entry.flags = flags;
                entry.view_mask = view_mask;
                true
            }
            None => false,
        }
    }

    fn place_from_root(&mut self, entry: OctreeEntry, touched: &mut [Vec<u32>]) -> OctantId {
        let slot = root_child_slot(self.root.center, entry.bounds.center());
        match self.branches.get_mut(slot) {
            Some(branch) if entry.bounds.is_finite() && branch.accepts(slot, &entry.bounds) => {
                let target = branch.find_target(BRANCH_TOP, &entry.bounds, &self.config);
                branch.add_entry(target, entry);
                touched[slot].push(target);
                branch.id(target)
            }
            _ => {
                self.root.entries.push(entry);
                OctantId::ROOT
            }
        }
    }

    fn rebalance_all(&mut self, touched: Vec<Vec<u32>>, moves: &mut Vec<(DrawableKey, OctantId)>) {
        let config = &self.config;
        for (branch, touched) in self.branches.iter_mut().zip(touched) {
            branch.rebalance(touched, config, moves);
        }
    }

    // ===== REINSERTION PASS =====

    /// Reinsert a batch of drawables, one worker task per branch.
    ///
    /// `entry_of` returns the drawable's current entry (fresh bounds, flags
    /// and view mask); it runs on worker threads and must only read.
    /// Drawables leaving their branch, held by the root, or not yet in the
    /// tree are placed afterwards by a single-threaded finalize step.
    pub fn reinsert<B>(&mut self, pool: &TaskPool, requests: &[ReinsertRequest], entry_of: B) -> ReinsertReport
    where
        B: Fn(DrawableKey) -> Option<OctreeEntry> + Sync,
    {
        let mut report = ReinsertReport::default();
        let mut partitions: Vec<Vec<(DrawableKey, u32)>> = vec![Vec::new(); 8];
        let mut finalize: Vec<ReinsertRequest> = Vec::new();

        for request in requests {
            match request.from.and_then(|from| from.branch().map(|slot| (slot, from.index))) {
                Some((slot, index)) if slot < partitions.len() => partitions[slot].push((request.key, index)),
                _ => finalize.push(*request),
            }
        }

        // Parallel phase: every task owns one branch exclusively.
        let root_center = self.root.center;
        let updates = {
            let config = &self.config;
            let tasks: Vec<(&mut Branch, Vec<(DrawableKey, u32)>)> = self.branches.iter_mut()
                .zip(partitions)
                .filter(|(_, requests)| !requests.is_empty())
                .collect();
            report.partitions = tasks.len();

            pool.run_all(tasks, |(branch, requests)| {
                branch.relocate(requests, root_center, config, &entry_of)
            })
        };

        // Finalize phase: single-threaded placement from the root.
        let mut deferred: Vec<(OctreeEntry, bool)> = Vec::new();
        for update in updates {
            report.processed += update.processed;
            report.relocated += update.relocated;
            report.moves.extend(update.moves);
            report.bounds.extend(update.bounds);
            deferred.extend(update.deferred.into_iter().map(|entry| (entry, true)));
        }

        for request in finalize {
            let Some(fresh) = entry_of(request.key) else { continue };
            report.processed += 1;
            report.bounds.push((request.key, fresh.bounds));
            self.stats.reinsertions += 1;

            if request.from == Some(OctantId::ROOT) {
                if !self.fits_branch(&fresh.bounds) {
                    if let Some(entry) = self.root.entries.iter_mut().find(|e| e.key == request.key) {
                        *entry = fresh;
                        continue;
                    }
                }
                self.root.remove_entry(request.key);
            }
            deferred.push((fresh, request.from.is_some()));
        }

        report.deferred = deferred.len();
        let mut touched: Vec<Vec<u32>> = vec![Vec::new(); 8];
        for (entry, was_placed) in deferred {
            let id = self.place_from_root(entry, &mut touched);
            if was_placed {
                self.stats.octant_changes += 1;
                report.relocated += 1;
            }
            report.moves.push((entry.key, id));
        }
        self.rebalance_all(touched, &mut report.moves);

        engine_trace!("galaxy3d::Octree",
            "Reinserted {} drawables ({} relocated, {} deferred, {} partitions)",
            report.processed, report.relocated, report.deferred, report.partitions);

        report
    }

    /// Whether a box would be placed inside a branch rather than the root.
    fn fits_branch(&self, bounds: &AABB) -> bool {
        let slot = root_child_slot(self.root.center, bounds.center());
        bounds.is_finite()
            && self.branches.get(slot).is_some_and(|branch| branch.accepts(slot, bounds))
    }

    // ===== QUERIES =====

    fn query_with<C, T>(
        &self,
        classify: C,
        test: T,
        flags: DrawableFlags,
        view_mask: u32,
        results: &mut Vec<DrawableKey>,
    ) where
        C: Fn(&AABB) -> FrustumTest,
        T: Fn(&AABB) -> bool,
    {
        // Root entries are not bounded by the root's loose bounds.
        results.extend(self.root.entries.iter()
            .filter(|entry| entry.matches(flags, view_mask) && test(&entry.bounds))
            .map(|entry| entry.key));

        for branch in &self.branches {
            if let Some(top) = branch.top() {
                let class = classify(&top.loose_bounds);
                branch.query(BRANCH_TOP, class, &classify, &test, flags, view_mask, results);
            }
        }
    }

    /// Drawables intersecting a frustum. `flags` must all be set on a
    /// drawable (empty = any), and its view mask must share a bit with
    /// `view_mask`.
    pub fn query_frustum(&self, frustum: &Frustum, flags: DrawableFlags, view_mask: u32, results: &mut Vec<DrawableKey>) {
        self.query_with(
            |bounds| frustum.classify_aabb(bounds),
            |bounds| frustum.intersects_aabb(bounds),
            flags,
            view_mask,
            results,
        );
    }

    /// Drawables intersecting a box.
    pub fn query_box(&self, volume: &AABB, flags: DrawableFlags, view_mask: u32, results: &mut Vec<DrawableKey>) {
        self.query_with(
            |bounds| classify_box(volume, bounds),
            |bounds| volume.intersects(bounds),
            flags,
            view_mask,
            results,
        );
    }

    /// Drawables intersecting a sphere.
    pub fn query_sphere(&self, sphere: &Sphere, flags: DrawableFlags, view_mask: u32, results: &mut Vec<DrawableKey>) {
        self.query_with(
            |bounds| classify_sphere(sphere, bounds),
            |bounds| sphere.intersects_aabb(bounds),
            flags,
            view_mask,
            results,
        );
    }

    fn raycast_visit_all<V>(&self, ray: &Ray, max_distance: &mut f32, mut visit: V)
    where
        V: FnMut(&OctreeEntry, &mut f32),
    {
        for entry in &self.root.entries {
            visit(entry, max_distance);
        }
        for branch in &self.branches {
            branch.raycast_visit(BRANCH_TOP, ray, max_distance, &mut visit);
        }
    }

    /// All hits along a ray, nearest first.
    ///
    /// Candidate boxes are refined with `refine`, which returns the exact
    /// hit distance and normal, or `None` for a miss.
    pub fn raycast<F>(
        &self,
        ray: &Ray,
        max_distance: f32,
        flags: DrawableFlags,
        view_mask: u32,
        mut refine: F,
    ) -> Vec<RaycastResult>
    where
        F: FnMut(&OctreeEntry, f32) -> Option<(f32, Vec3)>,
    {
        let mut results = Vec::new();
        let mut limit = max_distance;
        self.raycast_visit_all(ray, &mut limit, |entry, limit| {
            if !entry.matches(flags, view_mask) {
                return;
            }
            let Some(t) = ray.hit_distance(&entry.bounds) else { return };
            if t > *limit {
                return;
            }
            if let Some((distance, normal)) = refine(entry, *limit) {
                if distance <= *limit {
                    results.push(RaycastResult {
                        position: ray.point_at(distance),
                        normal,
                        distance,
                        drawable: entry.key,
                    });
                }
            }
        });
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results
    }

    /// Nearest hit along a ray. Subtrees and boxes entered beyond the best
    /// hit so far are skipped.
    pub fn raycast_single<F>(
        &self,
        ray: &Ray,
        max_distance: f32,
        flags: DrawableFlags,
        view_mask: u32,
        mut refine: F,
    ) -> Option<RaycastResult>
    where
        F: FnMut(&OctreeEntry, f32) -> Option<(f32, Vec3)>,
    {
        let mut best: Option<RaycastResult> = None;
        let mut limit = max_distance;
        self.raycast_visit_all(ray, &mut limit, |entry, limit| {
            if !entry.matches(flags, view_mask) {
                return;
            }
            let Some(t) = ray.hit_distance(&entry.bounds) else { return };
            if t > *limit {
                return;
            }
            if let Some((distance, normal)) = refine(entry, *limit) {
                let closer = best.map_or(true, |hit| distance < hit.distance);
                if distance <= *limit && closer {
                    *limit = distance;
                    best = Some(RaycastResult {
                        position: ray.point_at(distance),
                        normal,
                        distance,
                        drawable: entry.key,
                    });
                }
            }
        });
        best
    }
}

#[cfg(test)]
#[path = "octree_tests.rs"]
mod tests;
