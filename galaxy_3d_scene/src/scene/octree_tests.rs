use super::*;
use crate::camera::Camera;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

// ============================================================================
// Helpers
// ============================================================================

/// Drawables reduced to their boxes, plus the placement the octree reports.
struct TestWorld {
    octree: Octree,
    boxes: SlotMap<DrawableKey, AABB>,
    placement: FxHashMap<DrawableKey, OctantId>,
    flags: FxHashMap<DrawableKey, (DrawableFlags, u32)>,
}

impl TestWorld {
    fn new(config: OctreeConfig) -> Self {
        Self {
            octree: Octree::new(&config),
            boxes: SlotMap::with_key(),
            placement: FxHashMap::default(),
            flags: FxHashMap::default(),
        }
    }

    fn entry(&self, key: DrawableKey) -> Option<OctreeEntry> {
        let (flags, view_mask) = self.flags.get(&key).copied()
            .unwrap_or((DrawableFlags::GEOMETRY, u32::MAX));
        Some(OctreeEntry { key, bounds: *self.boxes.get(key)?, flags, view_mask })
    }

    fn apply(&mut self, moves: Vec<(DrawableKey, OctantId)>) {
        for (key, id) in moves {
            self.placement.insert(key, id);
        }
    }

    fn insert_with(&mut self, bounds: AABB, flags: DrawableFlags, view_mask: u32) -> DrawableKey {
        let key = self.boxes.insert(bounds);
        self.flags.insert(key, (flags, view_mask));
        let entry = self.entry(key).unwrap();
        let moves = self.octree.insert(entry);
        self.apply(moves);
        key
    }

    fn insert(&mut self, bounds: AABB) -> DrawableKey {
        self.insert_with(bounds, DrawableFlags::GEOMETRY, u32::MAX)
    }

    fn remove(&mut self, key: DrawableKey) {
        let from = self.placement.remove(&key).unwrap();
        let moves = self.octree.remove(key, from).unwrap();
        self.boxes.remove(key);
        self.apply(moves);
    }

    fn move_to(&mut self, key: DrawableKey, bounds: AABB) {
        self.boxes[key] = bounds;
    }

    fn reinsert(&mut self, pool: &TaskPool, keys: &[DrawableKey]) -> ReinsertReport {
        let requests: Vec<ReinsertRequest> = keys.iter()
            .map(|&key| ReinsertRequest { key, from: self.placement.get(&key).copied() })
            .collect();
        let boxes = &self.boxes;
        let flags = &self.flags;
        let report = self.octree.reinsert(pool, &requests, |key| {
            let (flags, view_mask) = flags.get(&key).copied()
                .unwrap_or((DrawableFlags::GEOMETRY, u32::MAX));
            Some(OctreeEntry { key, bounds: *boxes.get(key)?, flags, view_mask })
        });
        self.apply(report.moves.clone());
        report
    }

    /// Every drawable sits in a valid octant and the octree agrees on it.
    fn assert_consistent(&self) {
        assert_eq!(self.octree.drawable_count(), self.boxes.len());
        for (key, bounds) in &self.boxes {
            let id = self.placement[&key];
            let octant = self.octree.octant(id).expect("placement points at a live octant");
            assert!(octant.entries().iter().any(|entry| entry.key == key),
                "drawable missing from its reported octant");
            assert!(self.octree.is_valid_placement(id, bounds),
                "drawable {:?} not in a smallest containing octant", key);
        }
        for (_, octant) in self.octree.octants() {
            let children_total: usize = self.octree.octants()
                .filter(|(_, other)| other.level() == octant.level() + 1
                    && octant.bounds().contains_point(other.center())
                    && octant.level() > 0)
                .map(|(_, child)| child.subtree_count())
                .sum();
            if octant.level() > 0 {
                assert_eq!(octant.subtree_count(), octant.entries().len() + children_total);
            }
        }
    }
}

fn cube(center: Vec3, half: f32) -> AABB {
    AABB::from_center_half_extents(center, Vec3::splat(half))
}

fn random_point(rng: &mut StdRng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.random_range(-extent..extent),
        rng.random_range(-extent..extent),
        rng.random_range(-extent..extent),
    )
}

fn small_config() -> OctreeConfig {
    OctreeConfig {
        world_bounds: AABB::new(Vec3::splat(-100.0), Vec3::splat(100.0)),
        initial_depth: 2,
        max_depth: 6,
        loose_factor: 2.0,
        split_threshold: 4,
        merge_threshold: 2,
        min_drawable_size: 0.001,
    }
}

fn sorted(mut keys: Vec<DrawableKey>) -> Vec<DrawableKey> {
    keys.sort();
    keys
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_new_octree_is_pinned_to_initial_depth() {
    let octree = Octree::new(&OctreeConfig::default());
    let stats = octree.stats();
    // root + 8 branch tops + 64 level-2 octants
    assert_eq!(stats.octants, 73);
    assert_eq!(octree.drawable_count(), 0);
    assert!(octree.octants().filter(|(_, o)| o.level() == 1).all(|(_, o)| o.is_split()));
    assert!(octree.octants().filter(|(_, o)| o.level() == 2).all(|(_, o)| !o.is_split()));
}

#[test]
fn test_new_octree_sanitizes_config() {
    let config = OctreeConfig {
        world_bounds: AABB::new(Vec3::new(-10.0, -5.0, -10.0), Vec3::new(10.0, 5.0, 10.0)),
        max_depth: 99,
        ..OctreeConfig::default()
    };
    let octree = Octree::new(&config);
    assert_eq!(octree.config().max_depth, crate::config::MAX_OCTREE_DEPTH);
    let size = octree.world_bounds().size();
    assert_eq!(size.x, size.y);
    assert_eq!(size.y, size.z);
}

#[test]
fn test_root_id() {
    assert!(OctantId::ROOT.is_root());
    assert_eq!(OctantId::ROOT.branch(), None);
}

// ============================================================================
// Insertion
// ============================================================================

#[test]
fn test_small_drawable_goes_deep() {
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.insert(cube(Vec3::new(300.0, 300.0, 300.0), 1.0));

    let id = world.placement[&key];
    assert!(!id.is_root());
    assert_eq!(world.octree.octant(id).unwrap().level(), 2);
    world.assert_consistent();
}

#[test]
fn test_large_drawable_stays_high() {
    let mut world = TestWorld::new(OctreeConfig::default());
    // Straddles the world center: only the root contains it.
    let key = world.insert(cube(Vec3::ZERO, 600.0));
    assert!(world.placement[&key].is_root());
    world.assert_consistent();
}

#[test]
fn test_out_of_world_goes_to_root() {
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.insert(cube(Vec3::splat(5000.0), 1.0));
    assert!(world.placement[&key].is_root());
    world.assert_consistent();
}

#[test]
fn test_non_finite_bounds_go_to_root() {
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.insert(AABB::new(Vec3::splat(f32::NAN), Vec3::splat(f32::NAN)));
    assert!(world.placement[&key].is_root());

    let huge = world.insert(AABB::huge());
    assert!(world.placement[&huge].is_root());
    assert_eq!(world.octree.drawable_count(), 2);
}

#[test]
fn test_split_when_over_threshold() {
    let mut world = TestWorld::new(small_config());
    let before = world.octree.stats().octants;

    // All in the same level-2 octant, spread over its children.
    for i in 0..8 {
        let offset = Vec3::new(
            if i & 1 != 0 { 5.0 } else { -5.0 },
            if i & 2 != 0 { 5.0 } else { -5.0 },
            if i & 4 != 0 { 5.0 } else { -5.0 },
        );
        world.insert(cube(Vec3::splat(75.0) + offset, 0.5));
    }

    let stats = world.octree.stats();
    assert!(stats.splits >= 1);
    assert!(stats.octants > before);
    world.assert_consistent();
}

#[test]
fn test_split_respects_max_depth() {
    let config = OctreeConfig { max_depth: 3, ..small_config() };
    let mut world = TestWorld::new(config);
    for _ in 0..20 {
        world.insert(cube(Vec3::splat(80.0), 0.1));
    }
    assert!(world.octree.octants().all(|(_, octant)| octant.level() <= 3));
    world.assert_consistent();
}

#[test]
fn test_merge_after_removal() {
    let mut world = TestWorld::new(small_config());
    let pinned = world.octree.stats().octants;

    let mut keys = Vec::new();
    for i in 0..8 {
        let offset = Vec3::new(
            if i & 1 != 0 { 5.0 } else { -5.0 },
            if i & 2 != 0 { 5.0 } else { -5.0 },
            if i & 4 != 0 { 5.0 } else { -5.0 },
        );
        keys.push(world.insert(cube(Vec3::splat(75.0) + offset, 0.5)));
    }
    assert!(world.octree.stats().octants > pinned);

    for key in keys.drain(..7) {
        world.remove(key);
    }

    let stats = world.octree.stats();
    assert!(stats.merges >= 1);
    assert_eq!(stats.octants, pinned);
    world.assert_consistent();
}

#[test]
fn test_merge_only_below_threshold() {
    // split 4, merge 2
    let mut world = TestWorld::new(small_config());

    let mut keys = Vec::new();
    for i in 0..5 {
        let offset = Vec3::new(
            if i & 1 != 0 { 5.0 } else { -5.0 },
            if i & 2 != 0 { 5.0 } else { -5.0 },
            if i & 4 != 0 { 5.0 } else { -5.0 },
        );
        keys.push(world.insert(cube(Vec3::splat(75.0) + offset, 0.5)));
    }
    assert_eq!(world.octree.stats().splits, 1);

    for key in keys.drain(..3) {
        world.remove(key);
    }
    assert_eq!(world.octree.stats().merges, 0, "population equal to merge_threshold must stay split");
    world.assert_consistent();

    let key = keys.remove(0);
    world.remove(key);
    assert_eq!(world.octree.stats().merges, 1);
    world.assert_consistent();
}

#[test]
fn test_remove_missing_returns_none() {
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.insert(cube(Vec3::splat(10.0), 1.0));
    let id = world.placement[&key];
    assert!(world.octree.remove(key, id).is_some());
    assert!(world.octree.remove(key, id).is_none());
}

#[test]
fn test_update_entry_info() {
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.insert(cube(Vec3::splat(10.0), 1.0));
    let id = world.placement[&key];

    assert!(world.octree.update_entry_info(key, id, DrawableFlags::LIGHT, 0b10));
    let entry = world.octree.octant(id).unwrap().entries()[0];
    assert_eq!(entry.flags, DrawableFlags::LIGHT);
    assert_eq!(entry.view_mask, 0b10);
}

// ============================================================================
// Reinsertion
// ============================================================================

#[test]
fn test_small_move_changes_no_octant() {
    let pool = TaskPool::new(2).unwrap();
    let mut world = TestWorld::new(OctreeConfig::default());
    let keys: Vec<_> = (0..10)
        .map(|i| world.insert(cube(Vec3::new(100.0 + i as f32 * 10.0, 300.0, 300.0), 1.0)))
        .collect();
    let before = world.octree.stats().octant_changes;

    for &key in &keys {
        let moved = world.boxes[key].center() + Vec3::new(0.5, 0.0, 0.0);
        world.move_to(key, cube(moved, 1.0));
    }
    let report = world.reinsert(&pool, &keys);

    assert_eq!(report.processed, 10);
    assert_eq!(report.relocated, 0);
    assert_eq!(report.deferred, 0);
    assert_eq!(world.octree.stats().octant_changes, before);
    assert_eq!(report.bounds.len(), 10);
    world.assert_consistent();
}

#[test]
fn test_move_across_branches_is_deferred() {
    let pool = TaskPool::new(2).unwrap();
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.insert(cube(Vec3::new(500.0, 500.0, 500.0), 1.0));
    let from = world.placement[&key];

    world.move_to(key, cube(Vec3::new(-500.0, -500.0, -500.0), 1.0));
    let report = world.reinsert(&pool, &[key]);

    assert_eq!(report.deferred, 1);
    assert_eq!(report.relocated, 1);
    assert_eq!(report.partitions, 1);
    assert_ne!(world.placement[&key].branch(), from.branch());
    world.assert_consistent();
}

#[test]
fn test_move_within_branch_is_local() {
    let pool = TaskPool::new(2).unwrap();
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.insert(cube(Vec3::new(100.0, 100.0, 100.0), 1.0));

    world.move_to(key, cube(Vec3::new(900.0, 900.0, 900.0), 1.0));
    let report = world.reinsert(&pool, &[key]);

    assert_eq!(report.deferred, 0);
    assert_eq!(report.relocated, 1);
    world.assert_consistent();
}

#[test]
fn test_root_drawable_moves_into_world() {
    let pool = TaskPool::new(1).unwrap();
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.insert(cube(Vec3::splat(5000.0), 1.0));
    assert!(world.placement[&key].is_root());

    world.move_to(key, cube(Vec3::splat(200.0), 1.0));
    world.reinsert(&pool, &[key]);
    assert!(!world.placement[&key].is_root());
    world.assert_consistent();
}

#[test]
fn test_new_drawables_inserted_by_reinsert() {
    let pool = TaskPool::new(2).unwrap();
    let mut world = TestWorld::new(OctreeConfig::default());
    let key = world.boxes.insert(cube(Vec3::splat(40.0), 1.0));

    let report = world.reinsert(&pool, &[key]);
    assert_eq!(report.processed, 1);
    assert_eq!(report.relocated, 0);
    assert!(world.placement.contains_key(&key));
    world.assert_consistent();
}

#[test]
fn test_random_moves_keep_tree_consistent() {
    let pool = TaskPool::new(4).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let mut world = TestWorld::new(small_config());

    let keys: Vec<_> = (0..300)
        .map(|_| {
            let center = random_point(&mut rng, 95.0);
            let half = rng.random_range(0.1..4.0);
            world.insert(cube(center, half))
        })
        .collect();
    world.assert_consistent();

    for _ in 0..5 {
        for &key in &keys {
            let center = random_point(&mut rng, 95.0);
            let half = rng.random_range(0.1..4.0);
            world.move_to(key, cube(center, half));
        }
        world.reinsert(&pool, &keys);
        world.assert_consistent();
    }
}

#[test]
fn test_clustering_then_spreading_rebalances() {
    let pool = TaskPool::new(4).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let mut world = TestWorld::new(small_config());
    let pinned = world.octree.stats().octants;

    let keys: Vec<_> = (0..64)
        .map(|_| world.insert(cube(random_point(&mut rng, 95.0), 0.5)))
        .collect();

    // Cluster everything into one corner: splits.
    for &key in &keys {
        let center = Vec3::splat(80.0) + random_point(&mut rng, 10.0);
        world.move_to(key, cube(center, 0.2));
    }
    world.reinsert(&pool, &keys);
    assert!(world.octree.stats().splits >= 1);
    world.assert_consistent();

    // Remove everything: back to the pinned layout.
    for key in keys {
        world.remove(key);
    }
    assert!(world.octree.stats().merges >= 1);
    assert_eq!(world.octree.stats().octants, pinned);
}

// ============================================================================
// Queries
// ============================================================================

fn populated_world(seed: u64, count: usize) -> TestWorld {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = TestWorld::new(OctreeConfig::default());
    for _ in 0..count {
        let center = random_point(&mut rng, 1100.0);
        let half = rng.random_range(0.5..30.0);
        world.insert(cube(center, half));
    }
    world.insert(AABB::huge());
    world
}

#[test]
fn test_frustum_query_matches_brute_force() {
    let world = populated_world(1, 2000);
    let camera = Camera::perspective_look_at(
        Vec3::new(0.0, 50.0, 400.0), Vec3::new(100.0, 0.0, -200.0), Vec3::Y,
        std::f32::consts::FRAC_PI_3, 16.0 / 9.0, 0.5, 800.0,
    );
    let frustum = camera.frustum();

    let mut found = Vec::new();
    world.octree.query_frustum(frustum, DrawableFlags::empty(), u32::MAX, &mut found);

    let expected: Vec<_> = world.boxes.iter()
        .filter(|(_, bounds)| frustum.intersects_aabb(bounds))
        .map(|(key, _)| key)
        .collect();

    assert!(!expected.is_empty());
    assert_eq!(sorted(found), sorted(expected));
}

#[test]
fn test_box_query_matches_brute_force() {
    let world = populated_world(2, 1500);
    let volume = AABB::new(Vec3::new(-300.0, -100.0, -50.0), Vec3::new(250.0, 400.0, 600.0));

    let mut found = Vec::new();
    world.octree.query_box(&volume, DrawableFlags::empty(), u32::MAX, &mut found);

    let expected: Vec<_> = world.boxes.iter()
        .filter(|(_, bounds)| volume.intersects(bounds))
        .map(|(key, _)| key)
        .collect();
    assert_eq!(sorted(found), sorted(expected));
}

#[test]
fn test_sphere_query_matches_brute_force() {
    let world = populated_world(3, 1500);
    let sphere = Sphere::new(Vec3::new(200.0, -100.0, 50.0), 350.0);

    let mut found = Vec::new();
    world.octree.query_sphere(&sphere, DrawableFlags::empty(), u32::MAX, &mut found);

    let expected: Vec<_> = world.boxes.iter()
        .filter(|(_, bounds)| sphere.intersects_aabb(bounds))
        .map(|(key, _)| key)
        .collect();
    assert_eq!(sorted(found), sorted(expected));
}

#[test]
fn test_query_filters_flags_and_view_mask() {
    let mut world = TestWorld::new(OctreeConfig::default());
    let geometry = world.insert_with(cube(Vec3::splat(10.0), 1.0), DrawableFlags::GEOMETRY, 0b01);
    let caster = world.insert_with(cube(Vec3::splat(12.0), 1.0),
        DrawableFlags::GEOMETRY | DrawableFlags::CAST_SHADOWS, 0b01);
    let light = world.insert_with(cube(Vec3::splat(14.0), 1.0), DrawableFlags::LIGHT, 0b10);
    let volume = cube(Vec3::splat(12.0), 10.0);

    let mut found = Vec::new();
    world.octree.query_box(&volume, DrawableFlags::GEOMETRY, u32::MAX, &mut found);
    assert_eq!(sorted(found), sorted(vec![geometry, caster]));

    let mut found = Vec::new();
    world.octree.query_box(&volume, DrawableFlags::GEOMETRY | DrawableFlags::CAST_SHADOWS, u32::MAX, &mut found);
    assert_eq!(found, vec![caster]);

    let mut found = Vec::new();
    world.octree.query_box(&volume, DrawableFlags::empty(), 0b10, &mut found);
    assert_eq!(found, vec![light]);
}

// ============================================================================
// Raycast
// ============================================================================

fn box_refine(boxes: &SlotMap<DrawableKey, AABB>, ray: Ray) -> impl FnMut(&OctreeEntry, f32) -> Option<(f32, Vec3)> + '_ {
    move |entry, max_distance| {
        let bounds = boxes.get(entry.key)?;
        ray.hit_box(bounds).filter(|(t, _)| *t <= max_distance)
    }
}

#[test]
fn test_raycast_returns_sorted_hits() {
    let mut world = TestWorld::new(OctreeConfig::default());
    let far = world.insert(cube(Vec3::new(0.0, 0.0, -10.0), 0.5));
    let near = world.insert(cube(Vec3::new(0.0, 0.0, -1.0), 0.2));
    let mid = world.insert(cube(Vec3::new(0.0, 0.0, -5.0), 0.5));
    world.insert(cube(Vec3::new(50.0, 0.0, -5.0), 0.5));

    let ray = Ray::new(Vec3::new(0.0, 0.0, 0.0), Vec3::NEG_Z);
    let hits = world.octree.raycast(&ray, 100.0, DrawableFlags::empty(), u32::MAX, box_refine(&world.boxes, ray));

    let order: Vec<_> = hits.iter().map(|hit| hit.drawable).collect();
    assert_eq!(order, vec![near, mid, far]);
    assert!((hits[0].distance - 0.8).abs() < 1e-4);
    assert!((hits[0].position - Vec3::new(0.0, 0.0, -0.8)).length() < 1e-4);
    assert!((hits[0].normal - Vec3::Z).length() < 1e-4);
}

#[test]
fn test_raycast_single_returns_nearest() {
    let mut world = TestWorld::new(OctreeConfig::default());
    world.insert(cube(Vec3::new(0.0, 0.0, -10.0), 0.5));
    world.insert(cube(Vec3::new(0.0, 0.0, -5.0), 0.5));
    let near = world.insert(cube(Vec3::new(0.0, 0.0, -1.0), 0.2));

    let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
    let hit = world.octree
        .raycast_single(&ray, 100.0, DrawableFlags::empty(), u32::MAX, box_refine(&world.boxes, ray))
        .unwrap();
    assert_eq!(hit.drawable, near);
}

#[test]
fn test_raycast_respects_max_distance() {
    let mut world = TestWorld::new(OctreeConfig::default());
    world.insert(cube(Vec3::new(0.0, 0.0, -10.0), 0.5));

    let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
    let hit = world.octree.raycast_single(&ray, 5.0, DrawableFlags::empty(), u32::MAX, box_refine(&world.boxes, ray));
    assert!(hit.is_none());
}

#[test]
fn test_raycast_single_matches_brute_force() {
    let world = populated_world(5, 1000);
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..20 {
        let origin = random_point(&mut rng, 800.0);
        let direction = random_point(&mut rng, 1.0);
        let ray = Ray::new(origin, direction);

        let expected = world.boxes.iter()
            .filter(|(_, bounds)| bounds.size().x < 1.0e20)
            .filter_map(|(key, bounds)| ray.hit_distance(bounds).map(|t| (t, key)))
            .filter(|(t, _)| *t <= 2000.0)
            .min_by(|a, b| a.0.total_cmp(&b.0));

        // The huge box would always win; exclude it from both sides.
        let hit = world.octree.raycast_single(&ray, 2000.0, DrawableFlags::empty(), u32::MAX, |entry, max| {
            let bounds = world.boxes.get(entry.key)?;
            if bounds.size().x >= 1.0e20 {
                return None;
            }
            ray.hit_box(bounds).filter(|(t, _)| *t <= max)
        });

        match (expected, hit) {
            (None, None) => {}
            (Some((t, _)), Some(hit)) => assert!((t - hit.distance).abs() < 1e-3),
            (expected, hit) => panic!("mismatch: {:?} vs {:?}", expected, hit),
        }
    }
}
