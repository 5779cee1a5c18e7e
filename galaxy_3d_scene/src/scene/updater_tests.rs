use super::*;
use crate::math::AABB;
use crate::scene::drawable::DrawableKind;
use crate::scene::model::{SkinnedModel, StaticModel};
use crate::scene::spatial_node::NodeKey;
use glam::Vec3;

// ============================================================================
// Helpers
// ============================================================================

fn unit_box() -> AABB {
    AABB::new(Vec3::splat(-0.5), Vec3::splat(0.5))
}

fn spawn(scene: &mut Scene, position: Vec3) -> (NodeKey, DrawableKey) {
    let node = scene.create_node("object", None).unwrap();
    scene.set_position(node, position);
    let drawable = scene
        .create_drawable(node, DrawableKind::StaticModel(StaticModel::new(unit_box())))
        .unwrap();
    (node, drawable)
}

fn new_scene() -> Scene {
    Scene::new(&SceneConfig::default())
}

// ============================================================================
// Reinsertion
// ============================================================================

#[test]
fn test_update_without_changes() {
    let mut scene = new_scene();
    spawn(&mut scene, Vec3::ZERO);
    let mut updater = ParallelUpdater::new(2).unwrap();

    let stats = updater.update(&mut scene).unwrap();
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.partitions, 0);
    assert_eq!(stats.frame_number, 2);
    assert_eq!(scene.frame_number(), 2);
}

#[test]
fn test_update_refreshes_moved_drawables() {
    let mut scene = new_scene();
    let (node, drawable) = spawn(&mut scene, Vec3::new(100.0, 100.0, 100.0));
    let mut updater = ParallelUpdater::new(2).unwrap();

    scene.set_position(node, Vec3::new(101.0, 100.0, 100.0));
    let stats = updater.update(&mut scene).unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.relocated, 0);
    assert_eq!(scene.pending_reinsertions(), 0);

    let drawable = scene.drawable(drawable).unwrap();
    assert_eq!(drawable.state(), DrawableState::Inserted);
    assert!((drawable.world_bounds().center() - Vec3::new(101.0, 100.0, 100.0)).length() < 1e-4);
    assert!((drawable.world_position() - Vec3::new(101.0, 100.0, 100.0)).length() < 1e-4);
}

#[test]
fn test_update_moves_children_with_parent() {
    let mut scene = new_scene();
    let parent = scene.create_node("parent", None).unwrap();
    let mut drawables = Vec::new();
    for i in 0..5 {
        let node = scene.create_node("child", Some(parent)).unwrap();
        scene.set_position(node, Vec3::new(i as f32 * 2.0, 0.0, 0.0));
        drawables.push(scene
            .create_drawable(node, DrawableKind::StaticModel(StaticModel::new(unit_box())))
            .unwrap());
    }
    let mut updater = ParallelUpdater::new(4).unwrap();

    scene.set_position(parent, Vec3::new(0.0, 400.0, 0.0));
    let stats = updater.update(&mut scene).unwrap();
    assert_eq!(stats.processed, 5);

    for (i, &key) in drawables.iter().enumerate() {
        let center = scene.drawable(key).unwrap().world_bounds().center();
        assert!((center - Vec3::new(i as f32 * 2.0, 400.0, 0.0)).length() < 1e-4);
        let octant = scene.drawable(key).unwrap().octant().unwrap();
        assert!(scene.octree().is_valid_placement(octant, scene.drawable(key).unwrap().world_bounds()));
    }
}

#[test]
fn test_update_defers_cross_branch_moves() {
    let mut scene = new_scene();
    let (node, drawable) = spawn(&mut scene, Vec3::new(300.0, 300.0, 300.0));
    let mut updater = ParallelUpdater::new(2).unwrap();

    scene.set_position(node, Vec3::new(-300.0, 300.0, 300.0));
    let stats = updater.update(&mut scene).unwrap();

    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.relocated, 1);
    let octant = scene.drawable(drawable).unwrap().octant().unwrap();
    assert!(scene.octree().octant(octant).unwrap().center().x < 0.0);
}

#[test]
fn test_update_skips_drawables_disabled_after_queueing() {
    let mut scene = new_scene();
    let (node, drawable) = spawn(&mut scene, Vec3::ZERO);
    let mut updater = ParallelUpdater::new(1).unwrap();

    scene.set_position(node, Vec3::ONE);
    scene.set_enabled(node, false);
    let stats = updater.update(&mut scene).unwrap();

    assert_eq!(stats.processed, 0);
    assert_eq!(scene.drawable(drawable).unwrap().state(), DrawableState::Unattached);
}

#[test]
fn test_update_handles_requeued_duplicates() {
    let mut scene = new_scene();
    let (node, drawable) = spawn(&mut scene, Vec3::ZERO);
    let mut updater = ParallelUpdater::new(1).unwrap();

    scene.set_position(node, Vec3::ONE);
    scene.set_enabled(node, false);
    scene.set_enabled(node, true);
    scene.set_position(node, Vec3::new(2.0, 0.0, 0.0));
    assert_eq!(scene.pending_reinsertions(), 2);

    let stats = updater.update(&mut scene).unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(scene.octree().drawable_count(), 1);
    let center = scene.drawable(drawable).unwrap().world_bounds().center();
    assert!((center - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-4);
}

// ============================================================================
// Per-frame Update Calls
// ============================================================================

#[test]
fn test_update_call_only_when_visible_or_forced() {
    let mut scene = new_scene();
    let node = scene.create_node("character", None).unwrap();
    let key = scene
        .create_drawable(node, DrawableKind::SkinnedModel(SkinnedModel::new(unit_box())))
        .unwrap();
    let mut updater = ParallelUpdater::new(1).unwrap();

    let stats = updater.update(&mut scene).unwrap();
    assert_eq!(stats.update_calls, 0);

    scene.modify_drawable(key, |drawable| drawable.set_update_invisible(true));
    let stats = updater.update(&mut scene).unwrap();
    assert_eq!(stats.update_calls, 1);
    assert_eq!(scene.drawable(key).unwrap().last_update_frame_number(), stats.frame_number);
    assert_eq!(scene.drawable(key).unwrap().skinned_model().unwrap().animation_updates(), 1);
}

#[test]
fn test_bone_bounds_change_reinserts() {
    let mut scene = new_scene();
    let node = scene.create_node("character", None).unwrap();
    let key = scene
        .create_drawable(node, DrawableKind::SkinnedModel(SkinnedModel::new(unit_box())))
        .unwrap();
    let mut updater = ParallelUpdater::new(1).unwrap();

    scene.modify_drawable(key, |drawable| {
        drawable.set_bone_bounding_box(AABB::new(Vec3::splat(-4.0), Vec3::splat(4.0)))
    });
    let stats = updater.update(&mut scene).unwrap();

    assert_eq!(stats.processed, 1);
    assert!((scene.drawable(key).unwrap().world_bounds().size() - Vec3::splat(8.0)).length() < 1e-4);
}

#[test]
fn test_from_config_uses_worker_threads() {
    let config = SceneConfig { worker_threads: 3, ..SceneConfig::default() };
    let updater = ParallelUpdater::from_config(&config).unwrap();
    assert_eq!(updater.num_threads(), 3);
}
