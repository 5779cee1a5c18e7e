use std::sync::Arc;
use glam::{Mat4, Vec3};
use slotmap::SlotMap;
use crate::render::{BlendMode, GeometryId, MaterialPass, PassType};
use crate::scene::DrawableKey;
use super::*;

fn opaque_pass(id: u32, program_id: u32) -> Arc<MaterialPass> {
    Arc::new(MaterialPass::new(id, program_id, PassType::Opaque, BlendMode::Replace))
}

fn drawable_key() -> DrawableKey {
    let mut keys: SlotMap<DrawableKey, ()> = SlotMap::with_key();
    keys.insert(())
}

fn translation(x: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
}

// ============================================================================
// Instancing
// ============================================================================

#[test]
fn test_hundred_static_and_one_complex_give_two_entries() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    for i in 0..100 {
        queue.push(Batch::new_static(pass.clone(), GeometryId(7), 0, translation(i as f32), 1.0));
    }
    queue.push(Batch::new_complex(pass.clone(), GeometryId(7), 0, drawable_key(), 1.0));

    queue.sort(BatchSortMode::State, true);

    assert_eq!(queue.len(), 2);
    let instanced = &queue.batches()[0];
    assert_eq!(instanced.content, BatchContent::Instanced { start: 0, count: 100 });
    assert_eq!(queue.batches()[1].batch_type(), BatchType::Complex);
    assert_eq!(queue.instance_transforms().len(), 100);
    assert_eq!(queue.instance_data().len(), 100 * 64);
}

#[test]
fn test_instance_transforms_keep_insertion_order() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    for i in 0..5 {
        queue.push(Batch::new_static(pass.clone(), GeometryId(1), 0, translation(i as f32), 0.0));
    }
    queue.sort(BatchSortMode::State, true);

    let xs: Vec<f32> = queue.instance_transforms().iter().map(|m| m.w_axis.x).collect();
    assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_single_static_batch_is_not_instanced() {
    let mut queue = BatchQueue::new();
    queue.push(Batch::new_static(opaque_pass(1, 1), GeometryId(1), 0, Mat4::IDENTITY, 0.0));
    queue.push(Batch::new_static(opaque_pass(2, 1), GeometryId(1), 0, Mat4::IDENTITY, 0.0));
    queue.sort(BatchSortMode::State, true);

    assert_eq!(queue.len(), 2);
    assert!(queue.batches().iter().all(|b| b.batch_type() == BatchType::Static));
    assert!(queue.instance_transforms().is_empty());
}

#[test]
fn test_complex_batches_never_merge() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    for _ in 0..3 {
        queue.push(Batch::new_complex(pass.clone(), GeometryId(1), 0, drawable_key(), 0.0));
    }
    queue.sort(BatchSortMode::State, true);
    assert_eq!(queue.len(), 3);
}

#[test]
fn test_different_geom_index_splits_run() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    for i in 0..4 {
        queue.push(Batch::new_static(pass.clone(), GeometryId(1), i % 2, Mat4::IDENTITY, 0.0));
    }
    queue.sort(BatchSortMode::State, true);

    assert_eq!(queue.len(), 2);
    for batch in queue.batches() {
        assert!(matches!(batch.content, BatchContent::Instanced { count: 2, .. }));
    }
}

#[test]
fn test_sort_without_instancing_keeps_all() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    for _ in 0..10 {
        queue.push(Batch::new_static(pass.clone(), GeometryId(1), 0, Mat4::IDENTITY, 0.0));
    }
    queue.sort(BatchSortMode::State, false);
    assert_eq!(queue.len(), 10);
}

// ============================================================================
// Sort order
// ============================================================================

#[test]
fn test_state_sort_groups_by_program_then_pass() {
    let mut queue = BatchQueue::new();
    queue.push(Batch::new_static(opaque_pass(2, 9), GeometryId(1), 0, Mat4::IDENTITY, 0.0));
    queue.push(Batch::new_static(opaque_pass(5, 1), GeometryId(3), 0, Mat4::IDENTITY, 0.0));
    queue.push(Batch::new_static(opaque_pass(1, 1), GeometryId(8), 0, Mat4::IDENTITY, 0.0));

    queue.sort(BatchSortMode::State, false);

    let order: Vec<(u32, u32)> = queue.batches().iter()
        .map(|b| (b.pass.program_id(), b.pass.id()))
        .collect();
    assert_eq!(order, vec![(1, 1), (1, 5), (9, 2)]);
}

#[test]
fn test_back_to_front_sort() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    for distance in [5.0, 1.0, 10.0, 3.0] {
        queue.push(Batch::new_static(pass.clone(), GeometryId(1), 0, Mat4::IDENTITY, distance));
    }
    queue.sort(BatchSortMode::BackToFront, false);

    let distances: Vec<f32> = queue.batches().iter().map(|b| b.distance).collect();
    assert_eq!(distances, vec![10.0, 5.0, 3.0, 1.0]);
}

#[test]
fn test_front_to_back_sort_handles_negative_distance() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    for distance in [2.0, -1.0, 0.0, 7.5] {
        queue.push(Batch::new_static(pass.clone(), GeometryId(1), 0, Mat4::IDENTITY, distance));
    }
    queue.sort(BatchSortMode::FrontToBack, false);

    let distances: Vec<f32> = queue.batches().iter().map(|b| b.distance).collect();
    assert_eq!(distances, vec![-1.0, 0.0, 2.0, 7.5]);
}

#[test]
fn test_equal_keys_keep_insertion_order() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    for i in 0..300 {
        queue.push(Batch::new_static(pass.clone(), GeometryId(1), 0, translation(i as f32), 4.0));
    }
    queue.sort(BatchSortMode::BackToFront, false);

    for (i, batch) in queue.batches().iter().enumerate() {
        let BatchContent::Static { world_transform } = batch.content else {
            panic!("expected a static batch");
        };
        assert_eq!(world_transform.w_axis.x, i as f32);
    }
}

#[test]
fn test_clear_empties_queue() {
    let pass = opaque_pass(1, 1);
    let mut queue = BatchQueue::new();
    queue.push(Batch::new_static(pass.clone(), GeometryId(1), 0, Mat4::IDENTITY, 0.0));
    queue.push(Batch::new_static(pass, GeometryId(1), 0, Mat4::IDENTITY, 0.0));
    queue.sort(BatchSortMode::State, true);
    assert!(queue.has_batches());

    queue.clear();
    assert!(queue.is_empty());
    assert!(queue.instance_transforms().is_empty());
}

#[test]
fn test_sortable_distance_is_monotonic() {
    let values = [-100.0f32, -1.0, -0.0, 0.0, 0.5, 1.0, 1000.0, f32::INFINITY];
    for pair in values.windows(2) {
        assert!(sortable_distance(pair[0]) <= sortable_distance(pair[1]));
    }
}
