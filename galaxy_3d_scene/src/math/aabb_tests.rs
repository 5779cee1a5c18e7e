use glam::{Mat4, Quat, Vec3};
use crate::math::{Ray, Sphere};
use super::*;

fn make_aabb(min: Vec3, max: Vec3) -> AABB {
    AABB { min, max }
}

// ============================================================================
// Containment / intersection
// ============================================================================

#[test]
fn test_aabb_contains() {
    let big = make_aabb(Vec3::splat(-10.0), Vec3::splat(10.0));
    let small = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    let straddling = make_aabb(Vec3::new(5.0, 5.0, 5.0), Vec3::new(15.0, 15.0, 15.0));

    assert!(big.contains(&small));
    assert!(!small.contains(&big));
    assert!(!big.contains(&straddling));
}

#[test]
fn test_aabb_contains_is_closed() {
    let a = make_aabb(Vec3::ZERO, Vec3::ONE);
    assert!(a.contains(&a));
    assert!(a.contains_point(Vec3::ONE));
}

#[test]
fn test_aabb_intersects_touching() {
    let a = make_aabb(Vec3::splat(-2.0), Vec3::splat(2.0));
    let touching = make_aabb(Vec3::new(2.0, -1.0, -1.0), Vec3::new(3.0, 1.0, 1.0));
    let disjoint = make_aabb(Vec3::splat(5.0), Vec3::splat(7.0));

    assert!(a.intersects(&touching));
    assert!(!a.intersects(&disjoint));
}

// ============================================================================
// Transform
// ============================================================================

#[test]
fn test_aabb_transformed_translation_scale() {
    let local = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    let m = Mat4::from_scale_rotation_translation(Vec3::splat(2.0), Quat::IDENTITY, Vec3::new(10.0, 0.0, 0.0));
    let world = local.transformed(&m);

    assert!((world.min - Vec3::new(8.0, -2.0, -2.0)).length() < 1e-5);
    assert!((world.max - Vec3::new(12.0, 2.0, 2.0)).length() < 1e-5);
}

#[test]
fn test_aabb_transformed_rotation_grows_box() {
    let local = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    let m = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
    let world = local.transformed(&m);

    let expected = std::f32::consts::SQRT_2;
    assert!((world.max.x - expected).abs() < 1e-5);
    assert!((world.max.y - 1.0).abs() < 1e-5);
}

// ============================================================================
// Degenerate input
// ============================================================================

#[test]
fn test_with_min_size_inflates_point_box() {
    let point = make_aabb(Vec3::splat(3.0), Vec3::splat(3.0));
    let fixed = point.with_min_size(0.5);

    assert!(fixed.is_valid());
    assert!((fixed.size() - Vec3::splat(0.5)).length() < 1e-6);
    assert_eq!(fixed.center(), Vec3::splat(3.0));
}

#[test]
fn test_with_min_size_reorders_inverted_box() {
    let inverted = make_aabb(Vec3::splat(2.0), Vec3::splat(-2.0));
    let fixed = inverted.with_min_size(0.01);

    assert_eq!(fixed.min, Vec3::splat(-2.0));
    assert_eq!(fixed.max, Vec3::splat(2.0));
}

#[test]
fn test_from_points_empty_is_none() {
    assert!(AABB::from_points(&[]).is_none());
    let b = AABB::from_points(&[Vec3::ZERO, Vec3::new(1.0, -1.0, 2.0)]).unwrap();
    assert_eq!(b.min, Vec3::new(0.0, -1.0, 0.0));
    assert_eq!(b.max, Vec3::new(1.0, 0.0, 2.0));
}

// ============================================================================
// Ray / sphere helpers
// ============================================================================

#[test]
fn test_ray_hits_box_front_face() {
    let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
    let aabb = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));

    let (t, normal) = ray.hit_box(&aabb).unwrap();
    assert!((t - 9.0).abs() < 1e-5);
    assert_eq!(normal, Vec3::Z);
}

#[test]
fn test_ray_misses_box_behind() {
    let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::Z);
    let aabb = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    assert!(ray.hit_distance(&aabb).is_none());
}

#[test]
fn test_ray_grazing_edge_counts_as_hit() {
    let ray = Ray::new(Vec3::new(1.0, 1.0, 10.0), Vec3::NEG_Z);
    let aabb = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    assert!(ray.hit_distance(&aabb).is_some());
}

#[test]
fn test_ray_inside_box_hits_at_zero() {
    let ray = Ray::new(Vec3::ZERO, Vec3::X);
    let aabb = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    assert_eq!(ray.hit_distance(&aabb), Some(0.0));
}

#[test]
fn test_ray_hits_sphere() {
    let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
    let sphere = Sphere::new(Vec3::ZERO, 2.0);
    let t = ray.hit_sphere(&sphere).unwrap();
    assert!((t - 8.0).abs() < 1e-5);
}

#[test]
fn test_sphere_intersects_aabb() {
    let sphere = Sphere::new(Vec3::new(3.0, 0.0, 0.0), 1.0);
    assert!(sphere.intersects_aabb(&make_aabb(Vec3::splat(-2.0), Vec3::splat(2.0))));
    assert!(!sphere.intersects_aabb(&make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0))));
}
