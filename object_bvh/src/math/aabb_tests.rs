use glam::Vec3;
use super::*;

fn make_aabb(min: Vec3, max: Vec3) -> AABB {
    AABB { min, max }
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_from_points_encloses_all() {
    let aabb = AABB::from_points([
        Vec3::new(1.0, -2.0, 0.5),
        Vec3::new(-3.0, 4.0, 0.0),
        Vec3::new(0.0, 0.0, 2.0),
    ]).unwrap();

    assert_eq!(aabb.min, Vec3::new(-3.0, -2.0, 0.0));
    assert_eq!(aabb.max, Vec3::new(1.0, 4.0, 2.0));
}

#[test]
fn test_from_points_empty_is_none() {
    assert!(AABB::from_points(std::iter::empty()).is_none());
    assert!(AABB::EMPTY.is_empty());
}

#[test]
fn test_center_and_half_extents() {
    let aabb = AABB::from_center_half_extents(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, 1.0, 2.0));
    assert_eq!(aabb.center(), Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(aabb.half_extents(), Vec3::new(0.5, 1.0, 2.0));
    assert_eq!(aabb.longest_axis(), 2);
}

#[test]
fn test_union_with_empty_is_identity() {
    let a = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    assert_eq!(AABB::EMPTY.union(&a), a);
}

// ============================================================================
// Containment / intersection
// ============================================================================

#[test]
fn test_contains() {
    let big = make_aabb(Vec3::splat(-10.0), Vec3::splat(10.0));
    let small = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    let straddling = make_aabb(Vec3::splat(5.0), Vec3::splat(15.0));

    assert!(big.contains(&small));
    assert!(!small.contains(&big));
    assert!(!big.contains(&straddling));
    assert!(big.contains_point(Vec3::splat(10.0)));
    assert!(!big.contains_point(Vec3::new(10.5, 0.0, 0.0)));
}

#[test]
fn test_intersects() {
    let a = make_aabb(Vec3::splat(-2.0), Vec3::splat(2.0));
    let b = make_aabb(Vec3::splat(1.0), Vec3::splat(3.0));
    let c = make_aabb(Vec3::splat(5.0), Vec3::splat(7.0));

    assert!(a.intersects(&b));
    assert!(!a.intersects(&c));
}

#[test]
fn test_intersects_sphere() {
    let a = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    assert!(a.intersects_sphere(&BoundingSphere::new(Vec3::new(2.0, 0.0, 0.0), 1.0)));
    assert!(!a.intersects_sphere(&BoundingSphere::new(Vec3::new(3.0, 3.0, 0.0), 1.0)));
}
