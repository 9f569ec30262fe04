/// Tests for ObjectBvh
///
/// End-to-end behavior of the index over a small scene: construction,
/// queries, raycasts, refit and diagnostics.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashSet;
use super::*;
use crate::Error;
use crate::scene::{BatchedInstance, Geometry, GeometryKey};

// ============================================================================
// Helpers
// ============================================================================

struct TestScene {
    scene: Scene,
    root: EntityKey,
    unit_box: GeometryKey,
}

impl TestScene {
    fn new() -> Self {
        let mut scene = Scene::new();
        let unit_box = scene.add_geometry(Geometry::cuboid("unit_box", Vec3::ONE));
        let root = scene.create_group("root", Mat4::IDENTITY);
        Self { scene, root, unit_box }
    }

    fn mesh_at(&mut self, name: &str, position: Vec3) -> EntityKey {
        let key = self.scene.create_mesh(name, self.unit_box, Mat4::from_translation(position));
        self.scene.add_child(self.root, key);
        key
    }

    fn instanced_row(&mut self, name: &str, count: usize, spacing: f32) -> EntityKey {
        let matrices = (0..count)
            .map(|i| Mat4::from_translation(Vec3::new(i as f32 * spacing, 0.0, 0.0)))
            .collect();
        let key = self.scene.create_instanced(name, self.unit_box, Mat4::IDENTITY, matrices);
        self.scene.add_child(self.root, key);
        key
    }

    fn build(&self, desc: ObjectBvhDesc) -> ObjectBvh {
        ObjectBvh::from_root(&self.scene, self.root, desc).unwrap()
    }
}

/// Accepts every node as fully inside
struct Everything {
    hits: Vec<(PrimitiveHit, bool)>,
}

impl ObjectShapecast for Everything {
    fn intersects_bounds(&mut self, _bounds: &AABB, _is_leaf: bool, _depth: u32) -> BoundsTest {
        BoundsTest::Inside
    }

    fn intersects_object(&mut self, hit: PrimitiveHit, contained: bool, _depth: u32) -> bool {
        self.hits.push((hit, contained));
        false
    }
}

fn entities_of(hits: &[PrimitiveHit]) -> FxHashSet<EntityKey> {
    hits.iter().map(|hit| hit.entity).collect()
}

fn key_set(keys: &[EntityKey]) -> FxHashSet<EntityKey> {
    keys.iter().copied().collect()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_empty_index() {
    let test = TestScene::new();
    let bvh = test.build(ObjectBvhDesc::default());

    assert_eq!(bvh.root_ranges(), vec![PrimitiveRange { offset: 0, count: 0 }]);
    assert!(bvh.objects().is_empty());
    assert!(bvh.primitives().is_empty());
    assert_eq!(bvh.diagnostics(), BvhDiagnostics::default());

    let mut everything = Everything { hits: Vec::new() };
    assert!(!bvh.shapecast(&mut everything));
    assert!(everything.hits.is_empty());
}

#[test]
fn test_empty_index_queries() {
    let mut test = TestScene::new();
    test.mesh_at("unreachable", Vec3::ZERO);
    let mut bvh = ObjectBvh::new(&test.scene, &[], ObjectBvhDesc::default()).unwrap();

    assert!(bvh.query_aabb(&AABB::new(Vec3::splat(-1e6), Vec3::splat(1e6))).is_empty());
    let mut hits = Vec::new();
    bvh.raycast(&test.scene, &Ray::new(Vec3::ZERO, Vec3::X), &mut hits).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_singles_and_instances_count() {
    let mut test = TestScene::new();
    for i in 0..3 {
        test.mesh_at(&format!("mesh_{}", i), Vec3::new(0.0, i as f32 * 5.0, 0.0));
    }
    test.instanced_row("crowd", 100, 3.0);
    let bvh = test.build(ObjectBvhDesc::default());

    assert_eq!(bvh.objects().len(), 4);
    assert_eq!(bvh.primitives().len(), 103);
    assert_eq!(bvh.root_ranges(), vec![PrimitiveRange { offset: 0, count: 103 }]);

    // Every (entity, instance) pair appears exactly once after reordering
    let pairs: FxHashSet<(u32, Option<u32>)> = (0..103)
        .map(|i| {
            let hit = bvh.primitive_hit(i).unwrap();
            (hit.entity_index, hit.instance)
        })
        .collect();
    assert_eq!(pairs.len(), 103);
    assert!(pairs.contains(&(3, Some(99))));
}

#[test]
fn test_build_is_deterministic() {
    let mut test = TestScene::new();
    test.mesh_at("a", Vec3::new(4.0, 0.0, 0.0));
    test.instanced_row("crowd", 40, 2.5);
    test.mesh_at("b", Vec3::new(-4.0, 0.0, 0.0));

    let first = test.build(ObjectBvhDesc::default());
    let second = test.build(ObjectBvhDesc::default());

    assert_eq!(first.objects().as_slice(), second.objects().as_slice());
    assert_eq!(first.primitives(), second.primitives());
}

#[test]
fn test_unknown_root() {
    let mut test = TestScene::new();
    let stale = test.mesh_at("stale", Vec3::ZERO);
    test.scene.remove_entity(stale);

    let result = ObjectBvh::from_root(&test.scene, stale, ObjectBvhDesc::default());
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_compute_primitive_bounds_matches_tree() {
    let mut test = TestScene::new();
    test.instanced_row("crowd", 20, 4.0);
    let mut bvh = test.build(ObjectBvhDesc::default());

    let mut target = vec![0.0f32; 20 * 6];
    bvh.compute_primitive_bounds(&test.scene, 0, 20, &mut target, 0).unwrap();

    for i in 0..20 {
        let row = &target[i * 6..i * 6 + 6];
        let aabb = AABB::from_center_half_extents(
            Vec3::new(row[0], row[2], row[4]),
            Vec3::new(row[1], row[3], row[5]),
        );
        assert_eq!(bvh.tree().primitive_bounds(i), Some(aabb));
    }
}

// ============================================================================
// Shapecast and queries
// ============================================================================

#[test]
fn test_shapecast_inside_reports_everything_contained() {
    let mut test = TestScene::new();
    test.mesh_at("a", Vec3::ZERO);
    test.instanced_row("crowd", 30, 3.0);
    let bvh = test.build(ObjectBvhDesc::default());

    let mut everything = Everything { hits: Vec::new() };
    assert!(!bvh.shapecast(&mut everything));

    assert_eq!(everything.hits.len(), 31);
    assert!(everything.hits.iter().all(|&(_, contained)| contained));
}

#[test]
fn test_query_aabb_finds_instances() {
    let mut test = TestScene::new();
    let crowd = test.instanced_row("crowd", 50, 10.0);
    let bvh = test.build(ObjectBvhDesc::default());

    let hits = bvh.query_aabb(&AABB::new(Vec3::new(195.0, -1.0, -1.0), Vec3::new(205.0, 1.0, 1.0)));

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity, crowd);
    assert_eq!(hits[0].instance, Some(20));
}

#[test]
fn test_query_sphere() {
    let mut test = TestScene::new();
    let near = test.mesh_at("near", Vec3::new(3.0, 0.0, 0.0));
    test.mesh_at("far", Vec3::new(30.0, 0.0, 0.0));
    let bvh = test.build(ObjectBvhDesc::default());

    let hits = bvh.query_sphere(&BoundingSphere::new(Vec3::ZERO, 2.0));

    assert_eq!(entities_of(&hits), key_set(&[near]));
}

#[test]
fn test_query_frustum() {
    let mut test = TestScene::new();
    let ahead = test.mesh_at("ahead", Vec3::new(0.0, 0.0, -10.0));
    test.mesh_at("behind", Vec3::new(0.0, 0.0, 10.0));
    test.mesh_at("aside", Vec3::new(50.0, 0.0, -10.0));
    let bvh = test.build(ObjectBvhDesc::default());

    let projection = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
    let frustum = Frustum::from_view_projection(&(projection * view));

    let hits = bvh.query_frustum(&frustum);
    assert_eq!(entities_of(&hits), key_set(&[ahead]));
}

#[test]
fn test_resolve_range() {
    let mut test = TestScene::new();
    test.instanced_row("crowd", 5, 3.0);
    let bvh = test.build(ObjectBvhDesc::default());

    let all = bvh.resolve_range(0, 5);
    assert_eq!(all.len(), 5);
    assert!(bvh.resolve_range(3, 100).len() == 2);
    assert!(bvh.resolve_range(5, 1).is_empty());
}

#[test]
fn test_collapsed_instances() {
    let mut test = TestScene::new();
    let crowd = test.instanced_row("crowd", 10, 3.0);
    let bvh = test.build(ObjectBvhDesc {
        include_instances: false,
        ..Default::default()
    });

    assert_eq!(bvh.primitives().len(), 1);
    let hits = bvh.query_aabb(&AABB::new(Vec3::new(26.0, -1.0, -1.0), Vec3::new(28.0, 1.0, 1.0)));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity, crowd);
    assert_eq!(hits[0].instance, None);
}

#[test]
fn test_frame_matrix() {
    let mut test = TestScene::new();
    let moved = test.mesh_at("moved", Vec3::new(100.0, 0.0, 0.0));
    let bvh = test.build(ObjectBvhDesc {
        matrix: Some(Mat4::from_translation(Vec3::new(100.0, 0.0, 0.0))),
        ..Default::default()
    });

    let hits = bvh.query_aabb(&AABB::new(Vec3::splat(-0.5), Vec3::splat(0.5)));
    assert_eq!(entities_of(&hits), key_set(&[moved]));
}

#[test]
fn test_singular_frame_matrix_is_rejected() {
    let mut test = TestScene::new();
    test.mesh_at("flat", Vec3::ZERO);

    for matrix in [
        Mat4::from_scale(Vec3::new(1.0, 1.0, 0.0)),
        Mat4::ZERO,
        Mat4::from_translation(Vec3::new(f32::NAN, 0.0, 0.0)),
    ] {
        let desc = ObjectBvhDesc { matrix: Some(matrix), ..Default::default() };
        let result = ObjectBvh::from_root(&test.scene, test.root, desc);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}

// ============================================================================
// Raycast
// ============================================================================

#[test]
fn test_raycast_sorted_by_distance() {
    let mut test = TestScene::new();
    let far = test.mesh_at("far", Vec3::new(20.0, 0.0, 0.0));
    let near = test.mesh_at("near", Vec3::new(5.0, 0.0, 0.0));
    let mid = test.mesh_at("mid", Vec3::new(10.0, 0.0, 0.0));
    test.mesh_at("off_axis", Vec3::new(10.0, 10.0, 0.0));
    let mut bvh = test.build(ObjectBvhDesc::default());

    let mut hits = Vec::new();
    bvh.raycast(&test.scene, &Ray::new(Vec3::ZERO, Vec3::X), &mut hits).unwrap();

    let order: Vec<_> = hits.iter().map(|h| h.hit.entity).collect();
    assert_eq!(order, vec![near, mid, far]);
    assert!((hits[0].distance - (5.0 - 3.0f32.sqrt())).abs() < 1e-4);
    assert!(hits[0].point.abs_diff_eq(Vec3::new(hits[0].distance, 0.0, 0.0), 1e-5));
}

#[test]
fn test_raycast_appends() {
    let mut test = TestScene::new();
    test.mesh_at("a", Vec3::new(5.0, 0.0, 0.0));
    let mut bvh = test.build(ObjectBvhDesc::default());

    let mut hits = Vec::new();
    bvh.raycast(&test.scene, &Ray::new(Vec3::ZERO, Vec3::X), &mut hits).unwrap();
    bvh.raycast(&test.scene, &Ray::new(Vec3::ZERO, Vec3::X), &mut hits).unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn test_raycast_skips_hidden() {
    let mut test = TestScene::new();
    let hidden = test.mesh_at("hidden", Vec3::new(5.0, 0.0, 0.0));
    let slots = vec![
        BatchedInstance {
            geometry: test.unit_box,
            matrix: Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)),
            visible: false,
        },
        BatchedInstance {
            geometry: test.unit_box,
            matrix: Mat4::from_translation(Vec3::new(15.0, 0.0, 0.0)),
            visible: true,
        },
    ];
    let batch = test.scene.create_batched("batch", Mat4::IDENTITY, slots);
    test.scene.add_child(test.root, batch);
    test.scene.set_visible(hidden, false);
    let mut bvh = test.build(ObjectBvhDesc::default());

    let mut hits = Vec::new();
    bvh.raycast(&test.scene, &Ray::new(Vec3::ZERO, Vec3::X), &mut hits).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].hit.entity, batch);
    assert_eq!(hits[0].hit.instance, Some(1));
}

#[test]
fn test_precise_raycast_hits_triangles() {
    let mut test = TestScene::new();
    let target = test.mesh_at("target", Vec3::new(10.0, 0.0, 0.0));
    let mut bvh = test.build(ObjectBvhDesc { precise: true, ..Default::default() });

    let mut hits = Vec::new();
    bvh.raycast(&test.scene, &Ray::new(Vec3::new(0.0, 0.3, 0.2), Vec3::X), &mut hits).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].hit.entity, target);
    assert!((hits[0].distance - 9.0).abs() < 1e-4);

    // Inside the bounding sphere, above the box
    hits.clear();
    bvh.raycast(&test.scene, &Ray::new(Vec3::new(0.0, 1.5, 0.0), Vec3::X), &mut hits).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_collapsed_raycast_reports_instance() {
    let mut test = TestScene::new();
    test.instanced_row("crowd", 4, 10.0);
    let mut bvh = test.build(ObjectBvhDesc {
        include_instances: false,
        ..Default::default()
    });

    let mut hits = Vec::new();
    bvh.raycast(&test.scene, &Ray::new(Vec3::new(20.0, 10.0, 0.0), Vec3::NEG_Y), &mut hits).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].hit.instance, Some(2));
}

#[test]
fn test_precise_raycast_on_lines_is_not_implemented() {
    let mut test = TestScene::new();
    let lines = test.scene.add_geometry(Geometry::new(
        "lines",
        vec![Vec3::new(-1.0, -0.5, -0.5), Vec3::new(1.0, 0.5, 0.5)],
        None,
        PrimitiveTopology::Lines,
    ));
    let key = test.scene.create_mesh("wire", lines, Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
    test.scene.add_child(test.root, key);
    let mut bvh = test.build(ObjectBvhDesc { precise: true, ..Default::default() });

    let mut hits = Vec::new();
    let result = bvh.raycast(&test.scene, &Ray::new(Vec3::ZERO, Vec3::X), &mut hits);

    assert!(matches!(result, Err(Error::NotImplemented(_))));
    assert!(hits.is_empty());
}

#[test]
fn test_raycast_rejects_degenerate_ray() {
    let mut test = TestScene::new();
    test.mesh_at("target", Vec3::new(5.0, 0.0, 0.0));
    let mut bvh = test.build(ObjectBvhDesc::default());

    let mut hits = Vec::new();
    for ray in [
        Ray::new(Vec3::ZERO, Vec3::ZERO),
        Ray::new(Vec3::new(f32::INFINITY, 0.0, 0.0), Vec3::X),
        Ray { origin: Vec3::ZERO, direction: Vec3::new(2.0, 0.0, 0.0) },
    ] {
        let result = bvh.raycast(&test.scene, &ray, &mut hits);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
    assert!(hits.is_empty());
}

// ============================================================================
// Refit
// ============================================================================

#[test]
fn test_refit_follows_transforms() {
    let mut test = TestScene::new();
    let mover = test.mesh_at("mover", Vec3::ZERO);
    test.instanced_row("crowd", 20, 3.0);
    let mut bvh = test.build(ObjectBvhDesc::default());
    let node_count = bvh.diagnostics().node_count;

    let destination = AABB::new(Vec3::new(-1.0, 99.0, -1.0), Vec3::new(1.0, 101.0, 1.0));
    test.scene.set_world_matrix(mover, Mat4::from_translation(Vec3::new(0.0, 100.0, 0.0)));
    assert!(bvh.query_aabb(&destination).is_empty());

    bvh.refit(&test.scene).unwrap();
    let hits = bvh.query_aabb(&destination);
    assert_eq!(entities_of(&hits), key_set(&[mover]));
    assert_eq!(bvh.diagnostics().node_count, node_count);
}

#[test]
fn test_refit_follows_instance_transforms() {
    let mut test = TestScene::new();
    let crowd = test.instanced_row("crowd", 5, 3.0);
    let mut bvh = test.build(ObjectBvhDesc::default());

    test.scene.set_instance_matrix(crowd, 3, Mat4::from_translation(Vec3::new(0.0, 0.0, 50.0)));
    bvh.refit(&test.scene).unwrap();

    let hits = bvh.query_aabb(&AABB::new(Vec3::new(-1.0, -1.0, 49.0), Vec3::new(1.0, 1.0, 51.0)));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].instance, Some(3));
}

#[test]
fn test_refit_rejects_topology_changes() {
    let mut test = TestScene::new();
    let crowd = test.instanced_row("crowd", 5, 3.0);
    let dropped = test.mesh_at("dropped", Vec3::ZERO);
    let mut bvh = test.build(ObjectBvhDesc::default());
    bvh.refit(&test.scene).unwrap();

    test.scene.push_instance(crowd, Mat4::IDENTITY);
    assert!(matches!(bvh.refit(&test.scene), Err(Error::TopologyChanged(_))));

    let mut bvh = test.build(ObjectBvhDesc::default());
    test.scene.remove_entity(dropped);
    assert!(matches!(bvh.refit(&test.scene), Err(Error::TopologyChanged(_))));
}

#[test]
fn test_invalidate_geometry_bounds() {
    let mut test = TestScene::new();
    test.mesh_at("a", Vec3::ZERO);
    let mut bvh = test.build(ObjectBvhDesc::default());
    let probe = AABB::new(Vec3::new(9.0, -0.5, -0.5), Vec3::new(9.5, 0.5, 0.5));

    test.scene
        .geometry_mut(test.unit_box)
        .unwrap()
        .set_positions(vec![Vec3::splat(-10.0), Vec3::splat(10.0)]);

    bvh.refit(&test.scene).unwrap();
    assert!(bvh.query_aabb(&probe).is_empty());

    bvh.invalidate_geometry_bounds();
    bvh.refit(&test.scene).unwrap();
    assert_eq!(bvh.query_aabb(&probe).len(), 1);
}

#[test]
fn test_unresolved_bounds_are_counted() {
    let mut test = TestScene::new();
    let empty = test.scene.add_geometry(Geometry::triangles("empty", Vec::new()));
    let broken = test.scene.create_instanced("broken", empty, Mat4::IDENTITY, vec![Mat4::IDENTITY; 3]);
    test.scene.add_child(test.root, broken);
    test.mesh_at("fine", Vec3::ZERO);
    let bvh = test.build(ObjectBvhDesc::default());

    let diagnostics = bvh.diagnostics();
    assert_eq!(diagnostics.entity_count, 2);
    assert_eq!(diagnostics.primitive_count, 4);
    assert_eq!(diagnostics.unresolved_bounds, 3);
    assert!(diagnostics.node_count >= 1);
}
