/// ObjectBvh — spatial index over scene entities and their instances.
///
/// Every drawn instance becomes one primitive of a [`BvhTree`]. The index
/// does not hold the scene: operations that read entities take it as an
/// argument, and the caller must not change which entities or instances
/// exist while the index is alive (transforms may change, then `refit`).

use glam::{Mat4, Vec3};
use rdst::{RadixKey, RadixSort};
use crate::error::Result;
use crate::math::{AABB, BoundingSphere, BoundsTest, Frustum, Ray};
use crate::scene::{Entity, EntityKey, PrimitiveTopology, Scene};
use crate::{bvh_bail, bvh_debug, bvh_err, bvh_info};
use super::bounds::BoundsExtractor;
use super::entity_set::EntitySet;
use super::primitive_id::PrimitiveId;
use super::primitive_table::PrimitiveTable;
use super::tree::{BvhBuildDesc, BvhTree, PrimitiveRange, PrimitiveSource, ShapecastCallbacks};

// ===== CONFIGURATION =====

/// Index construction options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectBvhDesc {
    /// Exact boxes of transformed vertices (and triangle raycasts) instead
    /// of transformed bounding spheres
    pub precise: bool,
    /// One primitive per instance; when false, one per multiplicity entity
    pub include_instances: bool,
    /// Frame of the index. Bounds and query shapes are expressed in
    /// `inverse(matrix) * world` space. `None` = world space.
    pub matrix: Option<Mat4>,
    /// Hierarchy build parameters
    pub build: BvhBuildDesc,
}

impl Default for ObjectBvhDesc {
    fn default() -> Self {
        Self {
            precise: false,
            include_instances: true,
            matrix: None,
            build: BvhBuildDesc::default(),
        }
    }
}

// ===== QUERY TYPES =====

/// A primitive reported by a query, decoded back to its entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveHit {
    /// Slot in the primitive buffer
    pub primitive_index: usize,
    /// Position of the entity in [`ObjectBvh::objects`]
    pub entity_index: u32,
    /// Scene key of the entity
    pub entity: EntityKey,
    /// Instance index, `None` when the primitive stands for every instance
    /// of a collapsed entity
    pub instance: Option<u32>,
}

/// One ray intersection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Distance along the ray (non-negative)
    pub distance: f32,
    /// Intersection point, in the index frame
    pub point: Vec3,
    /// Primitive hit; `instance` is always set
    pub hit: PrimitiveHit,
}

impl RadixKey for RaycastHit {
    const LEVELS: usize = 4;

    #[inline]
    fn get_level(&self, level: usize) -> u8 {
        // Non-negative floats order like their bit patterns; `+ 0.0` folds -0.0 into 0.0
        ((self.distance + 0.0).to_bits() >> (level * 8)) as u8
    }
}

/// Index statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BvhDiagnostics {
    /// Drawable entities indexed
    pub entity_count: usize,
    /// Primitives in the buffer
    pub primitive_count: usize,
    /// Hierarchy nodes
    pub node_count: usize,
    /// Primitives currently bounded by the point fallback
    pub unresolved_bounds: usize,
}

/// Caller callbacks for [`ObjectBvh::shapecast`].
pub trait ObjectShapecast {
    /// Classify a node's bounds against the query shape.
    fn intersects_bounds(&mut self, bounds: &AABB, is_leaf: bool, depth: u32) -> BoundsTest;

    /// Visit one primitive. Returning true stops the walk.
    fn intersects_object(&mut self, hit: PrimitiveHit, contained: bool, depth: u32) -> bool;
}

// ===== ENGINE ADAPTERS =====

/// Exposes the primitive buffer and bounds extractor to the tree
struct SceneSource<'a> {
    scene: &'a Scene,
    entities: &'a EntitySet,
    table: &'a mut PrimitiveTable,
    extractor: &'a mut BoundsExtractor,
}

impl PrimitiveSource for SceneSource<'_> {
    fn root_ranges(&self) -> Vec<PrimitiveRange> {
        self.table.root_ranges()
    }

    fn compute_primitive_bounds(
        &mut self,
        offset: usize,
        count: usize,
        target: &mut [f32],
        target_offset: usize,
    ) -> Result<()> {
        self.extractor
            .compute_bounds(self.scene, self.entities, self.table, offset, count, target, target_offset)
    }

    fn swap_primitives(&mut self, a: usize, b: usize) {
        self.table.swap(a, b);
    }
}

/// Turns leaf ranges into decoded primitive hits
struct ShapecastBridge<'a, C: ?Sized> {
    entities: &'a EntitySet,
    table: &'a PrimitiveTable,
    callbacks: &'a mut C,
}

impl<C: ObjectShapecast + ?Sized> ShapecastCallbacks for ShapecastBridge<'_, C> {
    fn intersects_bounds(&mut self, bounds: &AABB, is_leaf: bool, depth: u32, _node_index: usize) -> BoundsTest {
        self.callbacks.intersects_bounds(bounds, is_leaf, depth)
    }

    fn intersects_range(
        &mut self,
        offset: usize,
        count: usize,
        contained: bool,
        depth: u32,
        _node_index: usize,
    ) -> bool {
        (offset..offset + count)
            .filter_map(|i| decode_hit(self.entities, self.table, i))
            .any(|hit| self.callbacks.intersects_object(hit, contained, depth))
    }
}

fn decode_hit(entities: &EntitySet, table: &PrimitiveTable, primitive_index: usize) -> Option<PrimitiveHit> {
    let (entity_index, instance) = table.decode(primitive_index)?;
    let entry = entities.get(entity_index as usize)?;
    Some(PrimitiveHit {
        primitive_index,
        entity_index,
        entity: entry.key(),
        instance: (!table.is_collapsed(&entry)).then_some(instance),
    })
}

// ===== OBJECT BVH =====

/// Bounding volume hierarchy over the drawable entities of a scene.
pub struct ObjectBvh {
    entities: EntitySet,
    table: PrimitiveTable,
    extractor: BoundsExtractor,
    tree: BvhTree,
    desc: ObjectBvhDesc,
}

impl ObjectBvh {
    /// Build an index over every drawable entity reachable from `roots`.
    ///
    /// An input without drawable entities gives a valid empty index.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if a root is not in the scene or `desc.matrix`
    ///   is not invertible
    /// - `CapacityExceeded` if the entity or instance counts do not fit
    ///   32-bit primitive IDs
    pub fn new(scene: &Scene, roots: &[EntityKey], desc: ObjectBvhDesc) -> Result<Self> {
        let frame = desc.matrix.unwrap_or(Mat4::IDENTITY);
        let determinant = frame.determinant();
        if !determinant.is_finite() || determinant == 0.0 {
            bvh_bail!(
                InvalidArgument,
                "object_bvh::ObjectBvh",
                "Index frame matrix is not invertible (determinant {})",
                determinant
            );
        }

        let entities = EntitySet::enumerate(scene, roots)?;
        let mut table = PrimitiveTable::build(scene, &entities, desc.include_instances)?;
        let mut extractor = BoundsExtractor::new(desc.precise, frame);

        let tree = BvhTree::build(
            &mut SceneSource {
                scene,
                entities: &entities,
                table: &mut table,
                extractor: &mut extractor,
            },
            desc.build,
        )?;

        if table.is_empty() {
            bvh_info!(
                "object_bvh::ObjectBvh",
                "No drawable instances reachable from {} root(s), index is empty",
                roots.len()
            );
        } else {
            bvh_debug!(
                "object_bvh::ObjectBvh",
                "Built index: {} entities, {} primitives, {} nodes, {} entity bits",
                entities.len(), table.len(), tree.node_count(), table.codec().id_bits()
            );
        }

        Ok(Self { entities, table, extractor, tree, desc })
    }

    /// Build an index from a single root.
    pub fn from_root(scene: &Scene, root: EntityKey, desc: ObjectBvhDesc) -> Result<Self> {
        Self::new(scene, &[root], desc)
    }

    // ===== ACCESSORS =====

    /// Indexed entities, in entity index order
    pub fn objects(&self) -> &EntitySet {
        &self.entities
    }

    /// Primitive buffer, in tree order
    pub fn primitives(&self) -> &[PrimitiveId] {
        self.table.primitives()
    }

    /// Root ranges of the primitive buffer (one range, `count` 0 when empty)
    pub fn root_ranges(&self) -> Vec<PrimitiveRange> {
        self.table.root_ranges()
    }

    /// The underlying hierarchy
    pub fn tree(&self) -> &BvhTree {
        &self.tree
    }

    /// Construction options
    pub fn desc(&self) -> &ObjectBvhDesc {
        &self.desc
    }

    /// Statistics for debugging and overlays
    pub fn diagnostics(&self) -> BvhDiagnostics {
        BvhDiagnostics {
            entity_count: self.entities.len(),
            primitive_count: self.table.len(),
            node_count: self.tree.node_count(),
            unresolved_bounds: self.extractor.unresolved_count(),
        }
    }

    /// Decode the primitive at a buffer slot.
    pub fn primitive_hit(&self, primitive_index: usize) -> Option<PrimitiveHit> {
        decode_hit(&self.entities, &self.table, primitive_index)
    }

    /// Decode a primitive range (e.g. a leaf) back to entities.
    pub fn resolve_range(&self, offset: usize, count: usize) -> Vec<PrimitiveHit> {
        (offset..offset.saturating_add(count))
            .map_while(|i| self.primitive_hit(i))
            .collect()
    }

    /// Write conservative bounds of primitives `[offset, offset + count)`
    /// at row `target_offset` of `target`, from the current scene state.
    pub fn compute_primitive_bounds(
        &mut self,
        scene: &Scene,
        offset: usize,
        count: usize,
        target: &mut [f32],
        target_offset: usize,
    ) -> Result<()> {
        self.extractor
            .compute_bounds(scene, &self.entities, &self.table, offset, count, target, target_offset)
    }

    /// Drop cached geometry bounds (after editing geometry positions).
    ///
    /// Takes effect at the next `refit`.
    pub fn invalidate_geometry_bounds(&mut self) {
        self.extractor.invalidate();
    }

    // ===== REFIT =====

    /// Recompute all bounds after transform changes.
    ///
    /// # Errors
    ///
    /// `TopologyChanged` if an indexed entity was removed, changed kind or
    /// gained or lost instances. Rebuild the index instead.
    pub fn refit(&mut self, scene: &Scene) -> Result<()> {
        self.validate_topology(scene)?;

        let Self { entities, table, extractor, tree, .. } = self;
        tree.refit(&mut SceneSource {
            scene,
            entities,
            table,
            extractor,
        })
    }

    fn validate_topology(&self, scene: &Scene) -> Result<()> {
        for (entity_index, entry) in self.entities.iter().enumerate() {
            let Some(entity) = scene.entity(entry.key()) else {
                bvh_bail!(
                    TopologyChanged,
                    "object_bvh::ObjectBvh",
                    "Indexed entity {:?} was removed",
                    entry.key()
                );
            };
            if entity.kind() != Some(entry.kind()) {
                bvh_bail!(
                    TopologyChanged,
                    "object_bvh::ObjectBvh",
                    "Entity '{}' changed from {:?} to {:?}",
                    entity.name(), entry.kind(), entity.kind()
                );
            }
            let built = self.table.instance_count(entity_index);
            if built != Some(entity.instance_count()) {
                bvh_bail!(
                    TopologyChanged,
                    "object_bvh::ObjectBvh",
                    "Entity '{}' had {:?} instances, now {}",
                    entity.name(), built, entity.instance_count()
                );
            }
        }
        Ok(())
    }

    // ===== QUERIES =====

    /// Walk the hierarchy with caller callbacks.
    ///
    /// Returns true if `intersects_object` stopped the walk.
    pub fn shapecast<C: ObjectShapecast + ?Sized>(&self, callbacks: &mut C) -> bool {
        self.tree.shapecast(&mut ShapecastBridge {
            entities: &self.entities,
            table: &self.table,
            callbacks,
        })
    }

    /// Primitives whose bounds overlap a frustum (index frame).
    pub fn query_frustum(&self, frustum: &Frustum) -> Vec<PrimitiveHit> {
        self.collect(|aabb| frustum.classify_aabb(aabb))
    }

    /// Primitives whose bounds overlap a sphere (index frame).
    pub fn query_sphere(&self, sphere: &BoundingSphere) -> Vec<PrimitiveHit> {
        self.collect(|aabb| {
            if !aabb.intersects_sphere(sphere) {
                BoundsTest::Outside
            } else if farthest_corner_inside(aabb, sphere) {
                BoundsTest::Inside
            } else {
                BoundsTest::Partial
            }
        })
    }

    /// Primitives whose bounds overlap a box (index frame).
    pub fn query_aabb(&self, query: &AABB) -> Vec<PrimitiveHit> {
        self.collect(|aabb| {
            if !query.intersects(aabb) {
                BoundsTest::Outside
            } else if query.contains(aabb) {
                BoundsTest::Inside
            } else {
                BoundsTest::Partial
            }
        })
    }

    /// Run a shapecast with one classifier for nodes and primitives.
    fn collect<F: FnMut(&AABB) -> BoundsTest>(&self, classify: F) -> Vec<PrimitiveHit> {
        struct Collector<'a, F> {
            tree: &'a BvhTree,
            classify: F,
            hits: Vec<PrimitiveHit>,
        }

        impl<F: FnMut(&AABB) -> BoundsTest> ObjectShapecast for Collector<'_, F> {
            fn intersects_bounds(&mut self, bounds: &AABB, _is_leaf: bool, _depth: u32) -> BoundsTest {
                (self.classify)(bounds)
            }

            fn intersects_object(&mut self, hit: PrimitiveHit, contained: bool, _depth: u32) -> bool {
                let overlaps = contained
                    || self
                        .tree
                        .primitive_bounds(hit.primitive_index)
                        .is_some_and(|aabb| (self.classify)(&aabb) != BoundsTest::Outside);
                if overlaps {
                    self.hits.push(hit);
                }
                false
            }
        }

        let mut collector = Collector {
            tree: &self.tree,
            classify,
            hits: Vec::new(),
        };
        self.shapecast(&mut collector);
        collector.hits
    }

    /// Intersect a ray (index frame) with the visible indexed instances.
    ///
    /// Hits are appended to `intersects` sorted by distance, one per
    /// instance. Hidden entities and hidden batched slots are skipped.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the origin is not finite or the direction is
    ///   not a unit vector
    /// - `NotImplemented` for a precise raycast reaching line or point geometry
    /// - `TopologyChanged` if an indexed entity was removed
    pub fn raycast(&mut self, scene: &Scene, ray: &Ray, intersects: &mut Vec<RaycastHit>) -> Result<()> {
        if !ray.origin.is_finite() || !ray.direction.is_normalized() {
            bvh_bail!(
                InvalidArgument,
                "object_bvh::ObjectBvh",
                "Degenerate ray (origin {}, direction {})",
                ray.origin, ray.direction
            );
        }

        let candidates = self.collect(|aabb| {
            if ray.intersect_aabb(aabb).is_some() {
                BoundsTest::Partial
            } else {
                BoundsTest::Outside
            }
        });

        let mut hits = Vec::new();
        for candidate in candidates {
            let entity = scene.entity(candidate.entity).ok_or_else(|| {
                bvh_err!(
                    TopologyChanged,
                    "object_bvh::ObjectBvh",
                    "Indexed entity {:?} was removed",
                    candidate.entity
                )
            })?;
            let instances = match candidate.instance {
                Some(instance) => instance as usize..instance as usize + 1,
                None => 0..entity.instance_count(),
            };

            for instance in instances {
                if !entity.is_instance_visible(instance) {
                    continue;
                }
                if let Some(distance) = self.intersect_instance(scene, entity, instance, ray)? {
                    hits.push(RaycastHit {
                        distance,
                        point: ray.at(distance),
                        hit: PrimitiveHit {
                            instance: Some(instance as u32),
                            ..candidate
                        },
                    });
                }
            }
        }

        hits.radix_sort_unstable();
        intersects.extend(hits);
        Ok(())
    }

    fn intersect_instance(&mut self, scene: &Scene, entity: &Entity, instance: usize, ray: &Ray) -> Result<Option<f32>> {
        if !self.extractor.is_precise() {
            let sphere = self.extractor.instance_sphere(scene, entity, instance);
            return Ok(ray.intersect_sphere(&sphere));
        }

        let (Some(geometry), Some(matrix)) = (
            entity.geometry_at(instance).and_then(|key| scene.geometry(key)),
            self.extractor.instance_matrix(entity, instance),
        ) else {
            return Ok(None);
        };

        match geometry.topology() {
            PrimitiveTopology::Triangles => Ok(geometry
                .transformed_triangles(&matrix)
                .filter_map(|[v0, v1, v2]| ray.intersect_triangle(v0, v1, v2))
                .reduce(f32::min)),
            topology => bvh_bail!(
                NotImplemented,
                "object_bvh::ObjectBvh",
                "Precise raycast against {:?} geometry '{}'",
                topology, geometry.name()
            ),
        }
    }
}

/// Whether every corner of a box lies in a sphere
fn farthest_corner_inside(aabb: &AABB, sphere: &BoundingSphere) -> bool {
    let farthest = (aabb.min - sphere.center).abs().max((aabb.max - sphere.center).abs());
    farthest.length_squared() <= sphere.radius * sphere.radius
}

#[cfg(test)]
#[path = "object_bvh_tests.rs"]
mod tests;
