/// Bounds extractor.
///
/// Resolves the bounds of indexed primitives and writes them as
/// conservative six-float rows for the hierarchy. Geometry bounding
/// spheres are cached per geometry key; entries live until
/// [`BoundsExtractor::invalidate`].
///
/// All bounds are expressed in the index frame:
/// `inverse(frame) * entity_world * instance_local`.

use glam::{Mat4, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};
use crate::error::Result;
use crate::math::{AABB, BoundingSphere};
use crate::scene::{Entity, GeometryKey, Scene};
use crate::{bvh_bail, bvh_err, bvh_warn};
use super::entity_set::{EntityRef, EntitySet};
use super::primitive_id::PrimitiveId;
use super::primitive_table::PrimitiveTable;
use super::tree::BOUNDS_STRIDE;

/// Bounds of one primitive before conservative inflation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedBounds {
    /// Transformed geometry bounding sphere
    Sphere(BoundingSphere),
    /// Exact box (precise mode, or the union of a collapsed entity's instances)
    Box(AABB),
}

impl ResolvedBounds {
    /// Enclosing box
    pub fn to_aabb(&self) -> AABB {
        match self {
            ResolvedBounds::Sphere(sphere) => sphere.to_aabb(),
            ResolvedBounds::Box(aabb) => *aabb,
        }
    }

    /// Write `(cx, hx, cy, hy, cz, hz)` with each half extent inflated by
    /// `|center| * f32::EPSILON` on its axis.
    pub fn write_conservative(&self, row: &mut [f32; BOUNDS_STRIDE]) {
        let (center, half_extents) = match self {
            ResolvedBounds::Sphere(sphere) => (sphere.center, Vec3::splat(sphere.radius)),
            ResolvedBounds::Box(aabb) => (aabb.center(), aabb.half_extents()),
        };
        let inflated = half_extents + center.abs() * f32::EPSILON;

        *row = [
            center.x, inflated.x,
            center.y, inflated.y,
            center.z, inflated.z,
        ];
    }
}

/// Computes primitive bounds for one index.
pub struct BoundsExtractor {
    precise: bool,
    frame_inverse: Mat4,
    /// Local-space bounding sphere per geometry (`None` = unresolvable)
    geometry_spheres: FxHashMap<GeometryKey, Option<BoundingSphere>>,
    /// Primitives whose last bounds computation fell back to a point
    unresolved: FxHashSet<PrimitiveId>,
}

impl BoundsExtractor {
    /// Create an extractor.
    ///
    /// # Arguments
    ///
    /// * `precise` - Exact boxes of transformed vertices instead of spheres
    /// * `frame` - Transform of the index frame (identity for world space)
    pub fn new(precise: bool, frame: Mat4) -> Self {
        Self {
            precise,
            frame_inverse: frame.inverse(),
            geometry_spheres: FxHashMap::default(),
            unresolved: FxHashSet::default(),
        }
    }

    /// Whether precise bounds are computed
    pub fn is_precise(&self) -> bool {
        self.precise
    }

    /// Number of primitives currently bounded by the point fallback
    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }

    /// Drop every cached geometry sphere.
    ///
    /// Required after geometry positions are edited.
    pub fn invalidate(&mut self) {
        self.geometry_spheres.clear();
    }

    /// Matrix from instance-local space to the index frame.
    pub fn instance_matrix(&self, entity: &Entity, instance: usize) -> Option<Mat4> {
        let local = entity.local_matrix_at(instance)?;
        Some(self.frame_inverse * *entity.world_matrix() * local)
    }

    /// Cached local-space bounding sphere of a geometry.
    ///
    /// Missing or degenerate geometries resolve to `None` and are reported
    /// once per cache lifetime.
    pub fn geometry_sphere(&mut self, scene: &Scene, key: GeometryKey) -> Option<BoundingSphere> {
        *self.geometry_spheres.entry(key).or_insert_with(|| {
            match scene.geometry(key) {
                Some(geometry) => {
                    let sphere = geometry.compute_bounding_sphere();
                    if sphere.is_none() {
                        bvh_warn!(
                            "object_bvh::BoundsExtractor",
                            "Geometry '{}' has no computable bounds, using point bounds",
                            geometry.name()
                        );
                    }
                    sphere
                }
                None => {
                    bvh_warn!(
                        "object_bvh::BoundsExtractor",
                        "Geometry {:?} is not in the scene, using point bounds",
                        key
                    );
                    None
                }
            }
        })
    }

    /// Bounds of one instance in the index frame.
    ///
    /// Returns `(bounds, resolved)`; unresolvable instances get a
    /// zero-radius sphere at the instance origin and `resolved == false`.
    pub fn instance_bounds(&mut self, scene: &Scene, entity: &Entity, instance: usize) -> (ResolvedBounds, bool) {
        let Some(matrix) = self.instance_matrix(entity, instance) else {
            return (ResolvedBounds::Sphere(BoundingSphere::point(entity.world_matrix().w_axis.truncate())), false);
        };

        let sphere = entity
            .geometry_at(instance)
            .and_then(|key| self.geometry_sphere(scene, key).map(|sphere| (key, sphere)));

        match sphere {
            Some((key, sphere)) => {
                if self.precise {
                    let exact = scene.geometry(key).and_then(|geometry| {
                        AABB::from_points(geometry.positions().iter().map(|p| matrix.transform_point3(*p)))
                    });
                    if let Some(aabb) = exact {
                        return (ResolvedBounds::Box(aabb), true);
                    }
                }
                (ResolvedBounds::Sphere(sphere.transformed(&matrix)), true)
            }
            None => (
                ResolvedBounds::Sphere(BoundingSphere::point(matrix.transform_point3(Vec3::ZERO))),
                false,
            ),
        }
    }

    /// Bounding sphere of one instance in the index frame (point fallback).
    pub fn instance_sphere(&mut self, scene: &Scene, entity: &Entity, instance: usize) -> BoundingSphere {
        let matrix = self.instance_matrix(entity, instance);
        let sphere = entity
            .geometry_at(instance)
            .and_then(|key| self.geometry_sphere(scene, key));

        match (sphere, matrix) {
            (Some(sphere), Some(matrix)) => sphere.transformed(&matrix),
            (None, Some(matrix)) => BoundingSphere::point(matrix.transform_point3(Vec3::ZERO)),
            _ => BoundingSphere::point(entity.world_matrix().w_axis.truncate()),
        }
    }

    /// Bounds of the primitive at a buffer slot.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the slot is out of range
    /// - `TopologyChanged` if the entity or instance no longer matches the scene
    pub fn primitive_bounds(
        &mut self,
        scene: &Scene,
        entities: &EntitySet,
        table: &PrimitiveTable,
        primitive_index: usize,
    ) -> Result<ResolvedBounds> {
        let (entity_index, instance) = table.decode(primitive_index).ok_or_else(|| {
            bvh_err!(
                InvalidArgument,
                "object_bvh::BoundsExtractor",
                "Primitive {} out of range (len {})",
                primitive_index, table.len()
            )
        })?;
        let (entry, entity) = Self::lookup(scene, entities, entity_index as usize)?;

        let (bounds, resolved) = if table.is_collapsed(&entry) {
            let count = entity.instance_count();
            if count == 0 {
                bvh_bail!(
                    TopologyChanged,
                    "object_bvh::BoundsExtractor",
                    "Entity '{}' has no instances left",
                    entity.name()
                );
            }
            let mut union = AABB::EMPTY;
            let mut all_resolved = true;
            for i in 0..count {
                let (bounds, resolved) = self.instance_bounds(scene, entity, i);
                union = union.union(&bounds.to_aabb());
                all_resolved &= resolved;
            }
            (ResolvedBounds::Box(union), all_resolved)
        } else {
            if instance as usize >= entity.instance_count() {
                bvh_bail!(
                    TopologyChanged,
                    "object_bvh::BoundsExtractor",
                    "Entity '{}' has {} instances, index references instance {}",
                    entity.name(), entity.instance_count(), instance
                );
            }
            self.instance_bounds(scene, entity, instance as usize)
        };

        let id = table.primitives()[primitive_index];
        if resolved {
            self.unresolved.remove(&id);
        } else {
            self.unresolved.insert(id);
        }
        Ok(bounds)
    }

    /// Write conservative bounds of primitives `[offset, offset + count)`.
    ///
    /// Primitive `i` is written at row `target_offset + (i - offset)` of
    /// `target` (six floats per row).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the range exceeds the buffer or `target` is too
    /// short; errors from [`Self::primitive_bounds`].
    #[allow(clippy::too_many_arguments)]
    pub fn compute_bounds(
        &mut self,
        scene: &Scene,
        entities: &EntitySet,
        table: &PrimitiveTable,
        offset: usize,
        count: usize,
        target: &mut [f32],
        target_offset: usize,
    ) -> Result<()> {
        if offset.checked_add(count).map_or(true, |end| end > table.len()) {
            bvh_bail!(
                InvalidArgument,
                "object_bvh::BoundsExtractor",
                "Range {}+{} exceeds {} primitives",
                offset, count, table.len()
            );
        }
        let first = target_offset * BOUNDS_STRIDE;
        let end = first + count * BOUNDS_STRIDE;
        if target.len() < end {
            bvh_bail!(
                InvalidArgument,
                "object_bvh::BoundsExtractor",
                "Target holds {} floats, {} needed",
                target.len(), end
            );
        }

        let rows: &mut [[f32; BOUNDS_STRIDE]] = bytemuck::cast_slice_mut(&mut target[first..end]);
        for (row, i) in rows.iter_mut().zip(offset..offset + count) {
            self.primitive_bounds(scene, entities, table, i)?
                .write_conservative(row);
        }
        Ok(())
    }

    fn lookup<'s>(scene: &'s Scene, entities: &EntitySet, entity_index: usize) -> Result<(EntityRef, &'s Entity)> {
        let entry = entities.get(entity_index).ok_or_else(|| {
            bvh_err!(
                InvalidArgument,
                "object_bvh::BoundsExtractor",
                "Entity index {} out of range ({} entities)",
                entity_index, entities.len()
            )
        })?;
        let entity = scene
            .entity(entry.key())
            .filter(|entity| entity.kind() == Some(entry.kind()))
            .ok_or_else(|| {
                bvh_err!(
                    TopologyChanged,
                    "object_bvh::BoundsExtractor",
                    "Entity {:?} was removed or changed kind",
                    entry.key()
                )
            })?;
        Ok((entry, entity))
    }
}

#[cfg(test)]
#[path = "bounds_tests.rs"]
mod tests;
