/// Primitive table — the flat primitive buffer fed to the hierarchy.
///
/// One primitive per drawn instance, in entity order then instance order.
/// With instance expansion disabled, a multiplicity entity contributes a
/// single primitive (instance 0) standing for all of its instances.

use crate::error::Result;
use crate::scene::Scene;
use crate::{bvh_bail, bvh_err};
use super::entity_set::{EntityRef, EntitySet};
use super::primitive_id::{PrimitiveId, PrimitiveIdCodec};
use super::tree::PrimitiveRange;

/// Flat buffer of primitive IDs plus the instance counts it was built from
#[derive(Debug, Clone)]
pub struct PrimitiveTable {
    primitives: Vec<PrimitiveId>,
    codec: PrimitiveIdCodec,
    /// Instance count of each entity at build time (topology snapshot)
    instance_counts: Vec<usize>,
    include_instances: bool,
}

impl PrimitiveTable {
    /// Size and fill the primitive buffer for an entity set.
    ///
    /// # Errors
    ///
    /// - `CapacityExceeded` if an entity or instance index does not fit the ID split
    /// - `TopologyChanged` if an enumerated entity is no longer in the scene
    pub fn build(scene: &Scene, entities: &EntitySet, include_instances: bool) -> Result<Self> {
        let codec = PrimitiveIdCodec::for_entity_count(entities.len())?;

        let mut instance_counts = Vec::with_capacity(entities.len());
        for entry in entities.iter() {
            let entity = scene.entity(entry.key()).ok_or_else(|| {
                bvh_err!(
                    TopologyChanged,
                    "object_bvh::PrimitiveTable",
                    "Entity {:?} was removed after enumeration",
                    entry.key()
                )
            })?;
            let instance_count = entity.instance_count();
            if include_instances && instance_count as u64 > codec.max_instance_count() {
                bvh_bail!(
                    CapacityExceeded,
                    "object_bvh::PrimitiveTable",
                    "Entity '{}' has {} instances, {} entities leave room for {}",
                    entity.name(), instance_count, entities.len(), codec.max_instance_count()
                );
            }
            instance_counts.push(instance_count);
        }

        let total: usize = entities
            .iter()
            .zip(&instance_counts)
            .map(|(entry, &count)| Self::primitive_count_for(entry, count, include_instances))
            .sum();

        let mut primitives = Vec::with_capacity(total);
        for (entity_index, (entry, &count)) in entities.iter().zip(&instance_counts).enumerate() {
            for instance in 0..Self::primitive_count_for(entry, count, include_instances) {
                primitives.push(codec.encode(entity_index as u32, instance as u32)?);
            }
        }

        Ok(Self {
            primitives,
            codec,
            instance_counts,
            include_instances,
        })
    }

    /// Primitives contributed by one entity.
    ///
    /// Singles contribute 1. Multiplicity entities contribute one per
    /// instance, or at most 1 when instances are collapsed.
    pub fn primitive_count_for(entry: &EntityRef, instance_count: usize, include_instances: bool) -> usize {
        match entry {
            EntityRef::Single(_) => 1,
            _ if include_instances => instance_count,
            _ => instance_count.min(1),
        }
    }

    /// The primitive buffer, in current (possibly reordered) order
    pub fn primitives(&self) -> &[PrimitiveId] {
        &self.primitives
    }

    /// Number of primitives
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Codec used to pack this buffer
    pub fn codec(&self) -> &PrimitiveIdCodec {
        &self.codec
    }

    /// Whether multiplicity entities were expanded per instance
    pub fn includes_instances(&self) -> bool {
        self.include_instances
    }

    /// Instance count of an entity when the table was built
    pub fn instance_count(&self, entity_index: usize) -> Option<usize> {
        self.instance_counts.get(entity_index).copied()
    }

    /// Whether a primitive of this entity stands for all of its instances
    pub fn is_collapsed(&self, entry: &EntityRef) -> bool {
        !self.include_instances && entry.is_multiplicity()
    }

    /// `(entity_index, instance_index)` of the primitive at a buffer slot
    pub fn decode(&self, primitive_index: usize) -> Option<(u32, u32)> {
        self.primitives
            .get(primitive_index)
            .map(|&id| self.codec.decode(id))
    }

    /// The single root range covering the whole buffer (`count` 0 when empty)
    pub fn root_ranges(&self) -> Vec<PrimitiveRange> {
        vec![PrimitiveRange {
            offset: 0,
            count: self.primitives.len(),
        }]
    }

    /// Swap two slots of the buffer (hierarchy build reordering)
    pub fn swap(&mut self, a: usize, b: usize) {
        self.primitives.swap(a, b);
    }
}

#[cfg(test)]
#[path = "primitive_table_tests.rs"]
mod tests;
