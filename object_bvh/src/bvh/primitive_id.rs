/// Primitive ID codec.
///
/// A primitive ID packs `(entity_index, instance_index)` into one `u32`:
/// the low `id_bits` hold the entity index, the remaining high bits hold
/// the instance index. `id_bits` is derived from the entity count so that
/// scenes with few entities keep most of the width for instances.

use crate::error::Result;
use crate::bvh_bail;

/// Packed `(entity, instance)` identifier of one indexed primitive.
pub type PrimitiveId = u32;

/// Width of a primitive ID in bits
const ID_WIDTH: u32 = PrimitiveId::BITS;

/// Encoder/decoder for primitive IDs of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveIdCodec {
    id_bits: u32,
    id_mask: u32,
}

impl PrimitiveIdCodec {
    /// Create the codec for an entity set of the given size.
    ///
    /// `id_bits = ceil(log2(entity_count))`, and 0 when `entity_count <= 1`.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if the entity indices do not fit in 32 bits.
    pub fn for_entity_count(entity_count: usize) -> Result<Self> {
        let id_bits = Self::id_bits_for(entity_count);
        if id_bits > ID_WIDTH {
            bvh_bail!(
                CapacityExceeded,
                "object_bvh::PrimitiveIdCodec",
                "{} entities need {} bits, primitive IDs have {}",
                entity_count, id_bits, ID_WIDTH
            );
        }
        Ok(Self {
            id_bits,
            id_mask: ((1u64 << id_bits) - 1) as u32,
        })
    }

    /// Number of bits needed to address `entity_count` entities.
    pub fn id_bits_for(entity_count: usize) -> u32 {
        if entity_count <= 1 {
            0
        } else {
            usize::BITS - (entity_count - 1).leading_zeros()
        }
    }

    /// Bits reserved for the entity index
    pub fn id_bits(&self) -> u32 {
        self.id_bits
    }

    /// Mask selecting the entity index bits
    pub fn id_mask(&self) -> u32 {
        self.id_mask
    }

    /// Number of distinct entity indices this codec can address.
    pub fn max_entity_count(&self) -> u64 {
        1u64 << self.id_bits
    }

    /// Number of distinct instance indices left in the high bits.
    pub fn max_instance_count(&self) -> u64 {
        1u64 << (ID_WIDTH - self.id_bits)
    }

    /// Pack an `(entity, instance)` pair.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if either index does not fit its bit field.
    pub fn encode(&self, entity_index: u32, instance_index: u32) -> Result<PrimitiveId> {
        if u64::from(entity_index) >= self.max_entity_count() {
            bvh_bail!(
                CapacityExceeded,
                "object_bvh::PrimitiveIdCodec",
                "Entity index {} does not fit in {} bits",
                entity_index, self.id_bits
            );
        }
        if u64::from(instance_index) >= self.max_instance_count() {
            bvh_bail!(
                CapacityExceeded,
                "object_bvh::PrimitiveIdCodec",
                "Instance index {} does not fit in {} bits",
                instance_index, ID_WIDTH - self.id_bits
            );
        }
        Ok(((u64::from(instance_index) << self.id_bits) | u64::from(entity_index)) as u32)
    }

    /// Entity index of a primitive ID (`id & mask`).
    pub fn decode_entity(&self, id: PrimitiveId) -> u32 {
        id & self.id_mask
    }

    /// Instance index of a primitive ID (`(id & !mask) >> id_bits`).
    pub fn decode_instance(&self, id: PrimitiveId) -> u32 {
        // u64 so that a 32-bit entity field shifts the instance out cleanly
        (u64::from(id & !self.id_mask) >> self.id_bits) as u32
    }

    /// Both indices of a primitive ID.
    pub fn decode(&self, id: PrimitiveId) -> (u32, u32) {
        (self.decode_entity(id), self.decode_instance(id))
    }
}

#[cfg(test)]
#[path = "primitive_id_tests.rs"]
mod tests;
