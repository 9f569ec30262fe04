/// Entity enumeration.
///
/// Walks the scene depth-first from one or more roots and collects every
/// drawable entity once, in first-discovery order. The position of an
/// entity in the resulting set is its entity index in primitive IDs.

use rustc_hash::FxHashSet;
use crate::error::Result;
use crate::scene::{Entity, EntityKey, EntityKind, Scene};
use crate::bvh_bail;

/// A drawable entity, classified once at enumeration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// One implicit instance
    Single(EntityKey),
    /// Shared geometry, one transform per instance
    Instanced(EntityKey),
    /// Geometry and transform per instance slot
    Batched(EntityKey),
}

impl EntityRef {
    /// Classify an entity. Returns `None` for non-drawable entities.
    pub fn classify(key: EntityKey, entity: &Entity) -> Option<Self> {
        entity.kind().map(|kind| match kind {
            EntityKind::Single => EntityRef::Single(key),
            EntityKind::Instanced => EntityRef::Instanced(key),
            EntityKind::Batched => EntityRef::Batched(key),
        })
    }

    /// Scene key of the entity
    pub fn key(&self) -> EntityKey {
        match *self {
            EntityRef::Single(key) | EntityRef::Instanced(key) | EntityRef::Batched(key) => key,
        }
    }

    /// Kind recorded at enumeration
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Single(_) => EntityKind::Single,
            EntityRef::Instanced(_) => EntityKind::Instanced,
            EntityRef::Batched(_) => EntityKind::Batched,
        }
    }

    /// Whether the entity draws several instances
    pub fn is_multiplicity(&self) -> bool {
        !matches!(self, EntityRef::Single(_))
    }
}

/// Ordered, deduplicated set of drawable entities
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    entries: Vec<EntityRef>,
}

impl EntitySet {
    /// Enumerate the drawable entities reachable from `roots`.
    ///
    /// Roots are walked in order, children in insertion order, parents
    /// before children. An entity reachable through several paths (or
    /// several roots) is kept at its first position. Cycles are tolerated.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if a root key is not in the scene.
    pub fn enumerate(scene: &Scene, roots: &[EntityKey]) -> Result<Self> {
        let mut visited: FxHashSet<EntityKey> = FxHashSet::default();
        let mut entries = Vec::new();
        let mut stack = Vec::new();

        for &root in roots {
            if scene.entity(root).is_none() {
                bvh_bail!(
                    InvalidArgument,
                    "object_bvh::EntitySet",
                    "Root entity {:?} is not in the scene",
                    root
                );
            }
            stack.push(root);

            while let Some(key) = stack.pop() {
                if !visited.insert(key) {
                    continue;
                }
                let Some(entity) = scene.entity(key) else {
                    continue;
                };
                if let Some(entry) = EntityRef::classify(key, entity) {
                    entries.push(entry);
                }
                // Reverse so the first child is popped first
                stack.extend(entity.children().iter().rev().copied());
            }
        }

        Ok(Self { entries })
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no drawable entity was found
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entity at an entity index
    pub fn get(&self, entity_index: usize) -> Option<EntityRef> {
        self.entries.get(entity_index).copied()
    }

    /// Entity index of a scene key (linear scan)
    pub fn index_of(&self, key: EntityKey) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key() == key)
    }

    /// All entities, in entity index order
    pub fn as_slice(&self) -> &[EntityRef] {
        &self.entries
    }

    /// Iterate entities in entity index order
    pub fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "entity_set_tests.rs"]
mod tests;
