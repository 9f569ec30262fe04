/// Scene — the host scene graph the index is built from.
///
/// Uses SlotMaps for O(1) insert/remove with stable keys. World matrices
/// are supplied by the caller; the scene does not propagate transforms.

use glam::Mat4;
use slotmap::SlotMap;
use super::entity::{BatchedInstance, Entity, EntityContent, EntityKey};
use super::geometry::{Geometry, GeometryKey};

/// A scene graph of entities and the geometries they draw.
///
/// Entities may be reachable from several parents; the index deduplicates
/// them by key.
pub struct Scene {
    entities: SlotMap<EntityKey, Entity>,
    geometries: SlotMap<GeometryKey, Geometry>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self {
            entities: SlotMap::with_key(),
            geometries: SlotMap::with_key(),
        }
    }

    // ===== GEOMETRIES =====

    /// Add a geometry and return its key
    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryKey {
        self.geometries.insert(geometry)
    }

    /// Get a geometry by key
    pub fn geometry(&self, key: GeometryKey) -> Option<&Geometry> {
        self.geometries.get(key)
    }

    /// Get a geometry by key (mutable)
    pub fn geometry_mut(&mut self, key: GeometryKey) -> Option<&mut Geometry> {
        self.geometries.get_mut(key)
    }

    /// Remove a geometry. Entities still referencing it keep the dangling key.
    pub fn remove_geometry(&mut self, key: GeometryKey) -> Option<Geometry> {
        self.geometries.remove(key)
    }

    // ===== ENTITY CREATION =====

    /// Create a non-drawable grouping entity
    pub fn create_group(&mut self, name: impl Into<String>, world_matrix: Mat4) -> EntityKey {
        self.entities.insert(Entity::new(name.into(), world_matrix, EntityContent::Group))
    }

    /// Create a single-draw entity
    pub fn create_mesh(
        &mut self,
        name: impl Into<String>,
        geometry: GeometryKey,
        world_matrix: Mat4,
    ) -> EntityKey {
        self.entities.insert(Entity::new(
            name.into(),
            world_matrix,
            EntityContent::Mesh { geometry },
        ))
    }

    /// Create an instanced entity drawing `geometry` once per matrix
    pub fn create_instanced(
        &mut self,
        name: impl Into<String>,
        geometry: GeometryKey,
        world_matrix: Mat4,
        instance_matrices: Vec<Mat4>,
    ) -> EntityKey {
        self.entities.insert(Entity::new(
            name.into(),
            world_matrix,
            EntityContent::Instanced { geometry, instance_matrices },
        ))
    }

    /// Create a batched entity with one geometry and matrix per slot
    pub fn create_batched(
        &mut self,
        name: impl Into<String>,
        world_matrix: Mat4,
        instances: Vec<BatchedInstance>,
    ) -> EntityKey {
        self.entities.insert(Entity::new(
            name.into(),
            world_matrix,
            EntityContent::Batched { instances },
        ))
    }

    // ===== HIERARCHY =====

    /// Append `child` to `parent`'s children. Returns false if a key is invalid.
    pub fn add_child(&mut self, parent: EntityKey, child: EntityKey) -> bool {
        if !self.entities.contains_key(child) {
            return false;
        }
        match self.entities.get_mut(parent) {
            Some(entity) => {
                entity.children_mut().push(child);
                true
            }
            None => false,
        }
    }

    /// Remove an entity and detach it from every parent.
    ///
    /// Its children are not removed. Returns false if the key is invalid.
    pub fn remove_entity(&mut self, key: EntityKey) -> bool {
        if self.entities.remove(key).is_none() {
            return false;
        }
        for (_, entity) in self.entities.iter_mut() {
            entity.children_mut().retain(|&child| child != key);
        }
        true
    }

    // ===== ENTITY ACCESS =====

    /// Get an entity by key
    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    /// Iterate over all entities (key, entity)
    pub fn entities(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.entities.iter()
    }

    /// Get the number of entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ===== TRANSFORM / VISIBILITY EDITS (refit-compatible) =====

    /// Set the world matrix of an entity. Returns false if the key is invalid.
    pub fn set_world_matrix(&mut self, key: EntityKey, matrix: Mat4) -> bool {
        match self.entities.get_mut(key) {
            Some(entity) => {
                entity.set_world_matrix(matrix);
                true
            }
            None => false,
        }
    }

    /// Set the visibility of an entity. Returns false if the key is invalid.
    pub fn set_visible(&mut self, key: EntityKey, visible: bool) -> bool {
        match self.entities.get_mut(key) {
            Some(entity) => {
                entity.set_visible(visible);
                true
            }
            None => false,
        }
    }

    /// Set the transform of one instance of an instanced or batched entity.
    ///
    /// Returns false if the key, the kind or the instance index is invalid.
    pub fn set_instance_matrix(&mut self, key: EntityKey, instance: usize, matrix: Mat4) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        match entity.content_mut() {
            EntityContent::Instanced { instance_matrices, .. } => {
                match instance_matrices.get_mut(instance) {
                    Some(slot) => {
                        *slot = matrix;
                        true
                    }
                    None => false,
                }
            }
            EntityContent::Batched { instances } => match instances.get_mut(instance) {
                Some(slot) => {
                    slot.matrix = matrix;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Show or hide one slot of a batched entity.
    pub fn set_batched_instance_visible(
        &mut self,
        key: EntityKey,
        instance: usize,
        visible: bool,
    ) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        match entity.content_mut() {
            EntityContent::Batched { instances } => match instances.get_mut(instance) {
                Some(slot) => {
                    slot.visible = visible;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    // ===== TOPOLOGY EDITS (require an index rebuild) =====

    /// Append an instance to an instanced entity.
    pub fn push_instance(&mut self, key: EntityKey, matrix: Mat4) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        match entity.content_mut() {
            EntityContent::Instanced { instance_matrices, .. } => {
                instance_matrices.push(matrix);
                true
            }
            _ => false,
        }
    }

    /// Append a slot to a batched entity.
    pub fn push_batched_instance(&mut self, key: EntityKey, instance: BatchedInstance) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        match entity.content_mut() {
            EntityContent::Batched { instances } => {
                instances.push(instance);
                true
            }
            _ => false,
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
