/// Entity — a node of the host scene graph.
///
/// An entity may group children, draw one geometry (single), draw one
/// geometry many times (instanced) or draw a different geometry per
/// instance slot (batched). The index only reads entities.

use glam::Mat4;
use slotmap::new_key_type;
use super::geometry::GeometryKey;

new_key_type! {
    /// Stable key for an Entity within a Scene.
    ///
    /// Keys remain valid even after other entities are removed.
    pub struct EntityKey;
}

/// Drawable shape of an entity, as seen by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// One draw, one implicit instance
    Single,
    /// One shared geometry drawn once per instance transform
    Instanced,
    /// A geometry and a transform per instance slot
    Batched,
}

/// One slot of a batched entity
#[derive(Debug, Clone, Copy)]
pub struct BatchedInstance {
    /// Geometry drawn by this slot
    pub geometry: GeometryKey,
    /// Transform of this slot, relative to the entity
    pub matrix: Mat4,
    /// Hidden slots stay indexed; queries skip them
    pub visible: bool,
}

/// What an entity draws
#[derive(Debug, Clone)]
pub enum EntityContent {
    /// Not drawable (transform or grouping node)
    Group,
    /// Single draw of a geometry
    Mesh {
        /// Geometry drawn
        geometry: GeometryKey,
    },
    /// Shared geometry drawn once per instance matrix
    Instanced {
        /// Geometry shared by all instances
        geometry: GeometryKey,
        /// Per-instance transforms, relative to the entity
        instance_matrices: Vec<Mat4>,
    },
    /// Per-instance geometry and transform
    Batched {
        /// Instance slots
        instances: Vec<BatchedInstance>,
    },
}

/// A scene graph node
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    /// World transform (pre-computed by the host)
    world_matrix: Mat4,
    visible: bool,
    children: Vec<EntityKey>,
    content: EntityContent,
}

impl Entity {
    pub(super) fn new(name: String, world_matrix: Mat4, content: EntityContent) -> Self {
        Self {
            name,
            world_matrix,
            visible: true,
            children: Vec::new(),
            content,
        }
    }

    // ===== ACCESSORS =====

    /// Get the debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the world transform matrix
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    pub(super) fn set_world_matrix(&mut self, matrix: Mat4) {
        self.world_matrix = matrix;
    }

    /// Check if visible
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub(super) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Get the child keys, in insertion order
    pub fn children(&self) -> &[EntityKey] {
        &self.children
    }

    pub(super) fn children_mut(&mut self) -> &mut Vec<EntityKey> {
        &mut self.children
    }

    /// Get the content
    pub fn content(&self) -> &EntityContent {
        &self.content
    }

    pub(super) fn content_mut(&mut self) -> &mut EntityContent {
        &mut self.content
    }

    // ===== DRAWABLE INTROSPECTION =====

    /// Drawable kind, or `None` for a group node.
    pub fn kind(&self) -> Option<EntityKind> {
        match &self.content {
            EntityContent::Group => None,
            EntityContent::Mesh { .. } => Some(EntityKind::Single),
            EntityContent::Instanced { .. } => Some(EntityKind::Instanced),
            EntityContent::Batched { .. } => Some(EntityKind::Batched),
        }
    }

    /// Number of drawn instances (1 for a single draw, 0 for a group).
    pub fn instance_count(&self) -> usize {
        match &self.content {
            EntityContent::Group => 0,
            EntityContent::Mesh { .. } => 1,
            EntityContent::Instanced { instance_matrices, .. } => instance_matrices.len(),
            EntityContent::Batched { instances } => instances.len(),
        }
    }

    /// Instance transform relative to the entity (identity for a single draw).
    pub fn local_matrix_at(&self, instance: usize) -> Option<Mat4> {
        match &self.content {
            EntityContent::Group => None,
            EntityContent::Mesh { .. } => (instance == 0).then_some(Mat4::IDENTITY),
            EntityContent::Instanced { instance_matrices, .. } => {
                instance_matrices.get(instance).copied()
            }
            EntityContent::Batched { instances } => instances.get(instance).map(|i| i.matrix),
        }
    }

    /// Geometry drawn by an instance.
    pub fn geometry_at(&self, instance: usize) -> Option<GeometryKey> {
        match &self.content {
            EntityContent::Group => None,
            EntityContent::Mesh { geometry } => (instance == 0).then_some(*geometry),
            EntityContent::Instanced { geometry, instance_matrices } => {
                (instance < instance_matrices.len()).then_some(*geometry)
            }
            EntityContent::Batched { instances } => instances.get(instance).map(|i| i.geometry),
        }
    }

    /// Whether an instance is drawn (entity visibility and slot visibility).
    pub fn is_instance_visible(&self, instance: usize) -> bool {
        if !self.visible {
            return false;
        }
        match &self.content {
            EntityContent::Batched { instances } => {
                instances.get(instance).is_some_and(|i| i.visible)
            }
            _ => instance < self.instance_count(),
        }
    }
}
