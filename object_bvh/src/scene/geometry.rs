/// Geometry — vertex positions shared by entities and instances.
///
/// Only the data the index needs is kept: positions for bounds, optional
/// indices and a topology for precise triangle raycasts.

use glam::{Mat4, Vec3};
use slotmap::new_key_type;
use crate::math::BoundingSphere;

new_key_type! {
    /// Stable key for a Geometry within a Scene.
    pub struct GeometryKey;
}

/// How the positions of a geometry are assembled into primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    /// Every three indices (or vertices) form a triangle
    Triangles,
    /// Every two indices (or vertices) form a line segment
    Lines,
    /// Every index (or vertex) is a point
    Points,
}

/// Vertex data of a drawable shape
#[derive(Debug, Clone)]
pub struct Geometry {
    name: String,
    positions: Vec<Vec3>,
    indices: Option<Vec<u32>>,
    topology: PrimitiveTopology,
}

impl Geometry {
    /// Create a geometry.
    ///
    /// # Arguments
    ///
    /// * `name` - Debug name
    /// * `positions` - Vertex positions in local space
    /// * `indices` - Optional index buffer into `positions`
    /// * `topology` - How vertices are assembled
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        indices: Option<Vec<u32>>,
        topology: PrimitiveTopology,
    ) -> Self {
        Self {
            name: name.into(),
            positions,
            indices,
            topology,
        }
    }

    /// Create a non-indexed triangle list.
    pub fn triangles(name: impl Into<String>, positions: Vec<Vec3>) -> Self {
        Self::new(name, positions, None, PrimitiveTopology::Triangles)
    }

    /// Axis-aligned box centered at the origin, as 12 indexed triangles.
    pub fn cuboid(name: impl Into<String>, half_extents: Vec3) -> Self {
        let h = half_extents;
        let positions = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
        ];
        Self::new(name, positions, Some(indices), PrimitiveTopology::Triangles)
    }

    /// Get the debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the vertex positions (local space)
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Get the index buffer, if any
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Get the topology
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Replace the vertex positions.
    ///
    /// Cached bounds held by an index must be invalidated afterwards.
    pub fn set_positions(&mut self, positions: Vec<Vec3>) {
        self.positions = positions;
    }

    /// Bounding sphere of the positions.
    ///
    /// Returns `None` for an empty geometry or non-finite positions.
    pub fn compute_bounding_sphere(&self) -> Option<BoundingSphere> {
        BoundingSphere::from_points(&self.positions)
    }

    /// Iterate the triangles of a `Triangles` geometry, transformed by `matrix`.
    ///
    /// Yields nothing for other topologies. Out-of-range indices are skipped.
    pub fn transformed_triangles<'a>(
        &'a self,
        matrix: &'a Mat4,
    ) -> impl Iterator<Item = [Vec3; 3]> + 'a {
        let triangle_count = match self.topology {
            PrimitiveTopology::Triangles => match &self.indices {
                Some(indices) => indices.len() / 3,
                None => self.positions.len() / 3,
            },
            _ => 0,
        };

        (0..triangle_count).filter_map(move |t| {
            let corner = |c: usize| -> Option<Vec3> {
                let vertex = match &self.indices {
                    Some(indices) => *indices.get(t * 3 + c)? as usize,
                    None => t * 3 + c,
                };
                self.positions.get(vertex).map(|p| matrix.transform_point3(*p))
            };
            Some([corner(0)?, corner(1)?, corner(2)?])
        })
    }
}

#[cfg(test)]
#[path = "geometry_tests.rs"]
mod tests;
