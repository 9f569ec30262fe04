/// BvhTree — generic bounding volume hierarchy over a flat primitive buffer.
///
/// The tree knows nothing about entities: it sees primitives only through
/// the [`PrimitiveSource`] trait, which reports root ranges, writes
/// primitive bounds as six-float rows and reorders primitives when the
/// build partitions them.
///
/// Bounds rows are `(cx, hx, cy, hy, cz, hz)`: center and half extent per
/// axis.

use glam::Vec3;
use crate::error::Result;
use crate::math::{AABB, BoundsTest};
use crate::{bvh_bail, bvh_trace};

/// Floats per primitive in a bounds buffer
pub const BOUNDS_STRIDE: usize = 6;

/// Contiguous run of primitives in the primitive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveRange {
    /// First primitive
    pub offset: usize,
    /// Number of primitives
    pub count: usize,
}

/// Primitive provider consumed by [`BvhTree`] during build and refit.
pub trait PrimitiveSource {
    /// Ranges of the primitive buffer that each get their own root node.
    fn root_ranges(&self) -> Vec<PrimitiveRange>;

    /// Write the bounds of primitives `[offset, offset + count)`.
    ///
    /// Primitive `i` goes to row `target_offset + (i - offset)` of `target`.
    fn compute_primitive_bounds(
        &mut self,
        offset: usize,
        count: usize,
        target: &mut [f32],
        target_offset: usize,
    ) -> Result<()>;

    /// Swap two primitives of the buffer.
    fn swap_primitives(&mut self, a: usize, b: usize);
}

/// Callbacks driving [`BvhTree::shapecast`].
pub trait ShapecastCallbacks {
    /// Classify a node's bounds against the query shape.
    fn intersects_bounds(&mut self, bounds: &AABB, is_leaf: bool, depth: u32, node_index: usize) -> BoundsTest;

    /// Visit a leaf's primitive range. Returning true stops the walk.
    ///
    /// `contained` is true when an ancestor was classified `Inside`.
    fn intersects_range(
        &mut self,
        offset: usize,
        count: usize,
        contained: bool,
        depth: u32,
        node_index: usize,
    ) -> bool;
}

/// Build parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhBuildDesc {
    /// Nodes with at most this many primitives become leaves
    pub max_leaf_size: usize,
    /// Nodes at this depth become leaves regardless of size (root = 0)
    pub max_depth: u32,
}

impl Default for BvhBuildDesc {
    fn default() -> Self {
        Self {
            max_leaf_size: 10,
            max_depth: 40,
        }
    }
}

/// Node payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvhNodeKind {
    /// Primitives `[offset, offset + count)`
    Leaf { offset: usize, count: usize },
    /// Two children (indices into the node array)
    Internal { left: usize, right: usize },
}

/// One node of the hierarchy
#[derive(Debug, Clone, Copy)]
pub struct BvhNode {
    /// Union of the bounds of every primitive below this node
    pub bounds: AABB,
    /// Leaf range or children
    pub kind: BvhNodeKind,
}

impl BvhNode {
    /// Whether this node is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, BvhNodeKind::Leaf { .. })
    }
}

/// Binary BVH built by center split on the longest centroid axis.
pub struct BvhTree {
    /// Flat node array (children stored after their parent)
    nodes: Vec<BvhNode>,
    /// Root ranges at build time and their root node (None for an empty range)
    roots: Vec<(PrimitiveRange, Option<usize>)>,
    /// Bounds rows of every primitive, in current buffer order
    bounds: Vec<f32>,
    desc: BvhBuildDesc,
}

impl BvhTree {
    /// Build the hierarchy over every root range of `source`.
    ///
    /// Reorders the source's primitives through `swap_primitives`.
    pub fn build<S: PrimitiveSource + ?Sized>(source: &mut S, desc: BvhBuildDesc) -> Result<Self> {
        let ranges = source.root_ranges();
        let mut bounds = Self::compute_bounds(source, &ranges)?;
        let rows: &mut [[f32; BOUNDS_STRIDE]] = bytemuck::cast_slice_mut(&mut bounds);

        let mut nodes = Vec::new();
        let mut roots = Vec::with_capacity(ranges.len());
        for range in ranges {
            let root = if range.count > 0 {
                Some(Self::build_node(&mut nodes, source, rows, range.offset, range.count, 0, &desc))
            } else {
                None
            };
            roots.push((range, root));
        }

        bvh_trace!(
            "object_bvh::BvhTree",
            "Built {} nodes over {} root range(s)",
            nodes.len(), roots.len()
        );
        Ok(Self { nodes, roots, bounds, desc })
    }

    /// Bounds rows for every range, each written at its own offset.
    fn compute_bounds<S: PrimitiveSource + ?Sized>(source: &mut S, ranges: &[PrimitiveRange]) -> Result<Vec<f32>> {
        let len = ranges.iter().map(|range| range.offset + range.count).max().unwrap_or(0);
        let mut bounds = vec![0.0f32; len * BOUNDS_STRIDE];
        for range in ranges.iter().filter(|range| range.count > 0) {
            source.compute_primitive_bounds(range.offset, range.count, &mut bounds, range.offset)?;
        }
        Ok(bounds)
    }

    fn build_node<S: PrimitiveSource + ?Sized>(
        nodes: &mut Vec<BvhNode>,
        source: &mut S,
        rows: &mut [[f32; BOUNDS_STRIDE]],
        start: usize,
        count: usize,
        depth: u32,
        desc: &BvhBuildDesc,
    ) -> usize {
        let span = &rows[start..start + count];
        let bounds = span.iter().fold(AABB::EMPTY, |acc, row| acc.union(&row_aabb(row)));

        let node_index = nodes.len();
        nodes.push(BvhNode {
            bounds,
            kind: BvhNodeKind::Leaf { offset: start, count },
        });

        if count <= desc.max_leaf_size.max(1) || depth >= desc.max_depth {
            return node_index;
        }

        let centroids = span.iter().fold(AABB::EMPTY, |mut acc, row| {
            acc.expand_to_point(row_center(row));
            acc
        });
        let axis = centroids.longest_axis();
        if !(centroids.max[axis] > centroids.min[axis]) {
            // All centroids coincide: no split separates them
            return node_index;
        }
        let split = centroids.center()[axis];

        // Partition [start, end) so centroids below the split come first
        let mut i = start;
        let mut j = start + count;
        while i < j {
            if row_center(&rows[i])[axis] < split {
                i += 1;
            } else {
                j -= 1;
                rows.swap(i, j);
                source.swap_primitives(i, j);
            }
        }
        let mut mid = i;
        if mid == start || mid == start + count {
            mid = start + count / 2;
        }

        let left = Self::build_node(nodes, source, rows, start, mid - start, depth + 1, desc);
        let right = Self::build_node(nodes, source, rows, mid, start + count - mid, depth + 1, desc);
        nodes[node_index].kind = BvhNodeKind::Internal { left, right };

        node_index
    }

    /// Recompute every node's bounds without changing the tree shape.
    ///
    /// # Errors
    ///
    /// `TopologyChanged` if the source's root ranges differ from the ones
    /// the tree was built with; errors from `compute_primitive_bounds`.
    pub fn refit<S: PrimitiveSource + ?Sized>(&mut self, source: &mut S) -> Result<()> {
        let ranges = source.root_ranges();
        let built: Vec<PrimitiveRange> = self.roots.iter().map(|(range, _)| *range).collect();
        if ranges != built {
            bvh_bail!(
                TopologyChanged,
                "object_bvh::BvhTree",
                "Root ranges changed since build ({:?} -> {:?})",
                built, ranges
            );
        }

        self.bounds = Self::compute_bounds(source, &ranges)?;
        let rows: &[[f32; BOUNDS_STRIDE]] = bytemuck::cast_slice(&self.bounds);
        for root in self.roots.iter().filter_map(|(_, root)| *root) {
            Self::refit_node(&mut self.nodes, rows, root);
        }
        Ok(())
    }

    fn refit_node(nodes: &mut [BvhNode], rows: &[[f32; BOUNDS_STRIDE]], node_index: usize) -> AABB {
        let bounds = match nodes[node_index].kind {
            BvhNodeKind::Leaf { offset, count } => rows[offset..offset + count]
                .iter()
                .fold(AABB::EMPTY, |acc, row| acc.union(&row_aabb(row))),
            BvhNodeKind::Internal { left, right } => {
                let left_bounds = Self::refit_node(nodes, rows, left);
                let right_bounds = Self::refit_node(nodes, rows, right);
                left_bounds.union(&right_bounds)
            }
        };
        nodes[node_index].bounds = bounds;
        bounds
    }

    /// Walk the tree, pruning with `intersects_bounds`.
    ///
    /// Returns true as soon as `intersects_range` returns true.
    pub fn shapecast<C: ShapecastCallbacks + ?Sized>(&self, callbacks: &mut C) -> bool {
        self.roots
            .iter()
            .filter_map(|(_, root)| *root)
            .any(|root| self.shapecast_node(root, 0, callbacks))
    }

    fn shapecast_node<C: ShapecastCallbacks + ?Sized>(&self, node_index: usize, depth: u32, callbacks: &mut C) -> bool {
        let node = &self.nodes[node_index];
        match callbacks.intersects_bounds(&node.bounds, node.is_leaf(), depth, node_index) {
            BoundsTest::Outside => false,
            BoundsTest::Inside => self.report_contained(node_index, depth, callbacks),
            BoundsTest::Partial => match node.kind {
                BvhNodeKind::Leaf { offset, count } => {
                    callbacks.intersects_range(offset, count, false, depth, node_index)
                }
                BvhNodeKind::Internal { left, right } => {
                    self.shapecast_node(left, depth + 1, callbacks)
                        || self.shapecast_node(right, depth + 1, callbacks)
                }
            },
        }
    }

    /// Report every leaf below a fully contained node.
    fn report_contained<C: ShapecastCallbacks + ?Sized>(&self, node_index: usize, depth: u32, callbacks: &mut C) -> bool {
        match self.nodes[node_index].kind {
            BvhNodeKind::Leaf { offset, count } => {
                callbacks.intersects_range(offset, count, true, depth, node_index)
            }
            BvhNodeKind::Internal { left, right } => {
                self.report_contained(left, depth + 1, callbacks)
                    || self.report_contained(right, depth + 1, callbacks)
            }
        }
    }

    // ===== ACCESSORS =====

    /// All nodes
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Root node index of each non-empty root range
    pub fn root_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.roots.iter().filter_map(|(_, root)| *root)
    }

    /// Box of a primitive as of the last build or refit
    pub fn primitive_bounds(&self, primitive_index: usize) -> Option<AABB> {
        let rows: &[[f32; BOUNDS_STRIDE]] = bytemuck::cast_slice(&self.bounds);
        rows.get(primitive_index).map(row_aabb)
    }

    /// Build parameters
    pub fn desc(&self) -> &BvhBuildDesc {
        &self.desc
    }
}

/// Box of a bounds row
fn row_aabb(row: &[f32; BOUNDS_STRIDE]) -> AABB {
    AABB::from_center_half_extents(row_center(row), Vec3::new(row[1], row[3], row[5]))
}

/// Center of a bounds row
fn row_center(row: &[f32; BOUNDS_STRIDE]) -> Vec3 {
    Vec3::new(row[0], row[2], row[4])
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
