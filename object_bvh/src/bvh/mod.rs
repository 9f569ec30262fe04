//! Object BVH module
//!
//! Indexes the drawable entities of a scene, one primitive per drawn
//! instance, and answers shape, frustum and ray queries against them.

mod primitive_id;
mod entity_set;
mod primitive_table;
mod bounds;
mod tree;
mod object_bvh;

pub use primitive_id::{PrimitiveId, PrimitiveIdCodec};
pub use entity_set::{EntityRef, EntitySet};
pub use primitive_table::PrimitiveTable;
pub use bounds::{BoundsExtractor, ResolvedBounds};
pub use tree::{
    BvhBuildDesc, BvhNode, BvhNodeKind, BvhTree,
    PrimitiveRange, PrimitiveSource, ShapecastCallbacks, BOUNDS_STRIDE,
};
pub use object_bvh::{
    ObjectBvh, ObjectBvhDesc, ObjectShapecast,
    PrimitiveHit, RaycastHit, BvhDiagnostics,
};
