//! Scene module
//!
//! The host scene graph the index reads: entities with world matrices,
//! their children, and the geometries they draw.

mod geometry;
mod entity;
mod scene;

pub use geometry::{Geometry, GeometryKey, PrimitiveTopology};
pub use entity::{Entity, EntityKey, EntityKind, EntityContent, BatchedInstance};
pub use scene::Scene;
