//! Math module — bounding volumes and query shapes.
//!
//! Plain `Copy` value types built on glam. Every bound and query shape
//! used by the index lives here so the scene and bvh modules share one
//! vocabulary.

mod aabb;
mod sphere;
mod ray;
mod frustum;

pub use aabb::AABB;
pub use sphere::BoundingSphere;
pub use ray::Ray;
pub use frustum::{Frustum, BoundsTest};
