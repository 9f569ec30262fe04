/// Ray for raycast queries.
///
/// All intersection routines return the distance `t` along the
/// normalized direction, so hits from different shapes sort together.

use glam::Vec3;
use super::aabb::AABB;
use super::sphere::BoundingSphere;

/// A half-line with an origin and a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Origin of the ray
    pub origin: Vec3,
    /// Unit direction of the ray
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray. The direction is normalized.
    ///
    /// A zero direction gives a NaN direction, which raycasts reject.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Slab test against a box.
    ///
    /// Returns the entry distance (0 when the origin is inside the box).
    pub fn intersect_aabb(&self, aabb: &AABB) -> Option<f32> {
        let inv_dir = self.direction.recip();
        let t1 = (aabb.min - self.origin) * inv_dir;
        let t2 = (aabb.max - self.origin) * inv_dir;

        let t_near = t1.min(t2).max_element().max(0.0);
        let t_far = t1.max(t2).min_element();

        if t_far >= t_near { Some(t_near) } else { None }
    }

    /// Ray/sphere intersection.
    ///
    /// Returns the closest non-negative distance, 0 when the origin is
    /// inside the sphere.
    pub fn intersect_sphere(&self, sphere: &BoundingSphere) -> Option<f32> {
        let oc = self.origin - sphere.center;
        let b = oc.dot(self.direction);
        let c = oc.length_squared() - sphere.radius * sphere.radius;

        if c <= 0.0 {
            return Some(0.0);
        }
        if b > 0.0 {
            return None;
        }

        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }

        Some(-b - discriminant.sqrt())
    }

    /// Möller-Trumbore ray/triangle intersection (double sided).
    pub fn intersect_triangle(&self, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
        const DET_EPSILON: f32 = 1e-8;

        let edge1 = v1 - v0;
        let edge2 = v2 - v0;
        let h = self.direction.cross(edge2);
        let det = edge1.dot(h);

        if det.abs() < DET_EPSILON {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = self.origin - v0;
        let u = inv_det * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = inv_det * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = inv_det * edge2.dot(q);
        if t >= 0.0 { Some(t) } else { None }
    }
}

#[cfg(test)]
#[path = "ray_tests.rs"]
mod tests;
