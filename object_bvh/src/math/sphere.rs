/// Bounding sphere — the per-instance bound of the index.
///
/// Geometry spheres are computed once per geometry and moved into the
/// index frame by the instance matrix.

use glam::{DMat3, DVec3, Mat3, Mat4, Vec3};
use super::aabb::AABB;

/// A sphere given by center and radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Center of the sphere
    pub center: Vec3,
    /// Radius of the sphere (0 for a point bound)
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a sphere from center and radius.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Zero-radius sphere at a point.
    pub fn point(center: Vec3) -> Self {
        Self { center, radius: 0.0 }
    }

    /// Sphere enclosing a point set.
    ///
    /// The center is the center of the points' AABB and the radius the
    /// largest distance from it. Returns `None` when there are no points
    /// or any coordinate is not finite.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        if points.iter().any(|p| !p.is_finite()) {
            return None;
        }
        let center = AABB::from_points(points.iter().copied())?.center();

        let max_distance_squared = points
            .iter()
            .map(|p| p.distance_squared(center))
            .fold(0.0f32, f32::max);

        Some(Self {
            center,
            radius: max_distance_squared.sqrt(),
        })
    }

    /// Apply an affine transform.
    ///
    /// The radius is scaled by the largest stretch of the matrix's linear
    /// part, so the result encloses the transformed sphere under
    /// non-uniform scale and shear.
    pub fn transformed(&self, matrix: &Mat4) -> BoundingSphere {
        BoundingSphere {
            center: matrix.transform_point3(self.center),
            radius: self.radius * max_stretch(matrix),
        }
    }

    /// Box enclosing the sphere.
    pub fn to_aabb(&self) -> AABB {
        AABB::from_center_half_extents(self.center, Vec3::splat(self.radius))
    }

    /// Test if a point lies inside or on the sphere.
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }

    /// Test if two spheres overlap or touch.
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        let radius_sum = self.radius + other.radius;
        self.center.distance_squared(other.center) <= radius_sum * radius_sum
    }
}

/// Largest singular value of the upper 3x3 of `matrix`.
///
/// Square root of the largest eigenvalue of `MᵀM`, solved in closed form
/// in f64 and rounded up slightly so the f32 result never undershoots.
fn max_stretch(matrix: &Mat4) -> f32 {
    let m = Mat3::from_mat4(*matrix).as_dmat3();
    let a = m.transpose() * m;
    let trace = a.x_axis.x + a.y_axis.y + a.z_axis.z;

    let off_diagonal = a.y_axis.x * a.y_axis.x + a.z_axis.x * a.z_axis.x + a.z_axis.y * a.z_axis.y;
    if off_diagonal == 0.0 {
        // Orthogonal columns: the longest column is the exact stretch
        return a.x_axis.x.max(a.y_axis.y).max(a.z_axis.z).sqrt() as f32;
    }

    let q = trace / 3.0;
    let p2 = (a.x_axis.x - q).powi(2) + (a.y_axis.y - q).powi(2) + (a.z_axis.z - q).powi(2)
        + 2.0 * off_diagonal;

    let p = (p2 / 6.0).sqrt();
    let b = (a - DMat3::from_diagonal(DVec3::splat(q))) * (1.0 / p);
    let r = (b.determinant() / 2.0).clamp(-1.0, 1.0);
    let largest = q + 2.0 * p * (r.acos() / 3.0).cos();

    // Eigenvalues of MᵀM are non-negative and sum to the trace
    let largest = largest.clamp(0.0, trace.max(0.0));
    (largest.sqrt() * (1.0 + 1e-6)) as f32
}

#[cfg(test)]
#[path = "sphere_tests.rs"]
mod tests;
