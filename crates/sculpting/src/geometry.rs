//! Stateless geometry kernel used by picking and the sculpt tools.
//!
//! Ray-triangle intersection uses the Moller-Trumbore algorithm. Every
//! function is pure; degenerate (near-zero-area) triangles yield `None`
//! instead of propagating NaN into callers.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Epsilon for floating point comparisons in ray intersection
pub const EPSILON: f32 = 1e-6;

/// Squared cross-product length below which a triangle is degenerate
const DEGENERATE_AREA_SQ: f32 = 1e-20;

/// A ray with an origin and a (not necessarily normalized) direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Transform the ray by an affine matrix (direction is not renormalized,
    /// so hit parameters stay comparable with the source space)
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

/// A plane through `point` with unit `normal`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub point: Vec3,
    pub normal: Vec3,
}

impl Plane {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal: normal.normalize_or_zero(),
        }
    }

    pub fn signed_distance(&self, p: Vec3) -> f32 {
        signed_distance_to_plane(p, self.point, self.normal)
    }

    pub fn mirror_point(&self, p: Vec3) -> Vec3 {
        mirror_point(p, self.point, self.normal)
    }

    pub fn mirror_direction(&self, d: Vec3) -> Vec3 {
        mirror_direction(d, self.normal)
    }
}

/// Result of a ray-triangle intersection test
#[derive(Debug, Clone, Copy)]
pub struct TriangleHit {
    /// Distance along the ray to the intersection point
    pub t: f32,
    /// Barycentric coordinate u (weight for vertex 1)
    pub u: f32,
    /// Barycentric coordinate v (weight for vertex 2)
    pub v: f32,
}

impl TriangleHit {
    /// Barycentric weights for (v0, v1, v2); they sum to one
    pub fn barycentric(&self) -> [f32; 3] {
        [1.0 - self.u - self.v, self.u, self.v]
    }
}

/// Moller-Trumbore ray-triangle intersection algorithm.
///
/// Returns `None` when the ray is parallel to the triangle plane, the hit
/// lies behind the origin, or the triangle is degenerate.
pub fn ray_triangle_intersection(
    ray_origin: Vec3,
    ray_dir: Vec3,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
) -> Option<TriangleHit> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let area_sq = edge1.cross(edge2).length_squared();
    if area_sq < DEGENERATE_AREA_SQ {
        return None;
    }

    let pvec = ray_dir.cross(edge2);
    let det = edge1.dot(pvec);

    // Parallel test scaled by triangle size and ray length so that small
    // triangles are not mistaken for parallel ones
    if det.abs() <= EPSILON * area_sq.sqrt() * ray_dir.length() {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = ray_origin - v0;

    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = ray_dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;
    if t < 0.0 || !t.is_finite() {
        return None;
    }

    Some(TriangleHit { t, u, v })
}

/// Closest point on a triangle to a query point
#[derive(Debug, Clone, Copy)]
pub struct ClosestPoint {
    pub point: Vec3,
    pub distance_sq: f32,
}

/// Squared distance from `p` to triangle (a, b, c), with the closest point.
///
/// Region classification after Ericson, "Real-Time Collision Detection" 5.1.5.
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<ClosestPoint> {
    let ab = b - a;
    let ac = c - a;
    if ab.cross(ac).length_squared() < DEGENERATE_AREA_SQ {
        return None;
    }

    let done = |point: Vec3| {
        Some(ClosestPoint {
            point,
            distance_sq: point.distance_squared(p),
        })
    };

    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return done(a);
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return done(b);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return done(a + ab * v);
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return done(c);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return done(a + ac * w);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return done(b + (c - b) * w);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    done(a + ab * v + ac * w)
}

/// Squared distance from `p` to the segment (a, b)
pub fn distance_sq_to_segment(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < DEGENERATE_AREA_SQ {
        return p.distance_squared(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance_squared(a + ab * t)
}

/// Signed distance from `p` to the plane through `origin` with unit `normal`
pub fn signed_distance_to_plane(p: Vec3, origin: Vec3, normal: Vec3) -> f32 {
    (p - origin).dot(normal)
}

/// Reflect a point across the plane through `origin` with unit `normal`
pub fn mirror_point(p: Vec3, origin: Vec3, normal: Vec3) -> Vec3 {
    p - normal * (2.0 * signed_distance_to_plane(p, origin, normal))
}

/// Reflect a direction (no translation) across a plane with unit `normal`
pub fn mirror_direction(d: Vec3, normal: Vec3) -> Vec3 {
    d - normal * (2.0 * d.dot(normal))
}

/// Intersect the infinite line through `origin` along `direction` with a plane.
///
/// Returns `None` when the line is parallel to the plane.
pub fn line_plane_intersection(
    origin: Vec3,
    direction: Vec3,
    plane_point: Vec3,
    plane_normal: Vec3,
) -> Option<Vec3> {
    let denom = direction.dot(plane_normal);
    if denom.abs() < EPSILON * direction.length().max(EPSILON) {
        return None;
    }
    let t = (plane_point - origin).dot(plane_normal) / denom;
    Some(origin + direction * t)
}

/// Interpolate a Vec3 attribute using barycentric coordinates.
pub fn interpolate_vec3(v0: Vec3, v1: Vec3, v2: Vec3, u: f32, v: f32) -> Vec3 {
    let w = 1.0 - u - v;
    v0 * w + v1 * u + v2 * v
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal deterministic generator so the sweeps below are reproducible
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
        }

        fn next_vec3(&mut self, scale: f32) -> Vec3 {
            Vec3::new(
                (self.next_f32() - 0.5) * scale,
                (self.next_f32() - 0.5) * scale,
                (self.next_f32() - 0.5) * scale,
            )
        }
    }

    #[test]
    fn test_ray_triangle_hit() {
        let v0 = Vec3::new(0.0, 0.0, 0.0);
        let v1 = Vec3::new(1.0, 0.0, 0.0);
        let v2 = Vec3::new(0.0, 1.0, 0.0);

        let origin = Vec3::new(0.25, 0.25, 1.0);
        let dir = Vec3::new(0.0, 0.0, -1.0);

        let hit = ray_triangle_intersection(origin, dir, v0, v1, v2).unwrap();
        assert!((hit.t - 1.0).abs() < EPSILON);
        assert!((hit.u - 0.25).abs() < EPSILON);
        assert!((hit.v - 0.25).abs() < EPSILON);
    }

    #[test]
    fn test_ray_triangle_miss_and_behind() {
        let v0 = Vec3::new(0.0, 0.0, 0.0);
        let v1 = Vec3::new(1.0, 0.0, 0.0);
        let v2 = Vec3::new(0.0, 1.0, 0.0);

        let miss = ray_triangle_intersection(Vec3::new(2.0, 2.0, 1.0), -Vec3::Z, v0, v1, v2);
        assert!(miss.is_none());

        let behind = ray_triangle_intersection(Vec3::new(0.25, 0.25, 1.0), Vec3::Z, v0, v1, v2);
        assert!(behind.is_none());
    }

    #[test]
    fn test_ray_parallel_and_degenerate() {
        let v0 = Vec3::ZERO;
        let v1 = Vec3::X;
        let v2 = Vec3::Y;
        let parallel = ray_triangle_intersection(Vec3::new(0.1, 0.1, 0.0), Vec3::X, v0, v1, v2);
        assert!(parallel.is_none());

        let sliver = ray_triangle_intersection(
            Vec3::new(0.5, 0.0, 1.0),
            -Vec3::Z,
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(2.0, 0.0, 0.0),
        );
        assert!(sliver.is_none());
    }

    #[test]
    fn test_ray_hits_match_analytic_point() {
        let mut rng = Lcg(7);
        for _ in 0..200 {
            let v0 = rng.next_vec3(4.0);
            let v1 = rng.next_vec3(4.0);
            let v2 = rng.next_vec3(4.0);
            let normal = (v1 - v0).cross(v2 - v0);
            if normal.length() < 0.05 {
                continue;
            }

            // Aim at a known interior point from a random origin off the plane
            let (a, b) = (rng.next_f32() * 0.5, rng.next_f32() * 0.5);
            let target = v0 * (1.0 - a - b) + v1 * a + v2 * b;
            let origin = target + normal.normalize() * (1.0 + rng.next_f32()) + rng.next_vec3(0.5);
            let dir = (target - origin).normalize();

            let Some(hit) = ray_triangle_intersection(origin, dir, v0, v1, v2) else {
                continue;
            };
            let bary = hit.barycentric();
            assert!((bary.iter().sum::<f32>() - 1.0).abs() < 1e-4);
            let point = origin + dir * hit.t;
            assert!(point.distance(target) < 1e-3, "{point:?} vs {target:?}");
        }
    }

    #[test]
    fn test_closest_point_regions() {
        let a = Vec3::ZERO;
        let b = Vec3::X;
        let c = Vec3::Y;

        let inside = closest_point_on_triangle(Vec3::new(0.2, 0.2, 3.0), a, b, c).unwrap();
        assert!(inside.point.distance(Vec3::new(0.2, 0.2, 0.0)) < EPSILON);
        assert!((inside.distance_sq - 9.0).abs() < 1e-4);

        let vertex = closest_point_on_triangle(Vec3::new(-1.0, -1.0, 0.0), a, b, c).unwrap();
        assert!(vertex.point.distance(a) < EPSILON);

        let edge = closest_point_on_triangle(Vec3::new(0.5, -2.0, 0.0), a, b, c).unwrap();
        assert!(edge.point.distance(Vec3::new(0.5, 0.0, 0.0)) < EPSILON);

        let hyp = closest_point_on_triangle(Vec3::new(1.0, 1.0, 0.0), a, b, c).unwrap();
        assert!(hyp.point.distance(Vec3::new(0.5, 0.5, 0.0)) < EPSILON);

        assert!(closest_point_on_triangle(Vec3::ONE, a, b, b).is_none());
    }

    #[test]
    fn test_segment_distance() {
        let d = distance_sq_to_segment(Vec3::new(0.5, 1.0, 0.0), Vec3::ZERO, Vec3::X);
        assert!((d - 1.0).abs() < EPSILON);
        let past_end = distance_sq_to_segment(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO, Vec3::X);
        assert!((past_end - 4.0).abs() < EPSILON);
    }

    #[test]
    fn test_plane_mirror_and_line_intersection() {
        let plane = Plane::new(Vec3::new(1.0, 0.0, 0.0), Vec3::X);
        assert!((plane.signed_distance(Vec3::new(3.0, 5.0, 0.0)) - 2.0).abs() < EPSILON);

        let mirrored = plane.mirror_point(Vec3::new(3.0, 5.0, -1.0));
        assert!(mirrored.distance(Vec3::new(-1.0, 5.0, -1.0)) < EPSILON);
        assert!(plane.mirror_point(mirrored).distance(Vec3::new(3.0, 5.0, -1.0)) < EPSILON);

        let dir = plane.mirror_direction(Vec3::new(1.0, 1.0, 0.0));
        assert!(dir.distance(Vec3::new(-1.0, 1.0, 0.0)) < EPSILON);

        let hit = line_plane_intersection(Vec3::new(5.0, 2.0, 0.0), -Vec3::X, plane.point, plane.normal);
        assert!(hit.unwrap().distance(Vec3::new(1.0, 2.0, 0.0)) < EPSILON);
        assert!(line_plane_intersection(Vec3::ZERO, Vec3::Y, plane.point, plane.normal).is_none());
    }

    #[test]
    fn test_ray_transform() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        let moved = ray.transformed(&Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(moved.origin, Vec3::new(1.0, 0.0, 5.0));
        assert_eq!(moved.direction, -Vec3::Z);
        assert_eq!(moved.at(5.0), Vec3::new(1.0, 0.0, 0.0));
    }
}
