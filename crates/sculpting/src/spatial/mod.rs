//! Spatial data structures for picking and brush queries.
//!
//! This module provides:
//! - [`Aabb`] bounding boxes with sphere and ray tests
//! - [`Bvh`], a face hierarchy for nearest-hit ray casts and radius queries

pub mod bvh;

pub use bvh::{Bvh, BvhNode, RadiusHits, RayHit};

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inverted box that contains nothing; any include makes it valid
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.include_point(p);
        }
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn include_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Axis with the largest extent (0 = x, 1 = y, 2 = z)
    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }

    /// Slab test against a ray given its reciprocal direction.
    ///
    /// Returns the entry parameter (clamped to 0 when the origin is inside),
    /// or `None` if the ray misses or the box lies behind the origin.
    pub fn intersect_ray(&self, origin: Vec3, inv_dir: Vec3) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let near = t0.min(t1);
        let far = t0.max(t1);

        let t_enter = near.x.max(near.y).max(near.z).max(0.0);
        let t_exit = far.x.min(far.y).min(far.z);

        (t_enter <= t_exit).then_some(t_enter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_basics() {
        let aabb = Aabb::from_points([Vec3::ZERO, Vec3::new(2.0, 1.0, 0.5)]);
        assert_eq!(aabb.center(), Vec3::new(1.0, 0.5, 0.25));
        assert_eq!(aabb.longest_axis(), 0);
        assert!(aabb.contains_point(Vec3::new(1.0, 1.0, 0.0)));
        assert!(!aabb.contains_point(Vec3::new(1.0, 1.1, 0.0)));
        assert!(aabb.intersects_sphere(Vec3::new(3.0, 0.5, 0.25), 1.0));
        assert!(!aabb.intersects_sphere(Vec3::new(3.5, 0.5, 0.25), 1.0));
        assert!(Aabb::empty().is_empty());
    }

    #[test]
    fn test_ray_slab() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));

        let hit = aabb.intersect_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0).recip());
        assert!((hit.unwrap() - 4.0).abs() < 1e-6);

        // Origin inside the box
        let inside = aabb.intersect_ray(Vec3::ZERO, Vec3::X.recip());
        assert_eq!(inside, Some(0.0));

        // Box behind the origin
        assert!(aabb.intersect_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::Z.recip()).is_none());

        // Parallel miss
        assert!(
            aabb.intersect_ray(Vec3::new(2.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0).recip())
                .is_none()
        );
    }
}
