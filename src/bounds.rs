//! Axis-aligned bounding boxes.
//!
//! Boxes are float-valued: they only feed conservative pre-tests (cell
//! candidate selection in the exhaustive builder) and the initial
//! bounding volume, never an exact predicate.

use crate::linalg::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Vec3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Vec3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Sentinel bounds of an additional plane with no supporting points:
    /// it intersects every cell, so its box covers everything.
    pub fn infinite() -> Self {
        Self {
            min: Vec3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            max: Vec3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.grow(*p);
        }
        b
    }

    pub fn grow(&mut self, p: Vec3) {
        self.min = Vec3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Vec3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn is_infinite(&self) -> bool {
        self.min.x == f64::NEG_INFINITY
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Inflate by `padding` times the extent on every side.
    pub fn padded(&self, padding: f64) -> Self {
        let e = self.extent() * padding;
        Self {
            min: self.min - e,
            max: self.max + e,
        }
    }

    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    pub fn diagonal(&self) -> f64 {
        self.extent().length()
    }

    /// Separating-axis overlap test with tolerance `eps`.
    pub fn overlaps(&self, other: &Aabb, eps: f64) -> bool {
        for axis in 0..3 {
            let distance = (self.center()[axis] - other.center()[axis]).abs();
            if distance * 2.0 >= self.extent()[axis] + other.extent()[axis] + eps {
                return false;
            }
        }
        true
    }

    /// Plane/box slab test: the projection radius of the box onto the
    /// plane normal against the distance of the box center to the plane.
    pub fn intersects_plane(&self, plane: &[f64; 4], eps: f64) -> bool {
        let n = Vec3::new(plane[0], plane[1], plane[2]);
        let radius = (self.extent() * 0.5).dot(&n.abs());
        let distance = self.center().dot(&n) + plane[3];
        distance.abs() <= radius + eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_inflates_both_sides() {
        let b = Aabb::from_points(&[Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 4.0)]);
        let p = b.padded(0.1);
        assert_eq!(p.min, Vec3::new(-0.1, -0.2, -0.4));
        assert_eq!(p.max, Vec3::new(1.1, 2.2, 4.4));
    }

    #[test]
    fn overlap_is_symmetric_and_tolerant() {
        let a = Aabb::from_points(&[Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)]);
        let b = Aabb::from_points(&[Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0)]);
        let c = Aabb::from_points(&[Vec3::new(3.0, 3.0, 3.0), Vec3::new(4.0, 4.0, 4.0)]);
        assert!(a.overlaps(&b, 1e-5));
        assert!(b.overlaps(&a, 1e-5));
        assert!(!a.overlaps(&c, 1e-5));
    }

    #[test]
    fn slab_test_detects_crossing_plane() {
        let b = Aabb::from_points(&[Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)]);
        // z = 0.5 crosses, z = 2 does not
        assert!(b.intersects_plane(&[0.0, 0.0, 1.0, -0.5], 1e-5));
        assert!(!b.intersects_plane(&[0.0, 0.0, 1.0, -2.0], 1e-5));
    }
}
