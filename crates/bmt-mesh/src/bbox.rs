//! Axis-aligned bounding boxes in mesh space.

use glam::Vec3;

/// An axis-aligned bounding box stored as min/max corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BBox {
    /// Create a box from two corners. Components are sorted so that
    /// `min <= max` on every axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Build a box from the on-disk `[min x, min y, min z, max x, max y, max z]`
    /// layout without reordering.
    pub fn from_components(c: [f32; 6]) -> Self {
        Self {
            min: Vec3::new(c[0], c[1], c[2]),
            max: Vec3::new(c[3], c[4], c[5]),
        }
    }

    /// The box as `[[min], [max]]`, the shape frustum callbacks usually expect.
    pub fn to_array(&self) -> [[f32; 3]; 2] {
        [self.min.to_array(), self.max.to_array()]
    }

    /// Grow this box in place so that it also covers `other`.
    pub fn enlarge(&mut self, other: &BBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// The smallest box covering both inputs.
    #[must_use]
    pub fn union(&self, other: &BBox) -> BBox {
        let mut out = *self;
        out.enlarge(other);
        out
    }

    /// Scale only the z components of both corners.
    ///
    /// Used for vertical exaggeration of terrain: x and y are left untouched.
    /// A negative scale mirrors the box, and the corners are re-sorted.
    #[must_use]
    pub fn scale_z(&self, z_scale: f32) -> BBox {
        BBox::new(
            Vec3::new(self.min.x, self.min.y, self.min.z * z_scale),
            Vec3::new(self.max.x, self.max.y, self.max.z * z_scale),
        )
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Inclusive point containment.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Euclidean distance from `p` to the closest point of the box (0 inside).
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        let closest = p.clamp(self.min, self.max);
        closest.distance(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_corners() {
        let b = BBox::new(Vec3::new(5.0, -1.0, 3.0), Vec3::new(1.0, 2.0, -3.0));
        assert_eq!(b.min, Vec3::new(1.0, -1.0, -3.0));
        assert_eq!(b.max, Vec3::new(5.0, 2.0, 3.0));
    }

    #[test]
    fn test_union_covers_both() {
        let a = BBox::new(Vec3::ZERO, Vec3::splat(1.0));
        let b = BBox::new(Vec3::new(2.0, -1.0, 0.5), Vec3::new(3.0, 0.0, 4.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(u.max, Vec3::new(3.0, 1.0, 4.0));
    }

    /// Only the z components change under vertical exaggeration.
    #[test]
    fn test_scale_z_leaves_xy_alone() {
        let b = BBox::new(Vec3::ZERO, Vec3::splat(10.0));
        let s = b.scale_z(2.0);
        assert_eq!(s.to_array(), [[0.0, 0.0, 0.0], [10.0, 10.0, 20.0]]);
    }

    #[test]
    fn test_negative_scale_z_resorts_corners() {
        let b = BBox::new(Vec3::new(0.0, 0.0, 2.0), Vec3::new(1.0, 1.0, 5.0));
        let s = b.scale_z(-2.0);
        assert_eq!(s.to_array(), [[0.0, 0.0, -10.0], [1.0, 1.0, -4.0]]);
    }

    #[test]
    fn test_distance_to_point() {
        let b = BBox::new(Vec3::ZERO, Vec3::splat(1.0));
        assert_eq!(b.distance_to_point(Vec3::splat(0.5)), 0.0);
        assert!((b.distance_to_point(Vec3::new(4.0, 0.5, 0.5)) - 3.0).abs() < 1e-6);
        assert!(b.contains_point(Vec3::ONE));
        assert!(!b.contains_point(Vec3::new(1.01, 0.0, 0.0)));
    }
}
