//! View-frustum capability used to gate refinement spatially.

use glam::{Mat4, Vec3, Vec4};

use crate::bbox::BBox;

/// Visibility volume supplied by the rendering layer.
///
/// Implementations must be side-effect free: extraction may call
/// `intersects` any number of times per arc.
pub trait ViewFrustum {
    /// True if any part of `bbox` may be visible.
    fn intersects(&self, bbox: &BBox) -> bool;
}

impl<F> ViewFrustum for F
where
    F: Fn(&BBox) -> bool,
{
    fn intersects(&self, bbox: &BBox) -> bool {
        self(bbox)
    }
}

/// A frustum made of six inward-facing planes `(normal, d)` where
/// `normal.dot(p) + d >= 0` means `p` is inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneFrustum {
    /// Ordered left, right, bottom, top, near, far.
    pub planes: [Vec4; 6],
}

impl PlaneFrustum {
    pub fn new(planes: [Vec4; 6]) -> Self {
        Self { planes }
    }

    /// Extract the planes of a view-projection matrix with a `[0, 1]` depth
    /// range (the glam `perspective_rh` convention).
    pub fn from_view_projection(m: Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(normalize_plane);
        Self { planes }
    }

    /// Convenience constructor for a perspective camera looking at `target`.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y_radians: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        let proj = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
        Self::from_view_projection(proj * view)
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.truncate().dot(p) + plane.w >= 0.0)
    }
}

fn normalize_plane(p: Vec4) -> Vec4 {
    let len = p.truncate().length();
    if len > 0.0 { p / len } else { p }
}

impl ViewFrustum for PlaneFrustum {
    /// p-vertex test: the box is outside as soon as the corner furthest along
    /// some plane normal is behind that plane. Conservative near edges.
    fn intersects(&self, bbox: &BBox) -> bool {
        self.planes.iter().all(|plane| {
            let n = plane.truncate();
            let p_vertex = Vec3::select(n.cmpge(Vec3::ZERO), bbox.max, bbox.min);
            n.dot(p_vertex) + plane.w >= 0.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> PlaneFrustum {
        // Looking down -Z from the origin.
        PlaneFrustum::look_at(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::Y,
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn test_point_in_front_is_inside() {
        let f = camera();
        assert!(f.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, -200.0)));
    }

    #[test]
    fn test_box_in_view_intersects() {
        let f = camera();
        let b = BBox::new(Vec3::new(-1.0, -1.0, -12.0), Vec3::new(1.0, 1.0, -8.0));
        assert!(f.intersects(&b));
    }

    #[test]
    fn test_box_behind_camera_is_culled() {
        let f = camera();
        let b = BBox::new(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 8.0));
        assert!(!f.intersects(&b));
    }

    /// A box straddling a side plane counts as visible.
    #[test]
    fn test_straddling_box_intersects() {
        let f = camera();
        let b = BBox::new(Vec3::new(5.0, -1.0, -6.0), Vec3::new(50.0, 1.0, -4.0));
        assert!(f.intersects(&b));
    }

    #[test]
    fn test_box_far_to_the_side_is_culled() {
        let f = camera();
        let b = BBox::new(Vec3::new(40.0, -1.0, -6.0), Vec3::new(50.0, 1.0, -4.0));
        assert!(!f.intersects(&b));
    }

    /// A box mirrored in front of the camera by a negative z scale is seen.
    #[test]
    fn test_mirrored_box_intersects() {
        let f = camera();
        let b = BBox::new(Vec3::new(-1.0, -1.0, 8.0), Vec3::new(1.0, 1.0, 12.0));
        assert!(!f.intersects(&b));
        assert!(f.intersects(&b.scale_z(-1.0)));
    }

    #[test]
    fn test_closures_are_frustums() {
        let everything = |_: &BBox| true;
        assert!(everything.intersects(&BBox::new(Vec3::ZERO, Vec3::ONE)));
    }
}
