//! Refinement criteria: when does a region need finer detail?

use glam::Vec3;

use crate::arc::MeshArc;
use crate::mesh::MultiresolutionMesh;

/// Caller-supplied predicate deciding whether an arc's region should be
/// replaced by finer geometry.
///
/// Must be pure for extraction to be repeatable: the same arc must always
/// yield the same answer within one call.
pub trait LodCriterion {
    fn needs_refinement(&self, arc: &MeshArc, mesh: &MultiresolutionMesh) -> bool;
}

impl<F> LodCriterion for F
where
    F: Fn(&MeshArc, &MultiresolutionMesh) -> bool,
{
    fn needs_refinement(&self, arc: &MeshArc, mesh: &MultiresolutionMesh) -> bool {
        self(arc, mesh)
    }
}

/// Never refines: extraction returns the root's own fragments.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverRefine;

impl LodCriterion for NeverRefine {
    fn needs_refinement(&self, _: &MeshArc, _: &MultiresolutionMesh) -> bool {
        false
    }
}

/// Always refines: extraction returns the finest fragments.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysRefine;

impl LodCriterion for AlwaysRefine {
    fn needs_refinement(&self, _: &MeshArc, _: &MultiresolutionMesh) -> bool {
        true
    }
}

/// View-independent criterion: refine while the arc's geometric error is
/// above a fixed threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaxGeometricError {
    pub threshold: f32,
}

impl MaxGeometricError {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl LodCriterion for MaxGeometricError {
    fn needs_refinement(&self, arc: &MeshArc, _: &MultiresolutionMesh) -> bool {
        arc.geometric_error > self.threshold
    }
}

/// View-dependent criterion bounding the projected error in pixels.
///
/// The projected error of an arc is `geometric_error * pixels_per_unit / d`,
/// where `d` is the distance from the eye to the arc's (z-scaled) box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenSpaceError {
    pub eye: Vec3,
    /// `viewport_height / (2 * tan(fov_y / 2))`.
    pub pixels_per_unit: f32,
    pub max_pixel_error: f32,
    pub z_scale: f32,
}

impl ScreenSpaceError {
    /// Build from camera parameters.
    pub fn from_camera(
        eye: Vec3,
        fov_y_radians: f32,
        viewport_height: u32,
        max_pixel_error: f32,
        z_scale: f32,
    ) -> Self {
        let pixels_per_unit = viewport_height as f32 / (2.0 * (fov_y_radians * 0.5).tan());
        Self {
            eye,
            pixels_per_unit,
            max_pixel_error,
            z_scale,
        }
    }

    /// Projected error of `arc` in pixels. Infinite when the eye is inside the box.
    pub fn projected_error(&self, arc: &MeshArc, mesh: &MultiresolutionMesh) -> f32 {
        let distance = arc
            .bbox(mesh)
            .scale_z(self.z_scale)
            .distance_to_point(self.eye);
        if distance <= f32::EPSILON {
            return f32::INFINITY;
        }
        arc.geometric_error * self.pixels_per_unit / distance
    }
}

impl LodCriterion for ScreenSpaceError {
    fn needs_refinement(&self, arc: &MeshArc, mesh: &MultiresolutionMesh) -> bool {
        self.projected_error(arc, mesh) > self.max_pixel_error
    }
}
