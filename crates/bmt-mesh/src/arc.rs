//! DAG edges: applying an arc exposes finer detail.

use crate::bbox::BBox;
use crate::format::{RecordReader, optional_id, required_id};
use crate::fragment::MeshFragment;
use crate::frustum::ViewFrustum;
use crate::mesh::MultiresolutionMesh;

/// A directed edge of the multiresolution DAG.
///
/// The arc owns the contiguous fragment range `[lowest_patch, highest_patch]`
/// introduced by its modification. Resolution operations take the owning
/// mesh explicitly; arcs store ids only.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshArc {
    pub id: u32,
    pub source_node: u32,
    pub destination_node: u32,
    pub lowest_patch: u32,
    pub highest_patch: u32,
    /// Next arc in the destination node's incoming list.
    pub next_arc_with_same_destination: Option<u32>,
    /// Worst-case approximation error over the fragment range.
    pub geometric_error: f32,
}

impl MeshArc {
    pub(crate) fn decode(id: u32, r: &mut RecordReader<'_>) -> Self {
        let source_node = required_id(r.i32(), "source node", id);
        let destination_node = required_id(r.i32(), "destination node", id);
        let lowest_patch = required_id(r.i32(), "lowest patch", id);
        let highest_patch = required_id(r.i32(), "highest patch", id);
        let next_arc_with_same_destination = optional_id(r.i32(), "next arc", id);
        let geometric_error = r.f32();
        Self {
            id,
            source_node,
            destination_node,
            lowest_patch,
            highest_patch,
            next_arc_with_same_destination,
            geometric_error,
        }
    }

    /// Fragment ids owned by this arc.
    pub fn patch_range(&self) -> std::ops::RangeInclusive<u32> {
        self.lowest_patch..=self.highest_patch
    }

    /// The fragments introduced by this arc, borrowed from the mesh.
    pub fn fragments<'m>(&self, mesh: &'m MultiresolutionMesh) -> &'m [MeshFragment] {
        &mesh.fragments()[self.lowest_patch as usize..=self.highest_patch as usize]
    }

    /// Union of the bounding boxes of this arc's fragments.
    ///
    /// Computed on first use and cached in the mesh.
    pub fn bbox(&self, mesh: &MultiresolutionMesh) -> BBox {
        *mesh.arc_bbox_slot(self.id).get_or_init(|| {
            let fragments = self.fragments(mesh);
            let mut bbox = fragments[0].bbox;
            for fragment in &fragments[1..] {
                bbox.enlarge(&fragment.bbox);
            }
            bbox
        })
    }

    /// Test this arc's box against a view frustum after scaling only its
    /// z components by `z_scale`.
    pub fn interferes<F>(&self, mesh: &MultiresolutionMesh, frustum: &F, z_scale: f32) -> bool
    where
        F: ViewFrustum + ?Sized,
    {
        frustum.intersects(&self.bbox(mesh).scale_z(z_scale))
    }
}
