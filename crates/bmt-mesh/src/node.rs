//! DAG vertices: one incremental modification of the surface.

use crate::bbox::BBox;
use crate::format::{RecordReader, optional_id, required_id};

/// A node of the multiresolution DAG.
///
/// Node 0 is the root. A node without outgoing arcs is a drain: the finest
/// resolution reachable along that path.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshNode {
    pub id: u32,
    /// Inclusive outgoing arc range, `None` for drains.
    pub outgoing: Option<(u32, u32)>,
    /// Head of the list of arcs entering this node, linked through
    /// [`crate::MeshArc::next_arc_with_same_destination`].
    pub lowest_incoming_arc: Option<u32>,
    pub bbox: BBox,
}

impl MeshNode {
    pub(crate) fn decode(id: u32, r: &mut RecordReader<'_>) -> Self {
        let lowest_outgoing = optional_id(r.i32(), "lowest outgoing arc", id);
        let highest_outgoing = r.i32();
        let lowest_incoming_arc = optional_id(r.i32(), "lowest incoming arc", id);
        let bbox = BBox::from_components(r.bbox_components());

        let outgoing =
            lowest_outgoing.map(|lo| (lo, required_id(highest_outgoing, "highest outgoing arc", id)));

        Self {
            id,
            outgoing,
            lowest_incoming_arc,
            bbox,
        }
    }

    /// True when nothing can be refined past this node.
    pub fn is_drain(&self) -> bool {
        self.outgoing.is_none()
    }

    pub fn is_root(&self) -> bool {
        self.id == 0
    }

    /// Ids of the arcs leaving this node, in ascending order.
    pub fn outgoing_arcs(&self) -> std::ops::RangeInclusive<u32> {
        match self.outgoing {
            Some((lo, hi)) => lo..=hi,
            #[allow(clippy::reversed_empty_ranges)]
            None => 1..=0,
        }
    }
}
