//! Encoders for the index and fragment blobs.
//!
//! The DAG itself is built offline; these writers exist for tooling and
//! tests that need well-formed blobs.

use crate::bbox::BBox;
use crate::format::{ByteOrder, NONE};

/// A node to be written. Arc ranges and incoming lists are derived from the
/// arcs at encode time.
#[derive(Clone, Copy, Debug)]
pub struct NodeSpec {
    pub bbox: BBox,
}

impl NodeSpec {
    pub fn new(bbox: BBox) -> Self {
        Self { bbox }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ArcSpec {
    pub source: u32,
    pub destination: u32,
    pub lowest_patch: u32,
    pub highest_patch: u32,
    pub geometric_error: f32,
}

impl ArcSpec {
    pub fn new(
        source: u32,
        destination: u32,
        lowest_patch: u32,
        highest_patch: u32,
        geometric_error: f32,
    ) -> Self {
        Self {
            source,
            destination,
            lowest_patch,
            highest_patch,
            geometric_error,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FragmentSpec {
    pub bbox: BBox,
    pub geometric_error: f32,
    pub data_offset: u64,
    pub data_length: u32,
}

impl FragmentSpec {
    pub fn new(bbox: BBox, geometric_error: f32) -> Self {
        Self {
            bbox,
            geometric_error,
            data_offset: 0,
            data_length: 0,
        }
    }

    /// Point this fragment at a batch in the fragment blob.
    pub fn with_data(mut self, data_offset: u64, data_length: u32) -> Self {
        self.data_offset = data_offset;
        self.data_length = data_length;
        self
    }
}

/// Builds an index blob.
#[derive(Clone, Debug, Default)]
pub struct MeshIndexWriter {
    flags: i32,
    nodes: Vec<NodeSpec>,
    arcs: Vec<ArcSpec>,
    fragments: Vec<FragmentSpec>,
}

impl MeshIndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flags(&mut self, flags: i32) {
        self.flags = flags;
    }

    /// Append a node and return its id.
    pub fn push_node(&mut self, node: NodeSpec) -> u32 {
        self.nodes.push(node);
        self.nodes.len() as u32 - 1
    }

    /// Append an arc and return its id. Arcs leaving the same node must be
    /// pushed consecutively.
    pub fn push_arc(&mut self, arc: ArcSpec) -> u32 {
        self.arcs.push(arc);
        self.arcs.len() as u32 - 1
    }

    /// Append a fragment-info record and return its id.
    pub fn push_fragment(&mut self, fragment: FragmentSpec) -> u32 {
        self.fragments.push(fragment);
        self.fragments.len() as u32 - 1
    }

    /// Encode the blob.
    ///
    /// # Panics
    ///
    /// Panics if the arcs leaving some node do not have consecutive ids.
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let node_count = self.nodes.len();
        let mut outgoing: Vec<Option<(u32, u32)>> = vec![None; node_count];
        let mut incoming_head: Vec<Option<u32>> = vec![None; node_count];
        let mut next_incoming: Vec<Option<u32>> = vec![None; self.arcs.len()];
        let mut incoming_tail: Vec<Option<u32>> = vec![None; node_count];

        for (id, arc) in self.arcs.iter().enumerate() {
            let id = id as u32;
            let range = &mut outgoing[arc.source as usize];
            *range = match *range {
                None => Some((id, id)),
                Some((lo, hi)) => {
                    assert_eq!(
                        hi + 1,
                        id,
                        "arcs leaving node {} are not contiguous",
                        arc.source
                    );
                    Some((lo, id))
                }
            };

            let dest = arc.destination as usize;
            match incoming_tail[dest] {
                None => incoming_head[dest] = Some(id),
                Some(tail) => next_incoming[tail as usize] = Some(id),
            }
            incoming_tail[dest] = Some(id);
        }

        let mut out = Vec::with_capacity(
            crate::format::HEADER_SIZE
                + node_count * crate::format::NODE_RECORD_SIZE
                + self.arcs.len() * crate::format::ARC_RECORD_SIZE
                + self.fragments.len() * crate::format::FRAGMENT_RECORD_SIZE,
        );
        let put_i32 = |out: &mut Vec<u8>, v: i32| out.extend_from_slice(&order.i32_bytes(v));
        let id_or_none = |v: Option<u32>| v.map_or(NONE, |v| v as i32);

        put_i32(&mut out, self.flags);
        put_i32(&mut out, node_count as i32);
        put_i32(&mut out, self.arcs.len() as i32);
        put_i32(&mut out, self.fragments.len() as i32);

        for (id, node) in self.nodes.iter().enumerate() {
            put_i32(&mut out, id_or_none(outgoing[id].map(|(lo, _)| lo)));
            put_i32(&mut out, id_or_none(outgoing[id].map(|(_, hi)| hi)));
            put_i32(&mut out, id_or_none(incoming_head[id]));
            put_bbox(&mut out, &node.bbox, order);
        }

        for (id, arc) in self.arcs.iter().enumerate() {
            put_i32(&mut out, arc.source as i32);
            put_i32(&mut out, arc.destination as i32);
            put_i32(&mut out, arc.lowest_patch as i32);
            put_i32(&mut out, arc.highest_patch as i32);
            put_i32(&mut out, id_or_none(next_incoming[id]));
            out.extend_from_slice(&order.f32_bytes(arc.geometric_error));
        }

        for (id, fragment) in self.fragments.iter().enumerate() {
            put_i32(&mut out, id as i32);
            put_bbox(&mut out, &fragment.bbox, order);
            out.extend_from_slice(&order.f32_bytes(fragment.geometric_error));
            out.extend_from_slice(&order.i64_bytes(fragment.data_offset as i64));
            put_i32(&mut out, fragment.data_length as i32);
        }

        out
    }
}

fn put_bbox(out: &mut Vec<u8>, bbox: &BBox, order: ByteOrder) {
    for v in bbox.min.to_array().into_iter().chain(bbox.max.to_array()) {
        out.extend_from_slice(&order.f32_bytes(v));
    }
}

/// Triangle data for one fragment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleBatch {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// Three vertex indices per triangle.
    pub indices: Vec<u32>,
}

/// Appends triangle batches to a fragment blob.
#[derive(Clone, Debug)]
pub struct FragmentBlobWriter {
    order: ByteOrder,
    data: Vec<u8>,
}

impl FragmentBlobWriter {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            data: Vec::new(),
        }
    }

    /// Append `batch` and return its `(offset, length)` for the fragment record.
    ///
    /// # Panics
    ///
    /// Panics if positions and normals differ in length or the index count is
    /// not a multiple of three.
    pub fn push(&mut self, batch: &TriangleBatch) -> (u64, u32) {
        assert_eq!(
            batch.positions.len(),
            batch.normals.len(),
            "every vertex needs a normal"
        );
        assert_eq!(batch.indices.len() % 3, 0, "indices must form triangles");

        let order = self.order;
        let offset = self.data.len();
        let out = &mut self.data;
        out.extend_from_slice(&order.i32_bytes(batch.positions.len() as i32));
        out.extend_from_slice(&order.i32_bytes((batch.indices.len() / 3) as i32));
        for (p, n) in batch.positions.iter().zip(&batch.normals) {
            for v in p.iter().chain(n) {
                out.extend_from_slice(&order.f32_bytes(*v));
            }
        }
        for &i in &batch.indices {
            out.extend_from_slice(&order.i32_bytes(i as i32));
        }
        (offset as u64, (self.data.len() - offset) as u32)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
