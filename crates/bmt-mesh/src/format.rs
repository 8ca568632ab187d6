//! Binary layout of the mesh index blob.
//!
//! ## Binary Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | `flags` (`i32`) |
//! | 4 | 4 | node count `N` (`i32`) |
//! | 8 | 4 | arc count `A` (`i32`) |
//! | 12 | 4 | fragment count `F` (`i32`) |
//! | 16 | N×36 | node records |
//! | 16+N×36 | A×24 | arc records |
//! | 16+N×36+A×24 | F×44 | fragment-info records |
//!
//! Segments follow each other without padding. The byte order is chosen per
//! deployment and applies to every field of both blobs.

use crate::arc::MeshArc;
use crate::error::FormatError;
use crate::fragment::MeshFragment;
use crate::node::MeshNode;

/// Size of the fixed index header.
pub const HEADER_SIZE: usize = 16;
/// Size of one node record.
pub const NODE_RECORD_SIZE: usize = 36;
/// Size of one arc record.
pub const ARC_RECORD_SIZE: usize = 24;
/// Size of one fragment-info record.
pub const FRAGMENT_RECORD_SIZE: usize = 44;

/// Sentinel used on disk for "no arc" / "no node".
pub(crate) const NONE: i32 = -1;

/// Byte order of the index and fragment blobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    pub(crate) fn i32_from(self, b: [u8; 4]) -> i32 {
        match self {
            ByteOrder::Little => i32::from_le_bytes(b),
            ByteOrder::Big => i32::from_be_bytes(b),
        }
    }

    pub(crate) fn i64_from(self, b: [u8; 8]) -> i64 {
        match self {
            ByteOrder::Little => i64::from_le_bytes(b),
            ByteOrder::Big => i64::from_be_bytes(b),
        }
    }

    pub(crate) fn f32_from(self, b: [u8; 4]) -> f32 {
        match self {
            ByteOrder::Little => f32::from_le_bytes(b),
            ByteOrder::Big => f32::from_be_bytes(b),
        }
    }

    pub(crate) fn i32_bytes(self, v: i32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub(crate) fn i64_bytes(self, v: i64) -> [u8; 8] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub(crate) fn f32_bytes(self, v: f32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// Sequential reader over a fixed-size record region.
///
/// Callers slice the region to the exact record size before reading, so the
/// accessors index without bounds errors.
pub(crate) struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(data: &'a [u8], order: ByteOrder) -> Self {
        Self {
            data,
            pos: 0,
            order,
        }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub(crate) fn i32(&mut self) -> i32 {
        let b = self.take::<4>();
        self.order.i32_from(b)
    }

    pub(crate) fn i64(&mut self) -> i64 {
        let b = self.take::<8>();
        self.order.i64_from(b)
    }

    pub(crate) fn f32(&mut self) -> f32 {
        let b = self.take::<4>();
        self.order.f32_from(b)
    }

    pub(crate) fn bbox_components(&mut self) -> [f32; 6] {
        [
            self.f32(),
            self.f32(),
            self.f32(),
            self.f32(),
            self.f32(),
            self.f32(),
        ]
    }
}

/// The decoded 16-byte header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexHeader {
    /// Deployment-specific flags, carried through verbatim.
    pub flags: i32,
    pub node_count: u32,
    pub arc_count: u32,
    pub fragment_count: u32,
}

impl IndexHeader {
    /// Decode the header and check that `data` holds exactly the records it
    /// declares.
    pub fn decode(data: &[u8], order: ByteOrder) -> Result<Self, FormatError> {
        if data.len() < HEADER_SIZE {
            return Err(FormatError::TruncatedHeader {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }
        let mut r = RecordReader::new(&data[..HEADER_SIZE], order);
        let flags = r.i32();
        let node_count = non_negative("node", r.i32())?;
        let arc_count = non_negative("arc", r.i32())?;
        let fragment_count = non_negative("fragment", r.i32())?;

        let header = Self {
            flags,
            node_count,
            arc_count,
            fragment_count,
        };
        let expected = header.blob_len();
        if expected != data.len() as u64 {
            return Err(FormatError::SizeMismatch {
                expected,
                actual: data.len() as u64,
            });
        }
        if node_count == 0 {
            return Err(FormatError::MissingRoot);
        }
        if fragment_count == 0 {
            return Err(FormatError::MissingDomain);
        }
        Ok(header)
    }

    /// Total blob length implied by the counts. Counts are at most
    /// `i32::MAX`, so the sum cannot overflow a `u64`.
    pub fn blob_len(&self) -> u64 {
        HEADER_SIZE as u64
            + self.node_count as u64 * NODE_RECORD_SIZE as u64
            + self.arc_count as u64 * ARC_RECORD_SIZE as u64
            + self.fragment_count as u64 * FRAGMENT_RECORD_SIZE as u64
    }

    fn arcs_offset(&self) -> usize {
        HEADER_SIZE + self.node_count as usize * NODE_RECORD_SIZE
    }

    fn fragments_offset(&self) -> usize {
        self.arcs_offset() + self.arc_count as usize * ARC_RECORD_SIZE
    }
}

fn non_negative(table: &'static str, count: i32) -> Result<u32, FormatError> {
    u32::try_from(count).map_err(|_| FormatError::NegativeCount { table, count })
}

/// The three record tables decoded from one index blob.
#[derive(Debug)]
pub struct DecodedIndex {
    pub header: IndexHeader,
    pub nodes: Vec<MeshNode>,
    pub arcs: Vec<MeshArc>,
    pub fragments: Vec<MeshFragment>,
}

/// Decode a complete index blob.
///
/// Size problems are reported as [`FormatError`]. Dangling node, arc or patch
/// references mean the DAG itself is corrupt and abort with a panic.
pub fn decode_index(data: &[u8], order: ByteOrder) -> Result<DecodedIndex, FormatError> {
    let header = IndexHeader::decode(data, order)?;

    let nodes = data[HEADER_SIZE..header.arcs_offset()]
        .chunks_exact(NODE_RECORD_SIZE)
        .enumerate()
        .map(|(id, rec)| MeshNode::decode(id as u32, &mut RecordReader::new(rec, order)))
        .collect::<Vec<_>>();

    let arcs = data[header.arcs_offset()..header.fragments_offset()]
        .chunks_exact(ARC_RECORD_SIZE)
        .enumerate()
        .map(|(id, rec)| MeshArc::decode(id as u32, &mut RecordReader::new(rec, order)))
        .collect::<Vec<_>>();

    let fragments = data[header.fragments_offset()..]
        .chunks_exact(FRAGMENT_RECORD_SIZE)
        .enumerate()
        .map(|(id, rec)| MeshFragment::decode(id as u32, &mut RecordReader::new(rec, order)))
        .collect::<Vec<_>>();

    validate_references(&nodes, &arcs, fragments.len());

    Ok(DecodedIndex {
        header,
        nodes,
        arcs,
        fragments,
    })
}

/// Assert that every id stored in a record points into its table.
fn validate_references(nodes: &[MeshNode], arcs: &[MeshArc], fragment_count: usize) {
    let node_count = nodes.len() as u32;
    let arc_count = arcs.len() as u32;
    let fragment_count = fragment_count as u32;

    for node in nodes {
        if let Some((lo, hi)) = node.outgoing {
            assert!(
                lo <= hi && hi < arc_count,
                "node {} has outgoing arc range [{lo}, {hi}] outside 0..{arc_count}",
                node.id
            );
        }
        if let Some(first) = node.lowest_incoming_arc {
            assert!(
                first < arc_count,
                "node {} has incoming arc {first} outside 0..{arc_count}",
                node.id
            );
        }
    }

    for arc in arcs {
        assert!(
            arc.source_node < node_count && arc.destination_node < node_count,
            "arc {} connects {} -> {} outside 0..{node_count}",
            arc.id,
            arc.source_node,
            arc.destination_node
        );
        assert!(
            arc.lowest_patch <= arc.highest_patch && arc.highest_patch < fragment_count,
            "arc {} has patch range [{}, {}] outside 0..{fragment_count}",
            arc.id,
            arc.lowest_patch,
            arc.highest_patch
        );
        if let Some(next) = arc.next_arc_with_same_destination {
            assert!(
                next < arc_count,
                "arc {} links to arc {next} outside 0..{arc_count}",
                arc.id
            );
        }
    }
}

/// Convert an on-disk reference that may be `-1` into an optional id.
///
/// # Panics
///
/// Panics on any other negative value.
pub(crate) fn optional_id(raw: i32, what: &str, owner: u32) -> Option<u32> {
    if raw == NONE {
        return None;
    }
    Some(required_id(raw, what, owner))
}

/// Convert an on-disk reference that must be present into an id.
///
/// # Panics
///
/// Panics if the value is negative.
pub(crate) fn required_id(raw: i32, what: &str, owner: u32) -> u32 {
    assert!(raw >= 0, "record {owner}: negative {what} reference {raw}");
    raw as u32
}
