//! Mesh fragments: batches of triangle geometry at one DAG level.
//!
//! The fragment-info record (bounding box, error, blob location) is decoded
//! eagerly with the index. The triangles themselves live in the fragment blob
//! and are decoded on demand into a [`FragmentGeometry`].
//!
//! ## Triangle batch layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | vertex count `V` (`i32`) |
//! | 4 | 4 | triangle count `T` (`i32`) |
//! | 8 | V×24 | vertices: position `3×f32`, normal `3×f32` |
//! | 8+V×24 | T×12 | triangle indices `3×u32` |

use crate::bbox::BBox;
use crate::error::FragmentError;
use crate::format::{ByteOrder, RecordReader, required_id};
use crate::pool::PooledBuffer;

/// Size of the triangle batch header.
pub const BATCH_HEADER_SIZE: usize = 8;
/// Size of one interleaved vertex on disk.
pub const VERTEX_SIZE: usize = 24;
/// Size of one triangle's indices on disk.
pub const TRIANGLE_SIZE: usize = 12;

/// Fragment-info record.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshFragment {
    pub id: u32,
    pub bbox: BBox,
    pub geometric_error: f32,
    /// Byte offset of the triangle batch in the fragment blob.
    pub data_offset: u64,
    /// Byte length of the triangle batch.
    pub data_length: u32,
}

impl MeshFragment {
    pub(crate) fn decode(id: u32, r: &mut RecordReader<'_>) -> Self {
        let stored_id = r.i32();
        assert_eq!(
            stored_id, id as i32,
            "fragment record {id} carries id {stored_id}"
        );
        let bbox = BBox::from_components(r.bbox_components());
        let geometric_error = r.f32();
        let offset = r.i64();
        assert!(offset >= 0, "fragment {id}: negative data offset {offset}");
        let data_length = required_id(r.i32(), "data length", id);
        Self {
            id,
            bbox,
            geometric_error,
            data_offset: offset as u64,
            data_length,
        }
    }
}

/// One vertex, laid out for direct GPU upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FragmentVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

static_assertions::assert_eq_size!(FragmentVertex, [u8; VERTEX_SIZE]);

/// Decoded view over a fragment's raw triangle batch.
///
/// Holds the pooled buffer the batch was read into; the allocation goes back
/// to the pool when the geometry is dropped.
#[derive(Debug)]
pub struct FragmentGeometry {
    fragment: u32,
    vertex_count: u32,
    triangle_count: u32,
    order: ByteOrder,
    raw: PooledBuffer,
}

impl FragmentGeometry {
    /// Validate a raw batch and wrap it.
    pub(crate) fn parse(
        fragment: u32,
        raw: PooledBuffer,
        order: ByteOrder,
    ) -> Result<Self, FragmentError> {
        let malformed = |reason: String| FragmentError::Malformed { fragment, reason };

        if raw.len() < BATCH_HEADER_SIZE {
            return Err(malformed(format!(
                "batch of {} bytes is shorter than its header",
                raw.len()
            )));
        }
        let mut header = RecordReader::new(&raw[..BATCH_HEADER_SIZE], order);
        let vertex_count = header.i32();
        let triangle_count = header.i32();
        let (Ok(vertex_count), Ok(triangle_count)) =
            (u32::try_from(vertex_count), u32::try_from(triangle_count))
        else {
            return Err(malformed(format!(
                "negative counts ({vertex_count} vertices, {triangle_count} triangles)"
            )));
        };

        let expected = BATCH_HEADER_SIZE as u64
            + vertex_count as u64 * VERTEX_SIZE as u64
            + triangle_count as u64 * TRIANGLE_SIZE as u64;
        if expected != raw.len() as u64 {
            return Err(malformed(format!(
                "expected {expected} bytes for {vertex_count} vertices and {triangle_count} triangles, got {}",
                raw.len()
            )));
        }

        let geometry = Self {
            fragment,
            vertex_count,
            triangle_count,
            order,
            raw,
        };
        let out_of_range = geometry.index_iter().find(|&i| i >= vertex_count);
        if let Some(bad) = out_of_range {
            return Err(malformed(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }
        Ok(geometry)
    }

    pub fn fragment_id(&self) -> u32 {
        self.fragment
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }

    /// Size of the raw batch in bytes.
    pub fn byte_len(&self) -> usize {
        self.raw.len()
    }

    fn vertex_bytes(&self) -> &[u8] {
        let end = BATCH_HEADER_SIZE + self.vertex_count as usize * VERTEX_SIZE;
        &self.raw[BATCH_HEADER_SIZE..end]
    }

    fn index_bytes(&self) -> &[u8] {
        let start = BATCH_HEADER_SIZE + self.vertex_count as usize * VERTEX_SIZE;
        &self.raw[start..]
    }

    fn index_iter(&self) -> impl Iterator<Item = u32> + '_ {
        let order = self.order;
        self.index_bytes()
            .chunks_exact(4)
            .map(move |b| order.i32_from([b[0], b[1], b[2], b[3]]) as u32)
    }

    /// Decode the interleaved vertices.
    pub fn vertices(&self) -> Vec<FragmentVertex> {
        self.vertex_bytes()
            .chunks_exact(VERTEX_SIZE)
            .map(|rec| {
                let mut r = RecordReader::new(rec, self.order);
                FragmentVertex {
                    position: [r.f32(), r.f32(), r.f32()],
                    normal: [r.f32(), r.f32(), r.f32()],
                }
            })
            .collect()
    }

    /// Decode the triangle index list (three indices per triangle).
    pub fn indices(&self) -> Vec<u32> {
        self.index_iter().collect()
    }

    /// Vertex data as bytes in native order, ready for a vertex buffer.
    pub fn vertex_upload_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.vertices()).to_vec()
    }
}
