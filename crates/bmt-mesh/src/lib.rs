//! Batched Multi-Triangulation: a multiresolution triangle mesh stored as a
//! DAG of incremental modifications, with level-of-detail extraction.
//!
//! A mesh is two binary blobs. The index blob holds the node, arc and
//! fragment-info tables and is decoded once into a [`MultiresolutionMesh`].
//! The fragment blob holds the triangle batches and is read lazily through a
//! pooled [`FragmentStore`].
//!
//! Extraction walks the DAG top-down and returns the coarsest consistent cut
//! satisfying a caller-supplied [`LodCriterion`]:
//!
//! - [`SelectiveRefinement`] refines over the whole domain.
//! - [`SpatialSelection`] additionally refuses to refine regions outside a
//!   [`ViewFrustum`].

mod arc;
mod bbox;
mod criterion;
mod error;
mod format;
mod fragment;
mod frustum;
mod mesh;
mod node;
mod pool;
mod prefetch;
mod refinement;
mod spatial;
mod store;
pub mod writer;


pub use arc::MeshArc;
pub use bbox::BBox;
pub use criterion::{AlwaysRefine, LodCriterion, MaxGeometricError, NeverRefine, ScreenSpaceError};
pub use error::{FormatError, FragmentError, MeshError};
pub use format::{
    ARC_RECORD_SIZE, ByteOrder, DecodedIndex, FRAGMENT_RECORD_SIZE, HEADER_SIZE, IndexHeader,
    NODE_RECORD_SIZE, decode_index,
};
pub use fragment::{FragmentGeometry, FragmentVertex, MeshFragment};
pub use frustum::{PlaneFrustum, ViewFrustum};
pub use mesh::{IncomingArcs, MeshSummary, MultiresolutionMesh};
pub use node::MeshNode;
pub use pool::{BufferPool, PoolStats, PooledBuffer};
pub use prefetch::{FragmentPrefetcher, PrefetchResult};
pub use refinement::{Cut, ExtractionStats, SelectiveRefinement, TraversalOrder};
pub use spatial::{SpatialCut, SpatialSelection};
pub use store::{
    FileSource, FragmentHandle, FragmentSource, FragmentStore, MemorySource, StoreOptions,
    StoreStats,
};
