//! The multiresolution mesh: decoded DAG tables plus the fragment store.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::arc::MeshArc;
use crate::bbox::BBox;
use crate::criterion::LodCriterion;
use crate::error::{FragmentError, MeshError};
use crate::format::{IndexHeader, decode_index};
use crate::fragment::MeshFragment;
use crate::frustum::ViewFrustum;
use crate::node::MeshNode;
use crate::refinement::SelectiveRefinement;
use crate::spatial::SpatialSelection;
use crate::store::{FragmentHandle, FragmentStore, StoreOptions};

/// Counts and extents describing a loaded mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshSummary {
    pub flags: i32,
    pub nodes: u32,
    pub arcs: u32,
    pub fragments: u32,
    pub drains: u32,
    /// Largest arc error in the DAG (0 for an index without arcs).
    pub max_geometric_error: f32,
    pub domain: BBox,
}

/// A Batched Multi-Triangulation: an immutable DAG of mesh modifications
/// from which level-of-detail cuts are extracted.
///
/// The node, arc and fragment tables are decoded once at construction and
/// never change. Fragment triangle data is read lazily through the
/// [`FragmentStore`]. The mesh is `Sync`; concurrent extractions share only
/// the immutable tables and the store.
pub struct MultiresolutionMesh {
    header: IndexHeader,
    nodes: Vec<MeshNode>,
    arcs: Vec<MeshArc>,
    fragments: Vec<MeshFragment>,
    arc_bboxes: Vec<OnceLock<BBox>>,
    domain: BBox,
    store: Arc<FragmentStore>,
}

impl MultiresolutionMesh {
    /// Read the index blob from `index_path` and attach a lazily opened
    /// fragment blob at `fragment_path`.
    ///
    /// Only the index is read here; a missing fragment blob is reported on
    /// the first geometry fetch.
    pub fn open(
        index_path: &Path,
        fragment_path: &Path,
        options: StoreOptions,
    ) -> Result<Self, MeshError> {
        let index = std::fs::read(index_path).map_err(MeshError::Io)?;
        let store = FragmentStore::open_file(fragment_path, options);
        let mesh = Self::from_parts(&index, store)?;
        tracing::info!(
            index = %index_path.display(),
            fragments = %fragment_path.display(),
            "opened multiresolution mesh"
        );
        Ok(mesh)
    }

    /// Decode an in-memory index blob. The byte order is taken from the
    /// store's options.
    pub fn from_parts(index: &[u8], store: FragmentStore) -> Result<Self, MeshError> {
        let decoded = decode_index(index, store.options().byte_order)?;
        let domain = decoded.fragments[0].bbox;
        let arc_bboxes = (0..decoded.arcs.len()).map(|_| OnceLock::new()).collect();

        tracing::info!(
            nodes = decoded.header.node_count,
            arcs = decoded.header.arc_count,
            fragments = decoded.header.fragment_count,
            domain_min = ?domain.min,
            domain_max = ?domain.max,
            "decoded mesh index"
        );

        Ok(Self {
            header: decoded.header,
            nodes: decoded.nodes,
            arcs: decoded.arcs,
            fragments: decoded.fragments,
            arc_bboxes,
            domain,
            store: Arc::new(store),
        })
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn nodes(&self) -> &[MeshNode] {
        &self.nodes
    }

    pub fn arcs(&self) -> &[MeshArc] {
        &self.arcs
    }

    pub fn fragments(&self) -> &[MeshFragment] {
        &self.fragments
    }

    pub fn node(&self, id: u32) -> &MeshNode {
        &self.nodes[id as usize]
    }

    pub fn arc(&self, id: u32) -> &MeshArc {
        &self.arcs[id as usize]
    }

    pub fn fragment(&self, id: u32) -> Option<&MeshFragment> {
        self.fragments.get(id as usize)
    }

    pub fn root(&self) -> &MeshNode {
        &self.nodes[0]
    }

    /// Arcs entering `node`, following the incoming linked list.
    pub fn incoming_arcs(&self, node: u32) -> IncomingArcs<'_> {
        IncomingArcs {
            mesh: self,
            next: self.node(node).lowest_incoming_arc,
            steps: 0,
        }
    }

    /// Arcs leaving `node`.
    pub fn outgoing_arcs(&self, node: u32) -> impl Iterator<Item = &MeshArc> + '_ {
        self.node(node).outgoing_arcs().map(move |id| self.arc(id))
    }

    pub(crate) fn arc_bbox_slot(&self, arc: u32) -> &OnceLock<BBox> {
        &self.arc_bboxes[arc as usize]
    }

    /// Bounding box of the whole render domain (fragment 0's box).
    pub fn bbox(&self) -> BBox {
        self.domain
    }

    pub fn store(&self) -> &Arc<FragmentStore> {
        &self.store
    }

    /// Borrow the triangle data of a fragment, reading it on first access.
    pub fn fetch_geometry(&self, fragment_id: u32) -> Result<FragmentHandle, FragmentError> {
        let fragment = self
            .fragment(fragment_id)
            .ok_or(FragmentError::UnknownFragment(fragment_id))?;
        self.store.fetch(fragment)
    }

    /// Coarsest consistent mesh satisfying `criterion` over the whole domain.
    pub fn extract_lod<C>(&self, criterion: &C) -> Vec<&MeshFragment>
    where
        C: LodCriterion + ?Sized,
    {
        SelectiveRefinement::new(self).run(criterion).fragments(self)
    }

    /// Like [`extract_lod`](Self::extract_lod), but regions outside `frustum`
    /// are never voluntarily refined, and regions last seen outside it are
    /// left out of the result. `refine_ratio` scales the z axis of arc boxes
    /// before the visibility test.
    pub fn extract_lod_fragment<C, F>(
        &self,
        criterion: &C,
        frustum: &F,
        refine_ratio: f32,
    ) -> Vec<&MeshFragment>
    where
        C: LodCriterion + ?Sized,
        F: ViewFrustum + ?Sized,
    {
        SpatialSelection::new(self, frustum, refine_ratio)
            .run(criterion)
            .visible_fragments(self)
    }

    pub fn summary(&self) -> MeshSummary {
        MeshSummary {
            flags: self.header.flags,
            nodes: self.header.node_count,
            arcs: self.header.arc_count,
            fragments: self.header.fragment_count,
            drains: self.nodes.iter().filter(|n| n.is_drain()).count() as u32,
            max_geometric_error: self
                .arcs
                .iter()
                .map(|a| a.geometric_error)
                .fold(0.0, f32::max),
            domain: self.domain,
        }
    }
}

impl std::fmt::Debug for MultiresolutionMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiresolutionMesh")
            .field("header", &self.header)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Iterator over a node's incoming arcs.
pub struct IncomingArcs<'m> {
    mesh: &'m MultiresolutionMesh,
    next: Option<u32>,
    steps: usize,
}

impl<'m> Iterator for IncomingArcs<'m> {
    type Item = &'m MeshArc;

    fn next(&mut self) -> Option<&'m MeshArc> {
        let arc = self.mesh.arc(self.next?);
        self.steps += 1;
        assert!(
            self.steps <= self.mesh.arcs.len(),
            "incoming arc list through arc {} loops",
            arc.id
        );
        self.next = arc.next_arc_with_same_destination;
        Some(arc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::{AlwaysRefine, MaxGeometricError, NeverRefine};
    use crate::writer::{ArcSpec, FragmentSpec, MeshIndexWriter, NodeSpec};
    use crate::ByteOrder;
    use glam::Vec3;

    fn domain() -> BBox {
        BBox::new(Vec3::ZERO, Vec3::new(100.0, 100.0, 10.0))
    }

    /// Root -> node 1 (arc 0, fragment 0) -> two drains (arcs 1, 2).
    fn small_mesh() -> MultiresolutionMesh {
        let mut w = MeshIndexWriter::new();
        for _ in 0..4 {
            w.push_node(NodeSpec::new(domain()));
        }
        w.push_arc(ArcSpec::new(0, 1, 0, 0, 8.0));
        w.push_arc(ArcSpec::new(1, 2, 1, 1, 2.0));
        w.push_arc(ArcSpec::new(1, 3, 2, 2, 1.0));
        w.push_fragment(FragmentSpec::new(domain(), 8.0));
        w.push_fragment(FragmentSpec::new(
            BBox::new(Vec3::ZERO, Vec3::new(50.0, 100.0, 10.0)),
            2.0,
        ));
        w.push_fragment(FragmentSpec::new(
            BBox::new(Vec3::new(50.0, 0.0, 0.0), Vec3::new(100.0, 100.0, 10.0)),
            1.0,
        ));
        let index = w.to_bytes(ByteOrder::Little);
        MultiresolutionMesh::from_parts(
            &index,
            FragmentStore::from_bytes(Vec::<u8>::new(), StoreOptions::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_domain_bbox_is_fragment_zero() {
        let mesh = small_mesh();
        assert_eq!(mesh.bbox(), domain());
    }

    #[test]
    fn test_incoming_arcs_follow_linked_list() {
        let mesh = small_mesh();
        let incoming: Vec<u32> = mesh.incoming_arcs(2).map(|a| a.id).collect();
        assert_eq!(incoming, vec![1]);
        assert_eq!(mesh.incoming_arcs(0).count(), 0);
        let outgoing: Vec<u32> = mesh.outgoing_arcs(1).map(|a| a.id).collect();
        assert_eq!(outgoing, vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "incoming arc list through arc 1 loops")]
    fn test_looping_incoming_list_panics() {
        let mut mesh = small_mesh();
        mesh.arcs[1].next_arc_with_same_destination = Some(1);
        let _ = mesh.incoming_arcs(2).count();
    }

    #[test]
    fn test_summary_counts() {
        let summary = small_mesh().summary();
        assert_eq!(summary.nodes, 4);
        assert_eq!(summary.arcs, 3);
        assert_eq!(summary.fragments, 3);
        assert_eq!(summary.drains, 2);
        assert_eq!(summary.max_geometric_error, 8.0);
    }

    #[test]
    fn test_extract_lod_facade() {
        let mesh = small_mesh();
        let ids = |v: Vec<&MeshFragment>| v.iter().map(|f| f.id).collect::<Vec<_>>();
        assert_eq!(ids(mesh.extract_lod(&NeverRefine)), vec![0]);
        assert_eq!(ids(mesh.extract_lod(&AlwaysRefine)), vec![1, 2]);
        assert_eq!(ids(mesh.extract_lod(&MaxGeometricError::new(4.0))), vec![1, 2]);
        assert_eq!(ids(mesh.extract_lod(&MaxGeometricError::new(10.0))), vec![0]);
    }

    #[test]
    fn test_arc_bbox_is_cached_union() {
        let mesh = small_mesh();
        let arc = mesh.arc(0);
        assert_eq!(arc.bbox(&mesh), domain());
        assert!(mesh.arc_bbox_slot(0).get().is_some());
        assert!(mesh.arc_bbox_slot(1).get().is_none());
    }

    #[test]
    fn test_fetch_unknown_fragment() {
        let mesh = small_mesh();
        let err = mesh.fetch_geometry(99).unwrap_err();
        assert!(matches!(err, FragmentError::UnknownFragment(99)));
    }

    #[test]
    fn test_open_missing_index_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MultiresolutionMesh::open(
            &dir.path().join("index.bin"),
            &dir.path().join("fragments.bin"),
            StoreOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::Io(_)));
    }

    #[test]
    fn test_malformed_index_aborts_construction() {
        let err = MultiresolutionMesh::from_parts(
            &[1, 2, 3],
            FragmentStore::from_bytes(Vec::<u8>::new(), StoreOptions::default()),
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::Format(_)));
    }

    /// The fragment blob is not touched until geometry is requested.
    #[test]
    fn test_open_with_missing_fragment_blob_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = MeshIndexWriter::new();
        w.push_node(NodeSpec::new(domain()));
        w.push_fragment(FragmentSpec::new(domain(), 0.0).with_data(0, 8));
        let index_path = dir.path().join("index.bin");
        std::fs::write(&index_path, w.to_bytes(ByteOrder::Little)).unwrap();

        let mesh = MultiresolutionMesh::open(
            &index_path,
            &dir.path().join("missing.bin"),
            StoreOptions::default(),
        )
        .unwrap();
        assert_eq!(mesh.bbox(), domain());
        assert!(matches!(
            mesh.fetch_geometry(0),
            Err(FragmentError::Io { fragment: 0, .. })
        ));
    }
}
