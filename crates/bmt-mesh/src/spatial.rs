//! Frustum-gated selective refinement.
//!
//! Identical to [`SelectiveRefinement`](crate::SelectiveRefinement) except
//! that a region is only refined voluntarily when its (z-scaled) box
//! intersects the view frustum *and* the criterion asks for it. Regions out
//! of view keep whatever resolution the cut already holds for them.
//! Dependency closure is never gated: a node needed for consistency is
//! applied even when it is out of view.

use rustc_hash::FxHashMap;

use crate::criterion::LodCriterion;
use crate::fragment::MeshFragment;
use crate::frustum::ViewFrustum;
use crate::mesh::MultiresolutionMesh;
use crate::refinement::{Cut, CutBuilder, TraversalOrder, fragments_of};

/// Result of a spatial selection: the consistent cut plus the outcome of the
/// latest visibility test of each arc that was evaluated.
#[derive(Clone, Debug)]
pub struct SpatialCut {
    cut: Cut,
    visibility: FxHashMap<u32, bool>,
}

impl SpatialCut {
    /// The full cut, including regions left coarse because they are off-screen.
    pub fn cut(&self) -> &Cut {
        &self.cut
    }

    /// Latest visibility outcome for `arc`, `None` if it was never tested.
    pub fn visibility(&self, arc: u32) -> Option<bool> {
        self.visibility.get(&arc).copied()
    }

    /// Arcs of the cut not known to be invisible, ascending.
    pub fn visible_arcs(&self) -> Vec<u32> {
        self.cut
            .arcs()
            .into_iter()
            .filter(|&arc| self.visibility(arc) != Some(false))
            .collect()
    }

    /// Fragments of [`visible_arcs`](Self::visible_arcs).
    pub fn visible_fragments<'m>(&self, mesh: &'m MultiresolutionMesh) -> Vec<&'m MeshFragment> {
        fragments_of(mesh, self.visible_arcs())
    }

    /// Every fragment of the cut regardless of visibility.
    pub fn fragments<'m>(&self, mesh: &'m MultiresolutionMesh) -> Vec<&'m MeshFragment> {
        self.cut.fragments(mesh)
    }
}

/// Visibility-gated LOD extraction.
pub struct SpatialSelection<'m, 'f, F: ?Sized> {
    mesh: &'m MultiresolutionMesh,
    frustum: &'f F,
    z_scale: f32,
    order: TraversalOrder,
}

impl<'m, 'f, F> SpatialSelection<'m, 'f, F>
where
    F: ViewFrustum + ?Sized,
{
    /// `z_scale` is applied to the z components of arc boxes before they are
    /// tested against `frustum`.
    pub fn new(mesh: &'m MultiresolutionMesh, frustum: &'f F, z_scale: f32) -> Self {
        Self {
            mesh,
            frustum,
            z_scale,
            order: TraversalOrder::default(),
        }
    }

    pub fn with_order(mut self, order: TraversalOrder) -> Self {
        self.order = order;
        self
    }

    pub fn run<C>(&self, criterion: &C) -> SpatialCut
    where
        C: LodCriterion + ?Sized,
    {
        let mut builder = CutBuilder::new(self.mesh, self.order);
        let mut visibility = FxHashMap::default();

        while let Some(region) = builder.pop() {
            let Some(node) = builder.refinable(region) else {
                continue;
            };
            builder.stats.evaluated += 1;

            let visible = region.interferes(self.mesh, self.frustum, self.z_scale);
            visibility.insert(region.id, visible);
            if !visible {
                builder.stats.culled += 1;
                continue;
            }
            if criterion.needs_refinement(region, self.mesh) {
                builder.stats.refined += 1;
                builder.apply(node);
            }
        }

        let cut = builder.finish();
        tracing::debug!(
            arcs = cut.arc_count(),
            applied = cut.applied_count(),
            z_scale = self.z_scale,
            stats = ?cut.stats(),
            "spatial selection finished"
        );
        SpatialCut { cut, visibility }
    }
}
