//! Selective refinement: top-down adaptation of a DAG cut.
//!
//! Extraction starts from the coarsest cut (the arcs leaving the root) and
//! repeatedly replaces an arc by the finer arcs of its destination node when
//! the criterion asks for it. A node may only be applied once every arc
//! entering it is part of the cut, so applying a node first applies, without
//! consulting the criterion, every unapplied node it depends on. Each node is
//! applied at most once, bounding the work by `O(nodes + arcs)`.
//!
//! All state is local to one call; concurrent extractions over the same mesh
//! do not interact.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::arc::MeshArc;
use crate::criterion::LodCriterion;
use crate::fragment::MeshFragment;
use crate::mesh::{IncomingArcs, MultiresolutionMesh};

/// Order in which pending arcs are evaluated.
///
/// Only the amount and order of work changes; the final cut is the same.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TraversalOrder {
    /// Last exposed arc first (a stack).
    #[default]
    DepthFirst,
    /// First exposed arc first (a queue).
    BreadthFirst,
}

/// Work counters for one extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Arcs taken off the pending list.
    pub popped: usize,
    /// Arcs whose refinement decision was evaluated.
    pub evaluated: usize,
    /// Nodes applied because the criterion asked for it.
    pub refined: usize,
    /// Nodes applied only to keep the cut consistent.
    pub forced: usize,
    /// Incoming arcs inspected while resolving dependencies. At most one
    /// pass per applied node, so never more than the arc count.
    pub dependency_checks: usize,
    /// Arcs left coarse because they were outside the view frustum.
    pub culled: usize,
}

/// A consistent cut through the DAG: the extracted level of detail.
#[derive(Clone, Debug)]
pub struct Cut {
    lod: FxHashSet<u32>,
    applied: Vec<bool>,
    stats: ExtractionStats,
}

impl Cut {
    /// Arc ids in the cut, ascending.
    pub fn arcs(&self) -> Vec<u32> {
        let mut arcs: Vec<u32> = self.lod.iter().copied().collect();
        arcs.sort_unstable();
        arcs
    }

    pub fn contains_arc(&self, arc: u32) -> bool {
        self.lod.contains(&arc)
    }

    pub fn arc_count(&self) -> usize {
        self.lod.len()
    }

    /// Whether the modification at `node` has been incorporated.
    pub fn is_applied(&self, node: u32) -> bool {
        self.applied[node as usize]
    }

    pub fn applied_count(&self) -> usize {
        self.applied.iter().filter(|&&a| a).count()
    }

    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    /// Fragment ids covered by the cut, ordered by arc and then fragment id.
    pub fn fragment_ids(&self, mesh: &MultiresolutionMesh) -> Vec<u32> {
        self.arcs()
            .into_iter()
            .flat_map(|arc| mesh.arc(arc).patch_range())
            .collect()
    }

    /// Fragments covered by the cut, ordered by arc and then fragment id.
    pub fn fragments<'m>(&self, mesh: &'m MultiresolutionMesh) -> Vec<&'m MeshFragment> {
        fragments_of(mesh, self.arcs())
    }
}

pub(crate) fn fragments_of(
    mesh: &MultiresolutionMesh,
    arcs: impl IntoIterator<Item = u32>,
) -> Vec<&MeshFragment> {
    arcs.into_iter()
        .flat_map(|arc| mesh.arc(arc).fragments(mesh))
        .collect()
}

/// Mutable state of one extraction: `applied`, `lod` and the pending arcs.
pub(crate) struct CutBuilder<'m> {
    mesh: &'m MultiresolutionMesh,
    order: TraversalOrder,
    applied: Vec<bool>,
    /// Nodes currently on the dependency-closure stack.
    visiting: Vec<bool>,
    lod: FxHashSet<u32>,
    to_do: VecDeque<u32>,
    pub(crate) stats: ExtractionStats,
}

impl<'m> CutBuilder<'m> {
    /// Start from the root: its outgoing arcs form the cut and are pending.
    pub(crate) fn new(mesh: &'m MultiresolutionMesh, order: TraversalOrder) -> Self {
        let node_count = mesh.nodes().len();
        let mut builder = Self {
            mesh,
            order,
            applied: vec![false; node_count],
            visiting: vec![false; node_count],
            lod: FxHashSet::default(),
            to_do: VecDeque::new(),
            stats: ExtractionStats::default(),
        };
        builder.applied[0] = true;
        builder.expose(0);
        builder
    }

    pub(crate) fn pop(&mut self) -> Option<&'m MeshArc> {
        let id = match self.order {
            TraversalOrder::DepthFirst => self.to_do.pop_back(),
            TraversalOrder::BreadthFirst => self.to_do.pop_front(),
        }?;
        self.stats.popped += 1;
        Some(self.mesh.arc(id))
    }

    /// The node `region` would refine into, if it can still be applied.
    pub(crate) fn refinable(&self, region: &MeshArc) -> Option<u32> {
        let node = self.mesh.node(region.destination_node);
        if node.is_drain() || self.applied[node.id as usize] {
            return None;
        }
        Some(node.id)
    }

    /// Add `node`'s outgoing arcs to the cut and the pending list.
    fn expose(&mut self, node: u32) {
        for arc in self.mesh.node(node).outgoing_arcs() {
            self.lod.insert(arc);
            self.to_do.push_back(arc);
        }
    }

    /// Apply `node` after applying every unapplied node it depends on.
    ///
    /// Dependencies are resolved with an explicit stack, so DAG depth does
    /// not consume call stack.
    ///
    /// # Panics
    ///
    /// Panics if the incoming-arc relation contains a cycle.
    pub(crate) fn apply(&mut self, node: u32) {
        let mesh = self.mesh;
        // Each frame keeps its position in the node's incoming list, so the
        // list is walked once however many parents get forced.
        let mut stack: Vec<(u32, IncomingArcs<'m>)> = vec![(node, mesh.incoming_arcs(node))];
        self.visiting[node as usize] = true;

        while let Some((current, incoming)) = stack.last_mut() {
            let current = *current;
            let applied = &self.applied;
            let checks = &mut self.stats.dependency_checks;
            let pending = incoming
                .by_ref()
                .inspect(|_| *checks += 1)
                .map(|arc| arc.source_node)
                .find(|&source| !applied[source as usize]);

            if let Some(source) = pending {
                assert!(
                    !self.visiting[source as usize],
                    "dependency cycle through node {source}"
                );
                self.visiting[source as usize] = true;
                self.stats.forced += 1;
                stack.push((source, mesh.incoming_arcs(source)));
                continue;
            }

            stack.pop();
            self.visiting[current as usize] = false;
            for arc in mesh.incoming_arcs(current) {
                self.lod.remove(&arc.id);
            }
            self.expose(current);
            self.applied[current as usize] = true;
        }
    }

    pub(crate) fn finish(self) -> Cut {
        Cut {
            lod: self.lod,
            applied: self.applied,
            stats: self.stats,
        }
    }
}

/// Whole-mesh LOD extraction driven only by an error criterion.
pub struct SelectiveRefinement<'m> {
    mesh: &'m MultiresolutionMesh,
    order: TraversalOrder,
}

impl<'m> SelectiveRefinement<'m> {
    pub fn new(mesh: &'m MultiresolutionMesh) -> Self {
        Self {
            mesh,
            order: TraversalOrder::default(),
        }
    }

    pub fn with_order(mut self, order: TraversalOrder) -> Self {
        self.order = order;
        self
    }

    /// Compute the coarsest consistent cut for which `criterion` asks for no
    /// further refinement.
    pub fn run<C>(&self, criterion: &C) -> Cut
    where
        C: LodCriterion + ?Sized,
    {
        let mut builder = CutBuilder::new(self.mesh, self.order);

        while let Some(region) = builder.pop() {
            let Some(node) = builder.refinable(region) else {
                continue;
            };
            builder.stats.evaluated += 1;
            if criterion.needs_refinement(region, self.mesh) {
                builder.stats.refined += 1;
                builder.apply(node);
            }
        }

        let cut = builder.finish();
        tracing::debug!(
            arcs = cut.arc_count(),
            applied = cut.applied_count(),
            stats = ?cut.stats(),
            "selective refinement finished"
        );
        cut
    }
}
