//! Extraction and reporting behind the `bmt-inspect` command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use bmt_config::{CliArgs, Config, IndexByteOrder, Traversal};
use bmt_mesh::{
    ByteOrder, ExtractionStats, FragmentPrefetcher, MaxGeometricError, MeshSummary,
    MultiresolutionMesh, PlaneFrustum, ScreenSpaceError, SelectiveRefinement, SpatialSelection,
    StoreOptions, TraversalOrder,
};
use glam::Vec3;

pub fn store_options(config: &Config) -> StoreOptions {
    StoreOptions {
        max_idle_buffers: config.pool.max_idle_buffers,
        resident_budget_bytes: config.pool.resident_budget_bytes,
        byte_order: match config.mesh.byte_order {
            IndexByteOrder::Little => ByteOrder::Little,
            IndexByteOrder::Big => ByteOrder::Big,
        },
    }
}

pub fn traversal_order(config: &Config) -> TraversalOrder {
    match config.extraction.traversal {
        Traversal::DepthFirst => TraversalOrder::DepthFirst,
        Traversal::BreadthFirst => TraversalOrder::BreadthFirst,
    }
}

/// A perspective camera for view-dependent extraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct View {
    pub eye: Vec3,
    pub target: Vec3,
}

impl View {
    /// `--eye` enables the view; `--target` defaults to the domain centre.
    pub fn from_args(args: &CliArgs, mesh: &MultiresolutionMesh) -> Result<Option<Self>> {
        let Some(eye) = &args.eye else {
            if args.target.is_some() {
                bail!("--target requires --eye");
            }
            return Ok(None);
        };
        let eye = vec3_arg("--eye", eye)?;
        let target = match &args.target {
            Some(target) => vec3_arg("--target", target)?,
            None => mesh.bbox().center(),
        };
        if eye.distance_squared(target) <= f32::EPSILON {
            bail!("--eye and --target coincide");
        }
        Ok(Some(Self { eye, target }))
    }

    pub fn frustum(&self, config: &Config, mesh: &MultiresolutionMesh) -> PlaneFrustum {
        let (width, height) = config.extraction.viewport;
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let domain = mesh.bbox().scale_z(config.extraction.z_scale);
        let far = self.eye.distance(domain.center()) + domain.extent().length();
        let near = (far * 1e-4).max(1e-3);
        PlaneFrustum::look_at(
            self.eye,
            self.target,
            Vec3::Z,
            config.extraction.fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        )
    }

    pub fn criterion(&self, config: &Config) -> ScreenSpaceError {
        ScreenSpaceError::from_camera(
            self.eye,
            config.extraction.fov_y_degrees.to_radians(),
            config.extraction.viewport.1,
            config.extraction.max_pixel_error,
            config.extraction.z_scale,
        )
    }
}

fn vec3_arg(flag: &str, values: &[f32]) -> Result<Vec3> {
    match <[f32; 3]>::try_from(values) {
        Ok(v) => Ok(Vec3::from(v)),
        Err(_) => bail!("{flag} expects x,y,z, got {} values", values.len()),
    }
}

/// Fragment ids chosen by one extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub fragment_ids: Vec<u32>,
    pub arcs: usize,
    /// Arcs of the cut left out because they are off-screen.
    pub hidden_arcs: usize,
    pub stats: ExtractionStats,
}

/// Run `extract_lod` semantics with a fixed error threshold, or the
/// frustum-gated variant when a view is given.
pub fn extract(mesh: &MultiresolutionMesh, config: &Config, view: Option<&View>) -> Extraction {
    let order = traversal_order(config);
    match view {
        None => {
            let criterion = MaxGeometricError::new(config.extraction.max_geometric_error);
            let cut = SelectiveRefinement::new(mesh)
                .with_order(order)
                .run(&criterion);
            Extraction {
                fragment_ids: cut.fragment_ids(mesh),
                arcs: cut.arc_count(),
                hidden_arcs: 0,
                stats: *cut.stats(),
            }
        }
        Some(view) => {
            let frustum = view.frustum(config, mesh);
            let criterion = view.criterion(config);
            let selection = SpatialSelection::new(mesh, &frustum, config.extraction.z_scale)
                .with_order(order)
                .run(&criterion);
            let visible = selection.visible_arcs().len();
            Extraction {
                fragment_ids: selection
                    .visible_fragments(mesh)
                    .iter()
                    .map(|f| f.id)
                    .collect(),
                arcs: visible,
                hidden_arcs: selection.cut().arc_count() - visible,
                stats: *selection.cut().stats(),
            }
        }
    }
}

/// Geometry totals over a set of fragments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeometryTotals {
    pub fragments: usize,
    pub vertices: u64,
    pub triangles: u64,
    pub bytes: u64,
    pub failed: usize,
}

/// Fetch every fragment in `ids`, warming the store with `workers`
/// prefetch threads first when `workers > 0`.
pub fn load_geometry(
    mesh: &Arc<MultiresolutionMesh>,
    ids: &[u32],
    workers: usize,
    budget: usize,
) -> GeometryTotals {
    if workers > 0 && !ids.is_empty() {
        prefetch(mesh, ids, workers, budget);
    }

    let mut totals = GeometryTotals::default();
    for &id in ids {
        match mesh.fetch_geometry(id) {
            Ok(geometry) => {
                totals.fragments += 1;
                totals.vertices += u64::from(geometry.vertex_count());
                totals.triangles += u64::from(geometry.triangle_count());
                totals.bytes += geometry.byte_len() as u64;
            }
            Err(err) => {
                tracing::warn!(fragment = id, error = %err, "failed to load fragment");
                totals.failed += 1;
            }
        }
    }
    totals
}

fn prefetch(mesh: &Arc<MultiresolutionMesh>, ids: &[u32], workers: usize, budget: usize) {
    let mut prefetcher = FragmentPrefetcher::new(Arc::clone(mesh), workers, budget.max(1));
    let mut warmed = 0;
    for &id in ids {
        while !prefetcher.submit(id) {
            warmed += prefetcher.drain_results().len();
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    prefetcher.shutdown();
    warmed += prefetcher.drain_results().len();
    tracing::debug!(warmed, "prefetch finished");
}

pub fn format_summary(summary: &MeshSummary) -> String {
    let [min, max] = summary.domain.to_array();
    format!(
        "nodes: {}\narcs: {}\nfragments: {}\ndrains: {}\nflags: {:#x}\n\
         max arc error: {}\ndomain: {:?} .. {:?}",
        summary.nodes,
        summary.arcs,
        summary.fragments,
        summary.drains,
        summary.flags,
        summary.max_geometric_error,
        min,
        max,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmt_mesh::writer::{
        ArcSpec, FragmentBlobWriter, FragmentSpec, MeshIndexWriter, NodeSpec, TriangleBatch,
    };
    use bmt_mesh::{BBox, FragmentStore};

    /// Root -> node 1 via a coarse arc covering the domain; node 1 splits
    /// into a west and an east half, each refined once more into a drain.
    /// Every fragment holds a single triangle.
    fn sample_mesh() -> Arc<MultiresolutionMesh> {
        let domain = BBox::new(Vec3::ZERO, Vec3::new(100.0, 100.0, 10.0));
        let west = BBox::new(Vec3::ZERO, Vec3::new(50.0, 100.0, 10.0));
        let east = BBox::new(Vec3::new(50.0, 0.0, 0.0), Vec3::new(100.0, 100.0, 10.0));
        let batch = TriangleBatch {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
        };

        let mut blob = FragmentBlobWriter::new(ByteOrder::Little);
        let mut index = MeshIndexWriter::new();
        for _ in 0..6 {
            index.push_node(NodeSpec::new(domain));
        }
        let arcs = [
            (0, 1, domain, 8.0),
            (1, 2, west, 4.0),
            (1, 3, east, 4.0),
            (2, 4, west, 1.0),
            (3, 5, east, 1.0),
        ];
        for (id, (source, destination, bbox, error)) in arcs.into_iter().enumerate() {
            let id = id as u32;
            index.push_arc(ArcSpec::new(source, destination, id, id, error));
            let (offset, len) = blob.push(&batch);
            index.push_fragment(FragmentSpec::new(bbox, error).with_data(offset, len));
        }

        let store = FragmentStore::from_bytes(blob.into_bytes(), StoreOptions::default());
        Arc::new(MultiresolutionMesh::from_parts(&index.to_bytes(ByteOrder::Little), store).unwrap())
    }

    #[test]
    fn test_store_options_follow_config() {
        let mut config = Config::default();
        config.mesh.byte_order = IndexByteOrder::Big;
        config.pool.max_idle_buffers = 3;
        let options = store_options(&config);
        assert_eq!(options.byte_order, ByteOrder::Big);
        assert_eq!(options.max_idle_buffers, 3);
        assert_eq!(options.resident_budget_bytes, config.pool.resident_budget_bytes);
    }

    /// The error threshold decides how far the cut is refined.
    #[test]
    fn test_extract_by_error_threshold() {
        let mesh = sample_mesh();
        let mut config = Config::default();

        config.extraction.max_geometric_error = 10.0;
        assert_eq!(extract(&mesh, &config, None).fragment_ids, vec![0]);

        config.extraction.max_geometric_error = 5.0;
        let halves = extract(&mesh, &config, None);
        assert_eq!(halves.fragment_ids, vec![1, 2]);
        assert_eq!(halves.stats.refined, 1);

        config.extraction.max_geometric_error = 2.0;
        config.extraction.traversal = Traversal::BreadthFirst;
        let fine = extract(&mesh, &config, None);
        assert_eq!(fine.fragment_ids, vec![3, 4]);
        assert_eq!(fine.arcs, 2);
        assert_eq!(fine.stats.refined, 3);
    }

    /// A camera inside the west half looking west refines it and leaves
    /// the east half, which is behind the camera, coarse and hidden.
    #[test]
    fn test_view_dependent_extraction() {
        let mesh = sample_mesh();
        let mut config = Config::default();
        config.extraction.fov_y_degrees = 30.0;
        config.extraction.viewport = (512, 512);
        let view = View {
            eye: Vec3::new(40.0, 50.0, 5.0),
            target: Vec3::new(0.0, 50.0, 5.0),
        };

        let extraction = extract(&mesh, &config, Some(&view));
        assert_eq!(extraction.fragment_ids, vec![3]);
        assert_eq!(extraction.arcs, 1);
        assert_eq!(extraction.hidden_arcs, 1);
        assert_eq!(extraction.stats.culled, 1);
    }

    #[test]
    fn test_view_from_args() {
        let mesh = sample_mesh();
        let args = CliArgs {
            eye: Some(vec![1.0, 2.0, 3.0]),
            ..Default::default()
        };
        let view = View::from_args(&args, &mesh).unwrap().unwrap();
        assert_eq!(view.eye, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(view.target, Vec3::new(50.0, 50.0, 5.0));

        assert!(View::from_args(&CliArgs::default(), &mesh).unwrap().is_none());

        let target_only = CliArgs {
            target: Some(vec![0.0, 0.0, 0.0]),
            ..Default::default()
        };
        assert!(View::from_args(&target_only, &mesh).is_err());

        let short = CliArgs {
            eye: Some(vec![1.0, 2.0]),
            ..Default::default()
        };
        assert!(View::from_args(&short, &mesh).is_err());
    }

    /// Prefetched or not, the totals are the same.
    #[test]
    fn test_load_geometry_totals() {
        let mesh = sample_mesh();
        let direct = load_geometry(&mesh, &[3, 4], 0, 4);
        assert_eq!(direct.fragments, 2);
        assert_eq!(direct.triangles, 2);
        assert_eq!(direct.vertices, 6);
        assert_eq!(direct.failed, 0);

        let warmed = load_geometry(&mesh, &[0, 1, 2], 2, 1);
        assert_eq!(warmed.fragments, 3);
        assert_eq!(warmed.triangles, 3);
    }

    #[test]
    fn test_format_summary() {
        let mesh = sample_mesh();
        let text = format_summary(&mesh.summary());
        assert!(text.contains("nodes: 6"));
        assert!(text.contains("drains: 2"));
        assert!(text.contains("max arc error: 8"));
    }
}
