//! Open a BMT mesh, print its summary and run one level-of-detail extraction.
//!
//! Without `--eye` the whole domain is refined until every arc's geometric
//! error is within `extraction.max_geometric_error`. With `--eye` the
//! extraction is view-dependent: a screen-space error bound drives
//! refinement and only regions inside the camera frustum are refined.

mod inspect;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use bmt_config::{CliArgs, Config};
use bmt_mesh::MultiresolutionMesh;
use clap::Parser;

use inspect::View;

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config_dir = args.config_dir()?;
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    bmt_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let mesh = MultiresolutionMesh::open(
        &config.mesh.index_path,
        &config.mesh.fragment_path,
        inspect::store_options(&config),
    )
    .with_context(|| format!("Failed to open mesh {}", config.mesh.index_path.display()))?;
    let mesh = Arc::new(mesh);

    println!("{}", inspect::format_summary(&mesh.summary()));

    let view = View::from_args(&args, &mesh)?;
    let start = Instant::now();
    let extraction = inspect::extract(&mesh, &config, view.as_ref());
    let elapsed = start.elapsed();

    match &view {
        Some(view) => println!(
            "view-dependent cut from {:?} towards {:?} (max {} px)",
            view.eye, view.target, config.extraction.max_pixel_error
        ),
        None => println!(
            "view-independent cut (max error {})",
            config.extraction.max_geometric_error
        ),
    }
    println!(
        "arcs: {} ({} off-screen)\nfragments: {}\nextraction: {:.3} ms",
        extraction.arcs,
        extraction.hidden_arcs,
        extraction.fragment_ids.len(),
        elapsed.as_secs_f64() * 1000.0,
    );
    tracing::debug!(stats = ?extraction.stats, "extraction stats");

    if args.load_geometry {
        let totals = inspect::load_geometry(
            &mesh,
            &extraction.fragment_ids,
            config.prefetch.workers,
            config.prefetch.budget,
        );
        println!(
            "vertices: {}\ntriangles: {}\ngeometry bytes: {}",
            totals.vertices, totals.triangles, totals.bytes
        );
        if totals.failed > 0 {
            eprintln!("{} fragments failed to load", totals.failed);
        }
        let stats = mesh.store().stats();
        tracing::info!(
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            resident_bytes = stats.resident_bytes,
            "fragment store"
        );
    }

    Ok(())
}
