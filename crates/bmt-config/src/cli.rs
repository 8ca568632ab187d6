//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::error::ConfigError;
use crate::{Config, IndexByteOrder, Traversal};

/// `bmt-inspect` command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "bmt-inspect", about = "Inspect a BMT multiresolution mesh")]
pub struct CliArgs {
    /// Index blob path.
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Fragment blob path.
    #[arg(long)]
    pub fragments: Option<PathBuf>,

    /// Byte order of both blobs.
    #[arg(long, value_enum)]
    pub byte_order: Option<IndexByteOrder>,

    /// Object-space error threshold.
    #[arg(long)]
    pub max_error: Option<f32>,

    /// Screen-space error threshold in pixels.
    #[arg(long)]
    pub pixel_error: Option<f32>,

    /// Vertical exaggeration for visibility tests.
    #[arg(long)]
    pub z_scale: Option<f32>,

    /// Order in which pending arcs are processed.
    #[arg(long, value_enum)]
    pub traversal: Option<Traversal>,

    /// Prefetch worker threads (0 disables prefetching).
    #[arg(long)]
    pub prefetch: Option<usize>,

    /// Camera position `x,y,z`; enables view-dependent extraction.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub eye: Option<Vec<f32>>,

    /// Camera look-at point `x,y,z`. Defaults to the centre of the mesh.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub target: Option<Vec<f32>>,

    /// Fetch every extracted fragment and report triangle totals.
    #[arg(long)]
    pub load_geometry: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// `--config` if given, else `bmt-inspect` under the platform config dir.
    pub fn config_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.config {
            return Ok(dir.clone());
        }
        dirs::config_dir()
            .map(|dir| dir.join("bmt-inspect"))
            .ok_or(ConfigError::NoConfigDir)
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref path) = args.index {
            self.mesh.index_path = path.clone();
        }
        if let Some(ref path) = args.fragments {
            self.mesh.fragment_path = path.clone();
        }
        if let Some(order) = args.byte_order {
            self.mesh.byte_order = order;
        }
        if let Some(e) = args.max_error {
            self.extraction.max_geometric_error = e;
        }
        if let Some(e) = args.pixel_error {
            self.extraction.max_pixel_error = e;
        }
        if let Some(z) = args.z_scale {
            self.extraction.z_scale = z;
        }
        if let Some(t) = args.traversal {
            self.extraction.traversal = t;
        }
        if let Some(workers) = args.prefetch {
            self.prefetch.workers = workers;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            index: Some(PathBuf::from("a.bmt")),
            byte_order: Some(IndexByteOrder::Big),
            z_scale: Some(4.0),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.mesh.index_path, PathBuf::from("a.bmt"));
        assert_eq!(config.mesh.byte_order, IndexByteOrder::Big);
        assert_eq!(config.extraction.z_scale, 4.0);
        // Non-overridden fields retain defaults
        assert_eq!(config.mesh.fragment_path, PathBuf::from("mesh.frag"));
        assert_eq!(config.prefetch.workers, 2);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_camera_and_enums() {
        let args = CliArgs::try_parse_from([
            "bmt-inspect",
            "--eye",
            "10,-20,300",
            "--target",
            "-5,0,0.5",
            "--traversal",
            "breadth-first",
            "--byte-order",
            "big",
            "--prefetch",
            "0",
        ])
        .unwrap();
        assert_eq!(args.eye, Some(vec![10.0, -20.0, 300.0]));
        assert_eq!(args.traversal, Some(Traversal::BreadthFirst));
        assert_eq!(args.byte_order, Some(IndexByteOrder::Big));
        assert_eq!(args.prefetch, Some(0));
        assert_eq!(args.target, Some(vec![-5.0, 0.0, 0.5]));
    }

    #[test]
    fn test_explicit_config_dir_wins() {
        let args = CliArgs {
            config: Some(PathBuf::from("/tmp/bmt")),
            ..Default::default()
        };
        assert_eq!(args.config_dir().unwrap(), PathBuf::from("/tmp/bmt"));
    }
}
