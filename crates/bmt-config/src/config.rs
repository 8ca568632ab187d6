//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where the mesh blobs live and how they are encoded.
    pub mesh: MeshConfig,
    /// Fragment store buffer pool and resident cache.
    pub pool: PoolConfig,
    /// Level-of-detail extraction settings.
    pub extraction: ExtractionConfig,
    /// Background fragment loading.
    pub prefetch: PrefetchConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Byte order of the index and fragment blobs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum IndexByteOrder {
    #[default]
    Little,
    Big,
}

/// Processing order of pending arcs during extraction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum Traversal {
    #[default]
    DepthFirst,
    BreadthFirst,
}

/// Mesh location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    /// Index blob (header, node, arc and fragment-info tables).
    pub index_path: PathBuf,
    /// Fragment blob with the triangle batches.
    pub fragment_path: PathBuf,
    pub byte_order: IndexByteOrder,
}

/// Buffer pool and resident cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Returned read buffers kept for reuse.
    pub max_idle_buffers: usize,
    /// Resident geometry bytes above which unused fragments are evicted.
    pub resident_budget_bytes: usize,
}

/// Extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Object-space error threshold for view-independent extraction.
    pub max_geometric_error: f32,
    /// Screen-space error threshold in pixels for view-dependent extraction.
    pub max_pixel_error: f32,
    /// Vertical exaggeration applied to boxes before visibility tests.
    pub z_scale: f32,
    pub traversal: Traversal,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Viewport size in pixels (width, height).
    pub viewport: (u32, u32),
}

/// Prefetch worker pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Worker threads (0 disables prefetching).
    pub workers: usize,
    /// Maximum fragments queued or loading at once.
    pub budget: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("mesh.bmt"),
            fragment_path: PathBuf::from("mesh.frag"),
            byte_order: IndexByteOrder::Little,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_buffers: 64,
            resident_budget_bytes: 256 * 1024 * 1024,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_geometric_error: 1.0,
            max_pixel_error: 1.5,
            z_scale: 1.0,
            traversal: Traversal::DepthFirst,
            fov_y_degrees: 60.0,
            viewport: (1280, 720),
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            budget: 256,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Re-read the file: returns `Some(new_config)` if it changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("max_idle_buffers: 64"));
        assert!(ron_str.contains("byte_order: Little"));
        assert!(ron_str.contains("traversal: DepthFirst"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.mesh.byte_order = IndexByteOrder::Big;
        config.extraction.traversal = Traversal::BreadthFirst;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    /// A file written before the prefetch section existed still loads.
    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(mesh: (index_path: \"terrain.bmt\"), extraction: (z_scale: 3.0))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.prefetch, PrefetchConfig::default());
        assert_eq!(config.mesh.index_path, PathBuf::from("terrain.bmt"));
        assert_eq!(config.mesh.fragment_path, PathBuf::from("mesh.frag"));
        assert_eq!(config.extraction.z_scale, 3.0);
        assert_eq!(config.extraction.max_pixel_error, 1.5);
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.mesh.index_path = PathBuf::from("/data/puget.bmt");
        config.pool.resident_budget_bytes = 1 << 20;
        config.prefetch.workers = 0;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("nested");
        let config = Config::load_or_create(&config_dir).unwrap();
        assert_eq!(config, Config::default());
        assert!(config_dir.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.extraction.max_geometric_error = 0.25;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().extraction.max_geometric_error, 0.25);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_ron_comments_accepted() {
        let ron_str = "// mesh settings\n(\n  // none yet\n)";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config, Config::default());
    }
}
