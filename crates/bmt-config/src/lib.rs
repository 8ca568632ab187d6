//! Settings for opening and viewing BMT meshes.
//!
//! Settings persist to disk as `config.ron` and can be overridden per run
//! from the command line. Missing fields and sections fall back to their
//! defaults, so older files keep loading as settings are added.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, Config, DebugConfig, ExtractionConfig, IndexByteOrder, MeshConfig, PoolConfig,
    PrefetchConfig, Traversal,
};
pub use error::ConfigError;
