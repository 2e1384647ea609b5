//! Configuration management
//!
//! Precedence: env > file > CLI > defaults. The caller seeds a
//! [`ConfigBuilder`] from command-line flags; the file and the environment are
//! layered on top of it.

mod builder;
mod env;
mod file;

use std::path::Path;

pub use builder::{Config, ConfigBuilder, ObservabilityConfig, OutputFormat};

use crate::Result;

/// Layer the first config file found and the environment over `builder`.
pub fn load_config(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Some(path) = file::find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    builder = env::load_from_env(builder)?;
    Ok(builder)
}

/// Layer the file at `path` and the environment over `builder`.
pub fn load_config_from_path(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let builder = file::load_from_file(path, builder)?;
    env::load_from_env(builder)
}
