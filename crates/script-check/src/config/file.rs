//! TOML configuration file loading

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::builder::{ConfigBuilder, OutputFormat};
use crate::Result;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./script-check.toml",
    "~/.config/script-check/config.toml",
    "/etc/script-check/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    apply_file_config(builder, file_config)
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    if let Some(script) = config.script
        && let Some(objects) = script.protected_objects
    {
        builder = builder.protected_objects(objects);
    }

    if let Some(output) = config.output
        && let Some(format) = output.format
    {
        builder = builder.format(format.parse::<OutputFormat>()?);
    }

    if let Some(obs) = config.observability {
        if let Some(level) = obs.log_level {
            builder = builder.log_level(level);
        }

        if let Some(json) = obs.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    script: Option<ScriptConfig>,
    output: Option<OutputConfig>,
    observability: Option<ObservabilityFileConfig>,
}

#[derive(Debug, Deserialize)]
struct ScriptConfig {
    protected_objects: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OutputConfig {
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObservabilityFileConfig {
    log_level: Option<String>,
    json_logs: Option<bool>,
}
