//! vg-config: machine configuration file format and validation.

pub mod convert;
pub mod schema;
pub mod targets;
pub mod validate;

pub use schema::*;
pub use targets::{TargetDef, TargetSetDef};
pub use validate::{LATEST_VERSION, ValidationError, validate_config};

use std::path::Path;

pub type ConfigFileResult<T> = Result<T, ConfigFileError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigFileError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Grid error: {0}")]
    Grid(#[from] vg_grid::ConfigError),

    #[error("Unsupported file format: {path} (expected .yaml, .yml or .json)")]
    UnsupportedFormat { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn load_yaml(path: &Path) -> ConfigFileResult<MachineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: MachineConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn save_yaml(path: &Path, config: &MachineConfig) -> ConfigFileResult<()> {
    validate_config(config)?;
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &Path) -> ConfigFileResult<MachineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: MachineConfig = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn save_json(path: &Path, config: &MachineConfig) -> ConfigFileResult<()> {
    validate_config(config)?;
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

enum Format {
    Yaml,
    Json,
}

fn format_of(path: &Path) -> ConfigFileResult<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigFileError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

/// Load a machine configuration, choosing the format by extension.
pub fn load(path: &Path) -> ConfigFileResult<MachineConfig> {
    match format_of(path)? {
        Format::Yaml => load_yaml(path),
        Format::Json => load_json(path),
    }
}

pub fn load_targets(path: &Path) -> ConfigFileResult<TargetSetDef> {
    let content = std::fs::read_to_string(path)?;
    Ok(match format_of(path)? {
        Format::Yaml => serde_yaml::from_str(&content)?,
        Format::Json => serde_json::from_str(&content)?,
    })
}
