//! Core TOML config loading: read from path or platform default.

use crate::schema::LecternConfig;
use crate::validation;
use lectern_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{config_file_path, write_default_config};

/// Load config from a specific TOML file path.
///
/// Deserializes the file using serde defaults for any missing fields.
/// Validation problems are logged; the parsed config is returned as-is so
/// the caller decides whether to run `validation::validate` strictly.
pub fn load_from_path(path: &Path) -> Result<LecternConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: LecternConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from [`config_file_path`].
///
/// If the file does not exist, creates a default config file and returns defaults.
pub fn load_default() -> Result<LecternConfig, ConfigError> {
    let path = config_file_path()?;

    if !path.exists() {
        info!("no config found at {}, creating default", path.display());
        write_default_config(&path)?;
        return Ok(LecternConfig::default());
    }

    load_from_path(&path)
}
