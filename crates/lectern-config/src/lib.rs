//! Lectern configuration system.
//!
//! Provides TOML-based configuration for the live classroom client with
//! full validation. All config sections use sensible defaults so partial
//! configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lectern_config::{load_config, config_to_json};
//!
//! let config = load_config(None).expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    ChatConfig, IceServerConfig, LecternConfig, LogLevel, LoggingConfig, SignalingConfig,
    TransportConfig, WhiteboardConfig, CONFIG_SCHEMA_VERSION,
};

use std::path::Path;

use lectern_common::ConfigError;

/// Load and strictly validate the config.
///
/// With `path`, the file must exist. Without it, the file named by
/// `$LECTERN_CONFIG` (or `config.toml` in the OS config directory) is
/// read, and created with defaults if missing.
pub fn load_config(path: Option<&Path>) -> Result<LecternConfig, ConfigError> {
    let config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };

    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &LecternConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
