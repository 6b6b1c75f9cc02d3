//! Where the config file lives, and seeding it on first run.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use lectern_common::ConfigError;
use tracing::{debug, info};

use super::template::default_config_toml;

/// Overrides the config file location when set and non-empty.
pub const CONFIG_PATH_ENV: &str = "LECTERN_CONFIG";

const APP_DIR: &str = "lectern";
const FILE_NAME: &str = "config.toml";

/// Path of the config file: `$LECTERN_CONFIG` if set, else
/// `<os config dir>/lectern/config.toml`.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    resolve(std::env::var_os(CONFIG_PATH_ENV), dirs::config_dir())
}

fn resolve(
    env_override: Option<OsString>,
    os_config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = env_override.filter(|p| !p.is_empty()) {
        debug!(path = ?path, "config path taken from {CONFIG_PATH_ENV}");
        return Ok(PathBuf::from(path));
    }
    os_config_dir
        .map(|dir| dir.join(APP_DIR).join(FILE_NAME))
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))
}

/// Write the commented default config to `path`, creating parent
/// directories. Never replaces a file that already exists.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let write_error = |what: &str, e: std::io::Error| {
        ConfigError::WriteError(format!("{what} {}: {e}", path.display()))
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| write_error("failed to create directory for", e))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| write_error("refusing to write default config to", e))?;
    file.write_all(default_config_toml().as_bytes())
        .map_err(|e| write_error("failed to write default config to", e))?;

    info!(path = %path.display(), "created default config");
    Ok(())
}
