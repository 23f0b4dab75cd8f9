//! Configuration file discovery and folder resolution
//!
//! Folder settings follow the same priority order everywhere:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file value
//! 4. Compiled default (fallback)
//!
//! clap already folds 1 and 2 together for flags declared with `env = ...`,
//! so callers usually pass the clap value as `cli_arg`.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application directory name used under the platform config directory
pub const APP_DIR_NAME: &str = "hrr";

/// Config file name looked up inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Locate the TOML config file
///
/// An explicit path always wins and must exist. Without one, the user config
/// directory (`~/.config/hrr/config.toml` on Linux) and then
/// `/etc/hrr/config.toml` are tried. Returns `Ok(None)` when no file is found,
/// which is a normal situation: every key has a built-in default.
pub fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join(CONFIG_FILE_NAME);
        if system_config.is_file() {
            return Ok(Some(system_config));
        }
    }

    debug!("No config file found, using built-in defaults");
    Ok(None)
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
}

/// Resolve a folder setting by priority order
///
/// `default` is used as-is when nothing else is set; relative defaults are
/// interpreted against the working directory by the caller.
pub fn resolve_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
    default: &Path,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default.to_path_buf()
}
