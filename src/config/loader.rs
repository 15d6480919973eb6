// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawConfigFile, Settings};
use crate::config::validate::resolve_settings;
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization. Use [`load_settings`] for the
/// resolved and validated form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load and resolve settings.
///
/// See [`load_raw`] for how the file is located.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (raw, base) = load_raw(path)?;
    resolve_settings(raw, &base)
}

/// Locate and parse the config file, returning it together with the
/// directory its relative paths are resolved against.
///
/// - An explicit `path` must exist.
/// - Without a path, `devmon.toml` in the working directory is used if
///   present, otherwise the built-in defaults rooted at the working directory.
pub fn load_raw(path: Option<&Path>) -> Result<(RawConfigFile, PathBuf)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = default_config_path();
            if !default_path.is_file() {
                debug!("no {:?} found, using default configuration", default_path);
                return Ok((RawConfigFile::default(), config_root_dir(&default_path)));
            }
            default_path
        }
    };
    let raw = load_from_path(&path)?;
    Ok((raw, config_root_dir(&path)))
}

/// Name of the config file looked up in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("devmon.toml")
}

/// Directory relative paths in a config file are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "web/devmon.toml"),
///   we use that directory.
/// - If it's just a bare filename, we fall back to the current working
///   directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
