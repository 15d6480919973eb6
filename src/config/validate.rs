// src/config/validate.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    RawConfigFile, ReloadSettings, Settings, SyncSettings, WatchSettings,
};
use crate::errors::{DevmonError, Result};

/// Resolve a raw config against `base` (the config file's directory) and
/// validate the result.
///
/// The root is canonicalized; every other path is joined onto the root.
pub fn resolve_settings(raw: RawConfigFile, base: &Path) -> Result<Settings> {
    let root = resolve_root(&raw.root, base)?;

    let log_dir = root.join(&raw.log_dir);
    let build_dir = root.join(&raw.reload.build_dir);
    let binary = build_dir.join(binary_file_name(&raw.reload.binary));
    let run_command = match raw.reload.run_command.trim() {
        "" => None,
        cmd => Some(cmd.to_string()),
    };

    let settings = Settings {
        delay: Duration::from_millis(raw.delay_ms),
        watch: WatchSettings {
            include_exts: raw
                .watch
                .include_exts
                .iter()
                .map(|e| normalize_ext(e))
                .filter(|e| !e.is_empty())
                .collect(),
            exclude_dirs: raw
                .watch
                .exclude_dirs
                .iter()
                .map(|d| d.trim().trim_matches('/').to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            include_dirs: raw.watch.include_dirs.iter().map(|d| root.join(d)).collect(),
            exclude_files: raw.watch.exclude_files.iter().map(|f| root.join(f)).collect(),
        },
        reload: ReloadSettings {
            enabled: raw.reload.enabled,
            working_dir: root.clone(),
            source_dir: root.join(&raw.reload.source_dir),
            build_dir,
            binary,
            build_command: raw.reload.build_command.trim().to_string(),
            run_command,
            build_log: log_dir.join(&raw.reload.build_log),
            clean_build_dir: raw.reload.clean_build_dir,
        },
        sync: SyncSettings {
            enabled: raw.sync.enabled,
            port: raw.sync.port,
        },
        log_time: raw.log.time,
        log_dir,
        root,
    };

    validate_settings(&settings)?;
    Ok(settings)
}

/// Check the invariants the components rely on.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if !settings.root.is_dir() {
        return Err(DevmonError::ConfigError(format!(
            "watch root {:?} is not a directory",
            settings.root
        )));
    }

    if settings.delay.is_zero() {
        return Err(DevmonError::ConfigError(
            "delay_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if settings.reload.enabled {
        if settings.reload.build_command.is_empty() {
            return Err(DevmonError::ConfigError(
                "[reload].build_command must not be empty when reload is enabled".to_string(),
            ));
        }
        if !settings.reload.source_dir.is_dir() {
            return Err(DevmonError::ConfigError(format!(
                "[reload].source_dir {:?} does not exist",
                settings.reload.source_dir
            )));
        }
    }

    Ok(())
}

fn resolve_root(root: &Path, base: &Path) -> Result<PathBuf> {
    let joined = if root.is_absolute() {
        root.to_path_buf()
    } else {
        base.join(root)
    };
    joined.canonicalize().map_err(|e| {
        DevmonError::ConfigError(format!("cannot resolve watch root {joined:?}: {e}"))
    })
}

fn normalize_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_string()
}

fn binary_file_name(name: &str) -> String {
    if cfg!(windows) && !name.ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}
