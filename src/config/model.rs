// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// root = "."
/// delay_ms = 1000
///
/// [watch]
/// include_exts = ["go", "html"]
/// exclude_dirs = ["vendor"]
///
/// [reload]
/// source_dir = "cmd/web"
///
/// [sync]
/// port = 3000
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Watch root, relative to the directory holding the config file.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Width of the event batching window in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Directory for log files (relative to `root`).
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub reload: ReloadSection,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub log: LogSection,
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            root: default_root(),
            delay_ms: default_delay_ms(),
            log_dir: default_log_dir(),
            watch: WatchSection::default(),
            reload: ReloadSection::default(),
            sync: SyncSection::default(),
            log: LogSection::default(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("tmp")
}

/// `[watch]` section: which paths are relevant for change detection.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// File extensions (without the leading dot) that count as source files.
    #[serde(default = "default_include_exts")]
    pub include_exts: Vec<String>,

    /// Directory names excluded when they are the first path segment below
    /// the root.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    /// If non-empty, only these directories (and their descendants) are
    /// watched.
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,

    /// Individual files that never count as a change.
    #[serde(default)]
    pub exclude_files: Vec<PathBuf>,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            include_exts: default_include_exts(),
            exclude_dirs: default_exclude_dirs(),
            include_dirs: Vec::new(),
            exclude_files: Vec::new(),
        }
    }
}

fn default_include_exts() -> Vec<String> {
    ["go", "tpl", "tmpl", "html", "css", "js", "env", "yaml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_dirs() -> Vec<String> {
    ["assets", "tmp", "vendor", "node_modules", "build"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// `[reload]` section: how to build and run the user's program.
#[derive(Debug, Clone, Deserialize)]
pub struct ReloadSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// File name of the built binary inside `build_dir`.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Invoked as `<build_command> <binary> <source_dir>`.
    #[serde(default = "default_build_command")]
    pub build_command: String,

    /// Command used to start the program. Empty means "run the binary".
    #[serde(default)]
    pub run_command: String,

    /// File name of the build log inside the log directory.
    #[serde(default = "default_build_log")]
    pub build_log: String,

    /// Remove the whole build directory on shutdown.
    #[serde(default)]
    pub clean_build_dir: bool,
}

impl Default for ReloadSection {
    fn default() -> Self {
        Self {
            enabled: true,
            source_dir: default_source_dir(),
            build_dir: default_build_dir(),
            binary: default_binary(),
            build_command: default_build_command(),
            run_command: String::new(),
            build_log: default_build_log(),
            clean_build_dir: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("cmd/web")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_binary() -> String {
    "app".to_string()
}

fn default_build_command() -> String {
    "go build -o".to_string()
}

fn default_build_log() -> String {
    "build.log".to_string()
}

/// `[sync]` section: browser refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    /// Prefix log lines with a timestamp.
    #[serde(default = "default_true")]
    pub time: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { time: true }
    }
}

/// Fully resolved, immutable settings shared by every component.
///
/// All paths are absolute. Build with
/// [`resolve_settings`](crate::config::validate::resolve_settings).
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub delay: Duration,
    pub log_dir: PathBuf,
    pub watch: WatchSettings,
    pub reload: ReloadSettings,
    pub sync: SyncSettings,
    pub log_time: bool,
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Normalized extensions, without leading dot.
    pub include_exts: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub include_dirs: Vec<PathBuf>,
    pub exclude_files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ReloadSettings {
    pub enabled: bool,
    /// Working directory for build and run commands (the watch root).
    pub working_dir: PathBuf,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub binary: PathBuf,
    pub build_command: String,
    pub run_command: Option<String>,
    pub build_log: PathBuf,
    pub clean_build_dir: bool,
}

impl ReloadSettings {
    /// The command line that starts the user's program.
    pub fn effective_run_command(&self) -> String {
        match &self.run_command {
            Some(cmd) => cmd.clone(),
            None => quote_path(&self.binary),
        }
    }

    /// The full build command line, with output binary and source directory
    /// appended.
    pub fn effective_build_command(&self) -> String {
        format!(
            "{} {} {}",
            self.build_command.trim(),
            quote_path(&self.binary),
            quote_path(&self.source_dir)
        )
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub enabled: bool,
    pub port: u16,
}

fn quote_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.contains(char::is_whitespace) {
        format!("\"{s}\"")
    } else {
        s.into_owned()
    }
}
