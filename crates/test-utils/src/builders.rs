//! Builders for test settings.

use std::path::{Path, PathBuf};

use devmon::config::{resolve_settings, RawConfigFile, Settings};

/// Builder for [`Settings`] rooted at a (usually temporary) directory.
///
/// Reload and sync start disabled and the batch window is short, so a bare
/// `SettingsBuilder::new(dir).build()` is a detection-only setup.
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    root: PathBuf,
    raw: RawConfigFile,
}

impl SettingsBuilder {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let mut raw = RawConfigFile::default();
        raw.root = root.clone();
        raw.delay_ms = 100;
        raw.reload.enabled = false;
        raw.sync.enabled = false;
        Self { root, raw }
    }

    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.raw.delay_ms = delay_ms;
        self
    }

    pub fn include_exts(mut self, exts: &[&str]) -> Self {
        self.raw.watch.include_exts = exts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn exclude_dirs(mut self, dirs: &[&str]) -> Self {
        self.raw.watch.exclude_dirs = dirs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn include_dirs(mut self, dirs: &[&str]) -> Self {
        self.raw.watch.include_dirs = dirs.iter().map(PathBuf::from).collect();
        self
    }

    pub fn exclude_files(mut self, files: &[&str]) -> Self {
        self.raw.watch.exclude_files = files.iter().map(PathBuf::from).collect();
        self
    }

    /// Enable reload with the given source dir (relative to the root) and
    /// build command prefix.
    pub fn reload(mut self, source_dir: &str, build_command: &str) -> Self {
        self.raw.reload.enabled = true;
        self.raw.reload.source_dir = PathBuf::from(source_dir);
        self.raw.reload.build_command = build_command.to_string();
        self
    }

    pub fn binary(mut self, name: &str) -> Self {
        self.raw.reload.binary = name.to_string();
        self
    }

    pub fn run_command(mut self, cmd: &str) -> Self {
        self.raw.reload.run_command = cmd.to_string();
        self
    }

    pub fn clean_build_dir(mut self, clean: bool) -> Self {
        self.raw.reload.clean_build_dir = clean;
        self
    }

    /// Enable sync on `port` (0 picks a free port).
    pub fn sync(mut self, port: u16) -> Self {
        self.raw.sync.enabled = true;
        self.raw.sync.port = port;
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.raw
    }

    pub fn build(self) -> Settings {
        resolve_settings(self.raw, &self.root).expect("test settings should be valid")
    }
}
