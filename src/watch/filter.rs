// src/watch/filter.rs

//! Path classification rules for change detection.
//!
//! All functions are pure: they only look at the path and the resolved
//! settings, never at the filesystem.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::config::Settings;

/// Include/exclude rules resolved from [`Settings`].
#[derive(Debug, Clone)]
pub struct Filter {
    root: PathBuf,
    build_dir: PathBuf,
    log_dir: PathBuf,
    include_exts: Vec<String>,
    exclude_dirs: Vec<String>,
    include_dirs: Vec<PathBuf>,
    exclude_files: Vec<PathBuf>,
}

impl Filter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            root: settings.root.clone(),
            build_dir: settings.reload.build_dir.clone(),
            log_dir: settings.log_dir.clone(),
            include_exts: settings.watch.include_exts.clone(),
            exclude_dirs: settings.watch.exclude_dirs.clone(),
            include_dirs: settings.watch.include_dirs.clone(),
            exclude_files: settings.watch.exclude_files.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True for the build and log directories, hidden directories, and
    /// directories whose first segment below the root is in the exclude
    /// list. The root itself is never excluded.
    pub fn is_excluded_dir(&self, path: &Path) -> bool {
        if path == self.root {
            return false;
        }
        if path == self.build_dir || path == self.log_dir {
            return true;
        }
        if path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.starts_with('.'))
        {
            return true;
        }
        match first_segment(&self.root, path) {
            Some(segment) => self.exclude_dirs.iter().any(|d| d == segment),
            None => false,
        }
    }

    /// True when the include list is empty, for the root, and for any
    /// directory equal to or nested under an include entry.
    pub fn is_included_dir(&self, path: &Path) -> bool {
        self.include_dirs.is_empty()
            || path == self.root
            || self.include_dirs.iter().any(|dir| path.starts_with(dir))
    }

    /// True for listed files (exact path match) and for files whose
    /// extension is not listed. An empty extension list excludes every file.
    pub fn is_excluded_file(&self, path: &Path) -> bool {
        if self.exclude_files.iter().any(|f| f == path) {
            return true;
        }
        match path.extension().and_then(OsStr::to_str) {
            Some(ext) => !self.include_exts.iter().any(|e| e == ext),
            None => true,
        }
    }

    /// Whether a write to `path` may count as a change: the file itself is
    /// not excluded, its directory is included, and no directory between it
    /// and the root is excluded.
    pub fn is_watch_relevant(&self, path: &Path) -> bool {
        if !path.starts_with(&self.root) || self.is_excluded_file(path) {
            return false;
        }
        let Some(parent) = path.parent() else {
            return false;
        };
        if !self.is_included_dir(parent) {
            return false;
        }
        !parent
            .ancestors()
            .take_while(|dir| dir.starts_with(&self.root))
            .any(|dir| self.is_excluded_dir(dir))
    }
}

fn first_segment<'a>(root: &Path, path: &'a Path) -> Option<&'a str> {
    let rel = path.strip_prefix(root).ok()?;
    match rel.components().next()? {
        Component::Normal(seg) => seg.to_str(),
        _ => None,
    }
}
