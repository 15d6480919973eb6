// src/watch/registry.rs

//! Set of directories with an active watch subscription.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Directories currently subscribed. Each path appears at most once.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    dirs: Mutex<BTreeSet<PathBuf>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `dir` was already registered.
    pub fn insert(&self, dir: &Path) -> bool {
        self.lock().insert(dir.to_path_buf())
    }

    pub fn remove(&self, dir: &Path) -> bool {
        self.lock().remove(dir)
    }

    /// Remove `dir` and every registered descendant, returning the removed
    /// paths (deepest first).
    pub fn remove_tree(&self, dir: &Path) -> Vec<PathBuf> {
        let mut dirs = self.lock();
        let removed: Vec<PathBuf> = dirs
            .iter()
            .filter(|d| d.starts_with(dir))
            .rev()
            .cloned()
            .collect();
        for d in &removed {
            dirs.remove(d);
        }
        removed
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.lock().contains(dir)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<PathBuf>> {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
