// src/watch/path_utils.rs

//! Utility functions for path handling in the detector.

use std::path::Path;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Returns `None` if the path is not below `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Relative form for log lines, falling back to the full path.
pub fn display_path(root: &Path, path: &Path) -> String {
    match relative_str(root, path) {
        Some(rel) if !rel.is_empty() => rel,
        Some(_) => ".".to_string(),
        None => path.display().to_string(),
    }
}

/// Whether `path` lies inside any of `dirs` (or is one of them).
pub fn is_under_any<P: AsRef<Path>>(path: &Path, dirs: &[P]) -> bool {
    dirs.iter().any(|d| path.starts_with(d.as_ref()))
}
