// src/watch/checksum.rs

//! Content digests and the last-known digest per file.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use blake3::Hasher;

use crate::fs::FileSystem;

/// Last-known content digest per absolute file path.
///
/// Entries are never evicted; paths under removed directories are filtered
/// out before they are looked up again.
#[derive(Debug, Default)]
pub struct ChecksumStore {
    digests: Mutex<HashMap<PathBuf, String>>,
}

impl ChecksumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_checksum(&self, path: &Path, digest: &str) {
        self.lock().insert(path.to_path_buf(), digest.to_string());
    }

    /// A path without a stored digest counts as changed.
    pub fn has_changed(&self, path: &Path, digest: &str) -> bool {
        self.lock()
            .get(path)
            .is_none_or(|known| known.as_str() != digest)
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.lock().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, String>> {
        self.digests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Compute the hex blake3 digest of a file's full contents.
///
/// Empty files are rejected: editors often truncate before writing, and an
/// empty intermediate state is not a meaningful change.
pub fn compute_file_checksum(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = fs.open_read(path)?;
    let mut buf = [0u8; 8192];
    let mut total = 0usize;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        total += n;
        hasher.update(&buf[..n]);
    }
    if total == 0 {
        bail!("file {:?} is empty", path);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
