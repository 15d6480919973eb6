#![allow(dead_code)]

pub use devmon_test_utils::builders;
pub use devmon_test_utils::fakes;
pub use devmon_test_utils::{init_tracing, with_timeout};

use std::path::{Path, PathBuf};
use std::time::Duration;

use devmon::types::ChangeNotification;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

/// Canonical form of a temp dir, matching what the watcher reports.
pub fn canonical_root(dir: &Path) -> PathBuf {
    dir.canonicalize().expect("temp dir should canonicalize")
}

/// Wait up to `within` for the next notification with `changed == true`,
/// skipping no-change acknowledgments.
pub async fn next_change(
    rx: &mut mpsc::UnboundedReceiver<ChangeNotification>,
    within: Duration,
) -> Option<ChangeNotification> {
    let deadline = Instant::now() + within;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, rx.recv()).await {
            Ok(Some(n)) if n.changed => return Some(n),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}

/// Collect every change notification arriving within `window`.
pub async fn changes_within(
    rx: &mut mpsc::UnboundedReceiver<ChangeNotification>,
    window: Duration,
) -> Vec<ChangeNotification> {
    let mut out = Vec::new();
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match next_change(rx, remaining).await {
            Some(n) => out.push(n),
            None => break,
        }
    }
    out
}
