//! Recording stand-ins for the components the engine drives.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devmon::engine::{ReloadBackend, SyncBackend};
use devmon::errors::{DevmonError, Result};
use devmon::watch::WatchSubscription;

/// Counts reloads and reports a fixed launch outcome.
#[derive(Debug, Clone)]
pub struct FakeReloader {
    calls: Arc<AtomicUsize>,
    launches: bool,
    delay: Duration,
}

impl FakeReloader {
    pub fn launching() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            launches: true,
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            launches: false,
            ..Self::launching()
        }
    }

    /// Take `delay` before resolving each reload.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReloadBackend for FakeReloader {
    fn reload(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.launches
        })
    }
}

/// Counts sync broadcasts.
#[derive(Debug, Clone, Default)]
pub struct RecordingSync {
    calls: Arc<AtomicUsize>,
}

impl RecordingSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SyncBackend for RecordingSync {
    fn sync(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionCall {
    Add(PathBuf),
    Remove(PathBuf),
}

/// Records add/remove calls; optionally refuses some directories.
#[derive(Debug, Clone, Default)]
pub struct RecordingSubscription {
    calls: Arc<Mutex<Vec<SubscriptionCall>>>,
    refuse: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `add` fail for `dir`.
    pub fn refuse(&self, dir: impl AsRef<Path>) {
        self.refuse.lock().unwrap().push(dir.as_ref().to_path_buf());
    }

    pub fn calls(&self) -> Vec<SubscriptionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn added(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SubscriptionCall::Add(p) => Some(p),
                SubscriptionCall::Remove(_) => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SubscriptionCall::Remove(p) => Some(p),
                SubscriptionCall::Add(_) => None,
            })
            .collect()
    }
}

impl WatchSubscription for RecordingSubscription {
    fn add(&self, dir: &Path) -> Result<()> {
        if self.refuse.lock().unwrap().iter().any(|d| d == dir) {
            return Err(DevmonError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("refusing to watch {}", dir.display()),
            )));
        }
        self.calls
            .lock()
            .unwrap()
            .push(SubscriptionCall::Add(dir.to_path_buf()));
        Ok(())
    }

    fn remove(&self, dir: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(SubscriptionCall::Remove(dir.to_path_buf()));
        Ok(())
    }
}
