// src/watch/detector.rs

//! Turns batches of raw filesystem events into change notifications.
//!
//! The detector owns watch registration: it registers every included
//! directory during the initial crawl, re-crawls directories as they are
//! created and unregisters them when they disappear. File events are checked
//! against the [`Filter`] and the [`ChecksumStore`] so that only real content
//! changes are reported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use anyhow::anyhow;
use notify::{Event, EventKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::{DevmonError, Result};
use crate::fs::FileSystem;
use crate::types::ChangeNotification;
use crate::watch::batcher::{Batches, WatchSubscription};
use crate::watch::checksum::{compute_file_checksum, ChecksumStore};
use crate::watch::filter::Filter;
use crate::watch::notification::Notifier;
use crate::watch::path_utils::{display_path, is_under_any};
use crate::watch::registry::WatchRegistry;

/// What an event means for one of its paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathOp {
    /// Path appeared (created or moved in).
    Appeared,
    /// File content was written.
    Written,
    /// Path disappeared (removed or moved away).
    Vanished,
    /// Anything else: metadata, reads, unknown.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrawlMode {
    /// Initial crawl: seed digests, report nothing.
    Baseline,
    /// Directory created at runtime: files found are candidate changes.
    Discover,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    saw_file: bool,
    changed: Vec<PathBuf>,
}

pub struct Detector {
    filter: Filter,
    checksums: Arc<ChecksumStore>,
    registry: Arc<WatchRegistry>,
    subscription: Arc<dyn WatchSubscription>,
    fs: Arc<dyn FileSystem>,
    notifier: Notifier,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("root", &self.filter.root())
            .field("watched_dirs", &self.registry.len())
            .finish()
    }
}

impl Detector {
    pub fn new(
        settings: &Settings,
        fs: Arc<dyn FileSystem>,
        subscription: Arc<dyn WatchSubscription>,
        notifier: Notifier,
    ) -> Self {
        Self {
            filter: Filter::new(settings),
            checksums: Arc::new(ChecksumStore::new()),
            registry: Arc::new(WatchRegistry::new()),
            subscription,
            fs,
            notifier,
        }
    }

    pub fn checksums(&self) -> &Arc<ChecksumStore> {
        &self.checksums
    }

    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.registry
    }

    /// Initial crawl of the watch root.
    ///
    /// Registers every included directory and records a baseline digest for
    /// every watchable file. Nothing is reported.
    pub fn observe(&self) {
        let root = self.filter.root().to_path_buf();
        let mut outcome = BatchOutcome::default();
        self.crawl(&root, CrawlMode::Baseline, &mut outcome);
        info!(
            target: "detection",
            dirs = self.registry.len(),
            files = self.checksums.len(),
            "watching {}",
            root.display()
        );
    }

    /// Evaluate one batch and emit at most one notification.
    ///
    /// Returns the emitted notification, or `None` when the batch held only
    /// directory events.
    pub fn handle_batch(&self, events: &[Event]) -> Option<ChangeNotification> {
        let mut removed_dirs: Vec<PathBuf> = Vec::new();
        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written: Vec<PathBuf> = Vec::new();
        let mut outcome = BatchOutcome::default();

        for event in events {
            for (index, path) in event.paths.iter().enumerate() {
                let op = self.classify(&event.kind, index, path);
                if self.is_dir_event(&event.kind, op, path) {
                    match op {
                        PathOp::Vanished if self.registry.contains(path) => {
                            removed_dirs.push(path.clone())
                        }
                        PathOp::Appeared => created_dirs.push(path.clone()),
                        _ => {}
                    }
                    continue;
                }

                outcome.saw_file = true;
                if matches!(op, PathOp::Appeared | PathOp::Written) && !written.contains(path) {
                    written.push(path.clone());
                }
            }
        }

        // Removals win over anything else that happened under them.
        for dir in &removed_dirs {
            self.unregister_tree(dir);
        }

        for dir in &created_dirs {
            if is_under_any(dir, &removed_dirs) {
                continue;
            }
            self.crawl(dir, CrawlMode::Discover, &mut outcome);
        }

        for path in &written {
            if is_under_any(path, &removed_dirs) {
                continue;
            }
            if self.filter.is_watch_relevant(path) && self.evaluate_file(path) {
                push_unique(&mut outcome.changed, path);
            }
        }

        if !outcome.saw_file {
            return None;
        }

        let notification = if outcome.changed.is_empty() {
            debug!(target: "detection", "batch contained no content changes");
            ChangeNotification::unchanged()
        } else {
            ChangeNotification::changed(outcome.changed)
        };
        self.notifier.notify(notification.clone());
        Some(notification)
    }

    /// [`observe`](Self::observe) on the blocking pool, so a large tree does
    /// not stall the runtime while it is crawled and hashed.
    pub async fn observe_blocking(self) -> Result<Self> {
        tokio::task::spawn_blocking(move || {
            self.observe();
            self
        })
        .await
        .map_err(|e| DevmonError::Other(anyhow!("initial crawl panicked: {e}")))
    }

    /// Consume batches until cancelled or the batcher goes away.
    ///
    /// Batches are evaluated one at a time on the blocking pool: reading and
    /// hashing files, crawling new directories and (un)registering watches
    /// are all blocking calls.
    pub fn spawn(self, mut batches: Batches, cancel: CancellationToken) -> JoinHandle<()> {
        let detector = Arc::new(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    batch = batches.events.recv() => match batch {
                        Some(events) => {
                            let this = Arc::clone(&detector);
                            let evaluated = tokio::task::spawn_blocking(move || {
                                this.handle_batch(&events);
                            });
                            if let Err(err) = evaluated.await {
                                warn!(target: "detection", error = %err, "batch evaluation failed");
                            }
                        }
                        None => break,
                    },

                    Some(errors) = batches.errors.recv() => {
                        let this = Arc::clone(&detector);
                        let handled = tokio::task::spawn_blocking(move || {
                            for err in errors {
                                this.handle_watch_error(err);
                            }
                        });
                        if let Err(err) = handled.await {
                            warn!(target: "detection", error = %err, "watch error handling failed");
                        }
                    }
                }
            }
            debug!(target: "detection", "detector loop finished");
        })
    }

    fn handle_watch_error(&self, err: notify::Error) {
        warn!(target: "detection", error = %err, "watch error");
        for path in &err.paths {
            if self.registry.contains(path) {
                self.unregister_tree(path);
            }
        }
    }

    fn classify(&self, kind: &EventKind, index: usize, path: &Path) -> PathOp {
        match kind {
            EventKind::Create(_) => PathOp::Appeared,
            EventKind::Remove(_) => PathOp::Vanished,
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::To => PathOp::Appeared,
                RenameMode::From => PathOp::Vanished,
                RenameMode::Both if index == 0 => PathOp::Vanished,
                RenameMode::Both => PathOp::Appeared,
                RenameMode::Any | RenameMode::Other => {
                    if self.fs.is_file(path) || self.fs.is_dir(path) {
                        PathOp::Appeared
                    } else {
                        PathOp::Vanished
                    }
                }
            },
            EventKind::Modify(ModifyKind::Metadata(_)) => PathOp::Other,
            EventKind::Modify(_) => PathOp::Written,
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => PathOp::Written,
            _ => PathOp::Other,
        }
    }

    fn is_dir_event(&self, kind: &EventKind, op: PathOp, path: &Path) -> bool {
        matches!(
            kind,
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
        ) || self.registry.contains(path)
            || (op != PathOp::Vanished && self.fs.is_dir(path))
    }

    /// Depth-first walk from `start`, skipping excluded subtrees.
    fn crawl(&self, start: &Path, mode: CrawlMode, outcome: &mut BatchOutcome) {
        let mut stack = vec![start.to_path_buf()];

        while let Some(dir) = stack.pop() {
            if self.filter.is_excluded_dir(&dir) {
                debug!(target: "detection", "skipping {}", self.display(&dir));
                continue;
            }
            if self.filter.is_included_dir(&dir) {
                self.register(&dir);
            }

            let entries = match self.fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    // Removed mid-walk.
                    debug!(target: "detection", error = %err, "cannot read {}", self.display(&dir));
                    continue;
                }
            };

            for entry in entries {
                if self.fs.is_dir(&entry) {
                    stack.push(entry);
                    continue;
                }
                if !self.filter.is_watch_relevant(&entry) {
                    continue;
                }
                match mode {
                    CrawlMode::Baseline => self.seed_file(&entry),
                    CrawlMode::Discover => {
                        outcome.saw_file = true;
                        if self.evaluate_file(&entry) {
                            push_unique(&mut outcome.changed, &entry);
                        }
                    }
                }
            }
        }
    }

    fn register(&self, dir: &Path) {
        if !self.registry.insert(dir) {
            return;
        }
        match self.subscription.add(dir) {
            Ok(()) => debug!(target: "detection", "watching {}", self.display(dir)),
            Err(err) => {
                self.registry.remove(dir);
                warn!(target: "detection", error = %err, "cannot watch {}", self.display(dir));
            }
        }
    }

    fn unregister_tree(&self, dir: &Path) {
        for removed in self.registry.remove_tree(dir) {
            if let Err(err) = self.subscription.remove(&removed) {
                // The OS usually drops the watch together with the directory.
                debug!(target: "detection", error = %err, "unwatch {}", self.display(&removed));
            }
            debug!(target: "detection", "stopped watching {}", self.display(&removed));
        }
    }

    fn seed_file(&self, path: &Path) {
        if let Ok(digest) = compute_file_checksum(self.fs.as_ref(), path) {
            self.checksums.update_checksum(path, &digest);
        }
    }

    /// Returns true when the file's content differs from the stored digest.
    fn evaluate_file(&self, path: &Path) -> bool {
        let digest = match compute_file_checksum(self.fs.as_ref(), path) {
            Ok(digest) => digest,
            Err(err) => {
                debug!(target: "detection", error = %err, "no checksum for {}", self.display(path));
                return false;
            }
        };
        if !self.checksums.has_changed(path, &digest) {
            debug!(target: "detection", "{} unchanged", self.display(path));
            return false;
        }
        self.checksums.update_checksum(path, &digest);
        info!(target: "detection", "{} changed", self.display(path));
        true
    }

    fn display(&self, path: &Path) -> String {
        display_path(self.filter.root(), path)
    }
}

fn push_unique(paths: &mut Vec<PathBuf>, path: &Path) {
    if !paths.iter().any(|p| p == path) {
        paths.push(path.to_path_buf());
    }
}
