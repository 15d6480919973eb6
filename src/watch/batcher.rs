// src/watch/batcher.rs

//! Fixed-interval coalescing of raw `notify` events.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{DevmonError, Result};

/// Per-directory watch registration.
///
/// The detector only needs add/remove, which lets tests swap in a recorder.
pub trait WatchSubscription: Send + Sync + fmt::Debug {
    fn add(&self, dir: &Path) -> Result<()>;
    fn remove(&self, dir: &Path) -> Result<()>;
}

/// Receiving side of an [`EventBatcher`].
///
/// One message per non-empty window on each channel.
#[derive(Debug)]
pub struct Batches {
    pub events: mpsc::UnboundedReceiver<Vec<Event>>,
    pub errors: mpsc::UnboundedReceiver<Vec<notify::Error>>,
}

enum RawEvent {
    Event(Event),
    Error(notify::Error),
}

/// Owns the OS watcher and flushes accumulated events every `interval`.
///
/// Must be created inside a tokio runtime.
pub struct EventBatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    cancel: CancellationToken,
}

impl fmt::Debug for EventBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBatcher")
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}

impl EventBatcher {
    pub fn new(interval: Duration) -> Result<(Self, Batches)> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawEvent>();

        // Called synchronously on notify's own thread.
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let raw = match res {
                    Ok(event) => RawEvent::Event(event),
                    Err(err) => RawEvent::Error(err),
                };
                // Receiver is gone once the batcher is closed.
                let _ = raw_tx.send(raw);
            },
            Config::default(),
        )?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(flush_loop(
            interval,
            raw_rx,
            events_tx,
            errors_tx,
            cancel.clone(),
        ));

        let batcher = Self {
            watcher: Mutex::new(Some(watcher)),
            cancel,
        };
        let batches = Batches {
            events: events_rx,
            errors: errors_rx,
        };
        Ok((batcher, batches))
    }

    /// Stop watching and end the flush loop. Later calls are no-ops.
    pub fn close(&self) {
        let watcher = self.lock().take();
        if watcher.is_some() {
            self.cancel.cancel();
            debug!(target: "detection", "event batcher closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, Option<RecommendedWatcher>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WatchSubscription for EventBatcher {
    fn add(&self, dir: &Path) -> Result<()> {
        match self.lock().as_mut() {
            Some(watcher) => Ok(watcher.watch(dir, RecursiveMode::NonRecursive)?),
            None => Err(DevmonError::Watch(notify::Error::generic(
                "event batcher is closed",
            ))),
        }
    }

    fn remove(&self, dir: &Path) -> Result<()> {
        match self.lock().as_mut() {
            Some(watcher) => Ok(watcher.unwatch(dir)?),
            None => Ok(()),
        }
    }
}

impl Drop for EventBatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn flush_loop(
    interval: Duration,
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    events_tx: mpsc::UnboundedSender<Vec<Event>>,
    errors_tx: mpsc::UnboundedSender<Vec<notify::Error>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut events: Vec<Event> = Vec::new();
    let mut errors: Vec<notify::Error> = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                if !events.is_empty() && events_tx.send(std::mem::take(&mut events)).is_err() {
                    break;
                }
                if !errors.is_empty() {
                    let _ = errors_tx.send(std::mem::take(&mut errors));
                }
            }

            raw = raw_rx.recv() => match raw {
                Some(RawEvent::Event(event)) => events.push(event),
                Some(RawEvent::Error(err)) => errors.push(err),
                None => break,
            }
        }
    }

    debug!(target: "detection", "batch flush loop finished");
}
