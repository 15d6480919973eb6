// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Deciding which paths matter ([`filter`]).
//! - Remembering file content digests ([`checksum`]).
//! - Wiring up a cross-platform filesystem watcher (`notify`) and batching
//!   its events ([`batcher`]).
//! - Keeping per-directory watch registrations in sync with the tree and
//!   turning batches into change notifications ([`detector`]).
//!
//! It does **not** know about building or running anything; it only emits
//! [`ChangeNotification`](crate::types::ChangeNotification)s.

pub mod batcher;
pub mod checksum;
pub mod detector;
pub mod filter;
pub mod notification;
pub mod path_utils;
pub mod registry;

pub use batcher::{Batches, EventBatcher, WatchSubscription};
pub use checksum::{compute_file_checksum, ChecksumStore};
pub use detector::Detector;
pub use filter::Filter;
pub use notification::Notifier;
pub use registry::WatchRegistry;
