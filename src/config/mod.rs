// src/config/mod.rs

//! Configuration loading and validation for devmon.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and the resolved [`Settings`]
//!   (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Resolve paths and check invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_from_path, load_raw, load_settings};
pub use model::{
    RawConfigFile, ReloadSettings, Settings, SyncSettings, WatchSettings,
};
pub use validate::{resolve_settings, validate_settings};
