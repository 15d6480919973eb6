// src/sync/mod.rs

//! Browser refresh notifications over websockets.
//!
//! - [`hub`] owns the client registry and fans messages out.
//! - [`client`] runs the per-connection read and write pumps.
//! - [`server`] accepts connections on the sync route.

pub mod client;
pub mod hub;
pub mod server;

pub use client::KeepAlive;
pub use hub::Hub;
pub use server::{SyncServer, SYNC_MESSAGE, SYNC_ROUTE};
