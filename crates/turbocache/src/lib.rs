//! turbocache: a local Turborepo remote cache daemon
//!
//! The binary's building blocks, exposed as a library so they can be
//! exercised in tests:
//! - [`cli`]: argument parsing and error-to-exit-code mapping
//! - [`tracing`]: subscriber setup
//! - [`providers`]: picks the storage backend from the settings
//! - [`server`]: the HTTP protocol handler
//! - [`daemon`]: launching, probing and stopping the background daemon

pub mod cli;
pub mod daemon;
pub mod providers;
pub mod server;
pub mod tracing;

pub use turbocache_core::{Error, Result};
