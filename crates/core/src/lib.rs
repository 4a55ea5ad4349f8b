//! Core types for turbocache
//!
//! This crate holds what every other turbocache crate shares:
//! - the [`Error`] type and [`Result`] alias
//! - the cache key codec ([`key`])
//! - the per-operation latency tracker ([`tracker`])
//! - settings resolved from the environment ([`config`]) and the retention
//!   budgets they carry ([`budget`])
//! - well-known paths ([`paths`])

mod error;

pub mod budget;
pub mod config;
pub mod key;
pub mod paths;
pub mod tracker;

pub use budget::RetentionPolicy;
pub use config::{HostedCacheSettings, ObjectStoreSettings, ProviderKind, Settings};
pub use error::{Error, Result};
pub use key::CacheKeyCodec;
pub use paths::Paths;
pub use tracker::{LatencySummary, LatencyTracker, Operation};

/// Port the daemon listens on.
pub const SERVER_PORT: u16 = 41230;

/// Prefix prepended to cache keys unless `cache-prefix` is set.
pub const DEFAULT_CACHE_PREFIX: &str = "turbogha_";

/// Object store key prefix unless `s3-prefix` is set.
pub const DEFAULT_S3_PREFIX: &str = "turbogha/";

/// Object store endpoint unless one is configured.
pub const DEFAULT_S3_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Version string hosted cache entries are scoped to.
pub const CACHE_VERSION: &str = "turbogha_v2";
