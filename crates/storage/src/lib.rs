//! Storage providers for turbocache
//!
//! Every backend implements [`StorageProvider`]:
//! - [`FilesystemProvider`]: `<hash>.bin` files in a local directory
//! - [`HostedCacheProvider`]: the CI runner's hosted cache service
//! - the S3-compatible provider lives in `turbocache-aws`
//!
//! [`TimedProvider`] wraps any of them to feed the latency tracker, and the
//! [`retention`] module evicts old artifacts from providers that can list
//! what they store.

#![expect(
    clippy::missing_errors_doc,
    reason = "Provider errors are documented on the trait and the error enum"
)]

pub mod filesystem;
pub mod hosted;
pub mod provider;
pub mod retention;
pub mod retry;
pub mod timed;

pub use filesystem::FilesystemProvider;
pub use hosted::HostedCacheProvider;
pub use provider::{
    Artifact, ByteStream, ListingEntry, StorageProvider, byte_stream_from, collect_bytes,
};
pub use retention::{RetentionDecision, RetentionReason, RetentionReport};
pub use retry::RetryConfig;
pub use timed::TimedProvider;
