//! The storage provider contract shared by every backend.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::io;
use std::pin::Pin;
use turbocache_core::Result;

/// Artifact bytes flowing in or out of a provider.
///
/// Backpressure comes from the consumer: nothing is read from the source
/// until the stream is polled.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Wrap an in-memory payload as a [`ByteStream`].
#[must_use]
pub fn byte_stream_from(bytes: impl Into<Bytes>) -> ByteStream {
    let bytes: Bytes = bytes.into();
    Box::pin(stream::once(async move { Ok(bytes) }))
}

/// Drain a [`ByteStream`] into memory.
///
/// Only for small payloads such as the ping self-test.
///
/// # Errors
///
/// Returns the first error the stream yields.
pub async fn collect_bytes(mut body: ByteStream) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

/// A stored artifact returned by [`StorageProvider::get`].
pub struct Artifact {
    /// Payload size, when the backend reports it
    pub size: Option<u64>,
    /// Tag recovered from the stored key, when the backend keeps one
    pub tag: Option<String>,
    /// Lazily-read payload
    pub body: ByteStream,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("size", &self.size)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Backend-reported metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    /// Full path or key, accepted by [`StorageProvider::delete`]
    pub path: String,
    /// When the object was written
    pub created_at: DateTime<Utc>,
    /// Stored size in bytes
    pub size: u64,
}

/// A place artifacts can be saved to and restored from.
///
/// Implementations are shared across concurrent requests and must not hold
/// per-request state. Request context travels in the current `tracing` span.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// The path [`StorageProvider::delete`] accepts for what
    /// `save(hash, tag)` writes.
    fn entry_path(&self, hash: &str, tag: Option<&str>) -> String;

    /// Persist the whole of `body` under the key for `hash` and `tag`.
    async fn save(&self, hash: &str, tag: Option<&str>, body: ByteStream) -> Result<()>;

    /// Look up the artifact stored for `hash`; `Ok(None)` when there is none.
    async fn get(&self, hash: &str) -> Result<Option<Artifact>>;

    /// Remove one object by the path reported in a [`ListingEntry`].
    async fn delete(&self, path: &str) -> Result<()>;

    /// Enumerate every object under the active prefix.
    async fn list(&self) -> Result<Vec<ListingEntry>>;
}
