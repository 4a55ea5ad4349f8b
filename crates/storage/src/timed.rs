//! Latency-recording decorator for any provider.

use crate::provider::{Artifact, ByteStream, ListingEntry, StorageProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use turbocache_core::{LatencyTracker, Operation, Result};

/// Wraps a provider and adds every call's elapsed time to a shared tracker.
///
/// For `get` only the lookup is timed; streaming the body happens after the
/// call returns.
pub struct TimedProvider<P> {
    inner: P,
    tracker: Arc<LatencyTracker>,
}

impl<P> TimedProvider<P> {
    /// Wrap `inner`, recording into `tracker`.
    pub const fn new(inner: P, tracker: Arc<LatencyTracker>) -> Self {
        Self { inner, tracker }
    }

    /// The wrapped provider.
    pub const fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: StorageProvider> StorageProvider for TimedProvider<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn entry_path(&self, hash: &str, tag: Option<&str>) -> String {
        self.inner.entry_path(hash, tag)
    }

    async fn save(&self, hash: &str, tag: Option<&str>, body: ByteStream) -> Result<()> {
        let timer = self.tracker.start(Operation::Save);
        let result = self.inner.save(hash, tag, body).await;
        let elapsed = timer.finish();
        debug!(provider = self.name(), hash, elapsed_ms = elapsed.as_millis(), "save finished");
        result
    }

    async fn get(&self, hash: &str) -> Result<Option<Artifact>> {
        let timer = self.tracker.start(Operation::Get);
        let result = self.inner.get(hash).await;
        let elapsed = timer.finish();
        debug!(provider = self.name(), hash, elapsed_ms = elapsed.as_millis(), "get finished");
        result
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let timer = self.tracker.start(Operation::Delete);
        let result = self.inner.delete(path).await;
        let elapsed = timer.finish();
        debug!(provider = self.name(), path, elapsed_ms = elapsed.as_millis(), "delete finished");
        result
    }

    async fn list(&self) -> Result<Vec<ListingEntry>> {
        let timer = self.tracker.start(Operation::List);
        let result = self.inner.list().await;
        let elapsed = timer.finish();
        debug!(provider = self.name(), elapsed_ms = elapsed.as_millis(), "list finished");
        result
    }
}

#[async_trait]
impl StorageProvider for Arc<dyn StorageProvider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn entry_path(&self, hash: &str, tag: Option<&str>) -> String {
        (**self).entry_path(hash, tag)
    }

    async fn save(&self, hash: &str, tag: Option<&str>, body: ByteStream) -> Result<()> {
        (**self).save(hash, tag, body).await
    }

    async fn get(&self, hash: &str) -> Result<Option<Artifact>> {
        (**self).get(hash).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        (**self).delete(path).await
    }

    async fn list(&self) -> Result<Vec<ListingEntry>> {
        (**self).list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::FilesystemProvider;
    use crate::provider::byte_stream_from;

    #[tokio::test]
    async fn test_every_call_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(LatencyTracker::new());
        let provider = TimedProvider::new(FilesystemProvider::new(dir.path()), Arc::clone(&tracker));

        provider.save("h", None, byte_stream_from(&b"x"[..])).await.unwrap();
        let _ = provider.get("h").await.unwrap();
        let _ = provider.get("missing").await.unwrap();
        let entries = provider.list().await.unwrap();
        provider.delete(&entries[0].path).await.unwrap();

        let calls: Vec<u64> = tracker.summary().entries.iter().map(|e| e.calls).collect();
        assert_eq!(calls, vec![1, 2, 1, 1]);
    }

    #[tokio::test]
    async fn test_failed_calls_are_still_timed() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(LatencyTracker::new());
        let provider = TimedProvider::new(FilesystemProvider::new(dir.path()), Arc::clone(&tracker));

        assert!(provider.delete("/definitely/not/here.bin").await.is_err());
        assert_eq!(tracker.summary().entries[2].calls, 1);
    }
}
