//! Filesystem provider: one `<hash>.bin` file per artifact in a local directory.
//!
//! Tags are not retained. Writes land in a `.part` file that is renamed into
//! place once the whole body arrived, so readers never see half an artifact.

use crate::provider::{Artifact, ByteStream, ListingEntry, StorageProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use turbocache_core::{Error, Result};

const EXTENSION: &str = "bin";

/// Stores artifacts as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct FilesystemProvider {
    root: PathBuf,
}

impl FilesystemProvider {
    /// Create a provider rooted at `root`; the directory is created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the artifact files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the artifact for `hash`.
    #[must_use]
    pub fn artifact_path(&self, hash: &str) -> PathBuf {
        self.root.join(format!("{hash}.{EXTENSION}"))
    }

    async fn write_part(part: &Path, mut body: ByteStream) -> Result<()> {
        let mut file = fs::File::create(part)
            .await
            .map_err(|e| Error::io(e, part, "create"))?;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::io_no_path(e, "read request body"))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, part, "write"))?;
        }
        file.flush().await.map_err(|e| Error::io(e, part, "flush"))?;
        Ok(())
    }
}

/// Reject hashes that would escape the root directory.
fn check_hash(hash: &str) -> Result<()> {
    if hash.is_empty() || hash.contains(['/', '\\']) || hash == "." || hash == ".." {
        return Err(Error::invalid_key(hash, "hash must be a single path segment"));
    }
    Ok(())
}

#[async_trait]
impl StorageProvider for FilesystemProvider {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn entry_path(&self, hash: &str, _tag: Option<&str>) -> String {
        self.artifact_path(hash).to_string_lossy().into_owned()
    }

    async fn save(&self, hash: &str, _tag: Option<&str>, body: ByteStream) -> Result<()> {
        check_hash(hash)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::io(e, &self.root, "create directory"))?;

        let target = self.artifact_path(hash);
        let part = self
            .root
            .join(format!("{hash}.{EXTENSION}.{}.part", uuid::Uuid::new_v4()));

        if let Err(err) = Self::write_part(&part, body).await {
            if let Err(cleanup) = fs::remove_file(&part).await {
                warn!(path = %part.display(), error = %cleanup, "Failed to remove partial upload");
            }
            return Err(err);
        }
        fs::rename(&part, &target)
            .await
            .map_err(|e| Error::io(e, &target, "rename"))?;

        info!(hash, path = %target.display(), "Saved artifact to filesystem");
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<Artifact>> {
        check_hash(hash)?;
        let path = self.artifact_path(hash);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(hash, "Artifact not on filesystem");
                return Ok(None);
            }
            Err(e) => return Err(Error::io(e, &path, "open")),
        };
        let size = file
            .metadata()
            .await
            .map_err(|e| Error::io(e, &path, "stat"))?
            .len();

        Ok(Some(Artifact {
            size: Some(size),
            tag: None,
            body: Box::pin(ReaderStream::new(file)),
        }))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = Path::new(path);
        if target.file_name().is_none() || target.parent() != Some(self.root.as_path()) {
            return Err(Error::invalid_key(
                path,
                "path is not an artifact in the cache directory",
            ));
        }
        fs::remove_file(target)
            .await
            .map_err(|e| Error::io(e, path, "remove"))
    }

    async fn list(&self) -> Result<Vec<ListingEntry>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(e, &self.root, "read directory")),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Error::io(e, &self.root, "read directory"))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| Error::io(e, &path, "stat"))?;
            if !metadata.is_file() {
                continue;
            }
            let written = metadata
                .modified()
                .map_err(|e| Error::io(e, &path, "read modification time"))?;
            entries.push(ListingEntry {
                path: path.to_string_lossy().into_owned(),
                created_at: DateTime::<Utc>::from(written),
                size: metadata.len(),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{byte_stream_from, collect_bytes};
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    fn provider() -> (TempDir, FilesystemProvider) {
        let dir = TempDir::new().unwrap();
        let provider = FilesystemProvider::new(dir.path().join("cache"));
        (dir, provider)
    }

    #[tokio::test]
    async fn test_save_then_get_round_trips_bytes() {
        let (_dir, provider) = provider();
        provider
            .save("abc123", Some("build1"), byte_stream_from(&b"0123456789"[..]))
            .await
            .unwrap();

        let artifact = provider.get("abc123").await.unwrap().unwrap();
        assert_eq!(artifact.size, Some(10));
        assert_eq!(artifact.tag, None);
        assert_eq!(collect_bytes(artifact.body).await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_get_unknown_hash_is_none() {
        let (_dir, provider) = provider();
        assert!(provider.get("doesnotexist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_nothing_behind() {
        let (_dir, provider) = provider();
        let body: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"half")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "gone")),
        ]));
        assert!(provider.save("abc", None, body).await.is_err());
        assert!(provider.get("abc").await.unwrap().is_none());
        assert!(provider.list().await.unwrap().is_empty());
        let leftovers = std::fs::read_dir(provider.root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (_dir, provider) = provider();
        provider.save("one", None, byte_stream_from(&b"1"[..])).await.unwrap();
        provider.save("two", None, byte_stream_from(&b"22"[..])).await.unwrap();
        std::fs::write(provider.root().join("notes.txt"), "ignored").unwrap();

        let mut entries = provider.list().await.unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].size, 1);
        assert!(entries[0].path.ends_with("one.bin"));

        provider.delete(&entries[0].path).await.unwrap();
        assert!(provider.get("one").await.unwrap().is_none());
        assert!(provider.get("two").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let (_dir, provider) = provider();
        assert!(provider.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, provider) = provider();
        let err = provider
            .save("../escape", None, byte_stream_from(&b"x"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_file_errors() {
        let (_dir, provider) = provider();
        let missing = provider.artifact_path("nope");
        assert!(provider.delete(&missing.to_string_lossy()).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_outside_root_rejected() {
        let (dir, provider) = provider();
        let outside = dir.path().join("keep.bin");
        std::fs::write(&outside, "precious").unwrap();
        let sneaky = provider.root().join("..").join("keep.bin");

        for path in [outside.clone(), sneaky, provider.root().join("..")] {
            let err = provider.delete(&path.to_string_lossy()).await.unwrap_err();
            assert!(matches!(err, Error::InvalidKey { .. }));
        }
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn test_entry_path_is_deletable() {
        let (_dir, provider) = provider();
        provider.save("abc", Some("t"), byte_stream_from(&b"x"[..])).await.unwrap();
        provider.delete(&provider.entry_path("abc", Some("t"))).await.unwrap();
        assert!(provider.get("abc").await.unwrap().is_none());
    }
}
