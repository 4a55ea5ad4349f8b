//! Uniquely named temp files that are removed when dropped.

use crate::provider::ByteStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use turbocache_core::{Error, Result};

/// RAII guard that removes the staged file on drop, whatever the outcome.
#[derive(Debug)]
pub(crate) struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Reserve a fresh name under `dir`, creating the directory if needed.
    pub(crate) async fn create(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io(e, dir, "create staging directory"))?;
        Ok(Self {
            path: dir.join(format!("upload-{}.bin", uuid::Uuid::new_v4())),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole stream to the staged file, returning the byte count.
    pub(crate) async fn fill(&self, mut body: ByteStream) -> Result<u64> {
        let mut file = tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| Error::io(e, &self.path, "create"))?;
        let mut written = 0_u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::io_no_path(e, "read request body"))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, &self.path, "write"))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| Error::io(e, &self.path, "flush"))?;
        Ok(written)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload"),
        }
    }
}
