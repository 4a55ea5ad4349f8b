//! Hosted cache provider backed by the CI runner's cache service.
//!
//! Uploads are staged to a local file first: the service needs the final size
//! before it commits an entry, and a file can be re-read if the blob upload is
//! retried. Entries cannot be listed or deleted through the service, so
//! retention is skipped for this provider.

mod client;
mod staging;

use crate::provider::{Artifact, ByteStream, ListingEntry, StorageProvider};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use client::{CacheServiceClient, Reply};
use sha2::{Digest, Sha256};
use staging::StagedFile;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use turbocache_core::{CACHE_VERSION, CacheKeyCodec, Error, HostedCacheSettings, Result};

pub(crate) const PROVIDER_NAME: &str = "github";

/// Longest key the service accepts.
pub const MAX_KEY_LENGTH: usize = 512;

/// Saves artifacts to the hosted cache service.
#[derive(Debug, Clone)]
pub struct HostedCacheProvider {
    client: CacheServiceClient,
    codec: CacheKeyCodec,
    staging_dir: PathBuf,
}

impl HostedCacheProvider {
    /// Create a provider for the service described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new(
        settings: &HostedCacheSettings,
        codec: CacheKeyCodec,
        staging_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::with_retry(settings, codec, staging_dir, RetryConfig::default())
    }

    /// Like [`HostedCacheProvider::new`] with explicit retry tuning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn with_retry(
        settings: &HostedCacheSettings,
        codec: CacheKeyCodec,
        staging_dir: impl Into<PathBuf>,
        retry: RetryConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("turbocache/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: CacheServiceClient::new(
                http,
                &settings.service_url,
                settings.runtime_token.clone(),
                cache_version(),
                retry,
            ),
            codec,
            staging_dir: staging_dir.into(),
        })
    }
}

/// Digest every entry written by this daemon is scoped to.
fn cache_version() -> String {
    hex::encode(Sha256::digest(CACHE_VERSION.as_bytes()))
}

/// Reject keys the service would refuse.
pub fn validate_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_LENGTH {
        return Err(Error::invalid_key(
            key,
            format!("key is longer than {MAX_KEY_LENGTH} characters"),
        ));
    }
    if key.contains(',') {
        return Err(Error::invalid_key(key, "key cannot contain commas"));
    }
    Ok(())
}

#[async_trait]
impl StorageProvider for HostedCacheProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn entry_path(&self, hash: &str, tag: Option<&str>) -> String {
        self.codec.build_key(hash, tag)
    }

    async fn save(&self, hash: &str, tag: Option<&str>, body: ByteStream) -> Result<()> {
        let key = self.codec.build_key(hash, tag);
        validate_key(&key)?;

        let staged = StagedFile::create(&self.staging_dir).await?;
        let size = staged.fill(body).await?;

        let upload_url = match self.client.reserve(&key).await? {
            Reply::Ok(url) => url,
            Reply::Declined => {
                info!(key = %key, "Cache entry already exists, skipping save");
                return Ok(());
            }
        };
        self.client.upload(&upload_url, staged.path(), size).await?;
        self.client.commit(&key, size).await?;

        info!(key = %key, hash, size, "Saved artifact to hosted cache");
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<Artifact>> {
        let key = self.codec.build_key(hash, None);
        validate_key(&key)?;

        let hit = match self.client.lookup(&key).await? {
            Reply::Ok(hit) => hit,
            Reply::Declined => {
                debug!(key = %key, "Cache lookup did not return data");
                return Ok(None);
            }
        };
        let Some(tag) = self.codec.match_hash(&hit.matched_key, hash) else {
            info!(key = %key, matched = %hit.matched_key, "Cache key mismatch, treating as miss");
            return Ok(None);
        };

        let Some((size, body)) = self.client.download(&hit.download_url).await? else {
            debug!(key = %key, "Signed download URL returned 404");
            return Ok(None);
        };
        Ok(Some(Artifact { size, tag, body }))
    }

    async fn delete(&self, _path: &str) -> Result<()> {
        Err(Error::unsupported(PROVIDER_NAME, "delete"))
    }

    async fn list(&self) -> Result<Vec<ListingEntry>> {
        Err(Error::unsupported(PROVIDER_NAME, "list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_length() {
        assert!(validate_key(&"a".repeat(MAX_KEY_LENGTH)).is_ok());
        let err = validate_key(&"a".repeat(MAX_KEY_LENGTH + 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
    }

    #[test]
    fn test_validate_key_commas() {
        assert!(validate_key("turbogha_abc#tag").is_ok());
        let err = validate_key("turbogha_abc#a,b").unwrap_err();
        assert!(err.to_string().contains("commas"));
    }

    #[test]
    fn test_cache_version_is_stable_hex() {
        let version = cache_version();
        assert_eq!(version.len(), 64);
        assert_eq!(version, cache_version());
    }
}
