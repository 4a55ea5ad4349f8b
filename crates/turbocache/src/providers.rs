//! Provider factory.
//!
//! The provider is chosen once per process from [`Settings`] and wrapped in
//! a [`TimedProvider`] so every call feeds the shared latency tracker.

use std::sync::Arc;
use tracing::info;
use turbocache_aws::ObjectStoreProvider;
use turbocache_core::{CacheKeyCodec, Error, LatencyTracker, ProviderKind, Result, Settings};
use turbocache_storage::{FilesystemProvider, HostedCacheProvider, StorageProvider, TimedProvider};

/// Build the configured provider.
///
/// The hosted cache needs the runner's service URL and token; without them
/// the daemon falls back to the local filesystem so it still works outside
/// CI.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when the object store was selected
/// without its settings, or when a client cannot be constructed.
pub async fn build_provider(
    settings: &Settings,
    tracker: Arc<LatencyTracker>,
) -> Result<Arc<dyn StorageProvider>> {
    let codec = CacheKeyCodec::new(settings.cache_prefix.clone());

    let provider: Arc<dyn StorageProvider> = match settings.provider {
        ProviderKind::HostedCache => match &settings.hosted {
            Some(hosted) => {
                info!("Using the hosted cache service");
                Arc::new(TimedProvider::new(
                    HostedCacheProvider::new(hosted, codec, &settings.paths.staging_dir)?,
                    tracker,
                ))
            }
            None => {
                info!(
                    dir = %settings.paths.filesystem_dir.display(),
                    "Hosted cache credentials not found, using the local filesystem"
                );
                filesystem(settings, tracker)
            }
        },
        ProviderKind::ObjectStore => {
            let object_store = settings.object_store.as_ref().ok_or_else(|| {
                Error::configuration("S3 provider selected without S3 settings")
            })?;
            info!(
                bucket = %object_store.bucket,
                prefix = %object_store.prefix,
                "Using the S3 object store"
            );
            Arc::new(TimedProvider::new(
                ObjectStoreProvider::new(object_store, codec).await,
                tracker,
            ))
        }
        ProviderKind::Filesystem => {
            info!(dir = %settings.paths.filesystem_dir.display(), "Using the local filesystem");
            filesystem(settings, tracker)
        }
    };
    Ok(provider)
}

fn filesystem(settings: &Settings, tracker: Arc<LatencyTracker>) -> Arc<dyn StorageProvider> {
    Arc::new(TimedProvider::new(
        FilesystemProvider::new(&settings.paths.filesystem_dir),
        tracker,
    ))
}
