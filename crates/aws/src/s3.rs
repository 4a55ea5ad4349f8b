//! S3-compatible object store provider.
//!
//! Objects live under `<s3 prefix><cache key>` in one bucket. Uploads of up
//! to one part go out as a single `PutObject`; anything larger is sent as a
//! multipart upload that is aborted if any step fails.

use crate::parts::{PART_SIZE, PartReader};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Object};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::fmt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use turbocache_core::{CacheKeyCodec, DEFAULT_S3_ENDPOINT, Error, ObjectStoreSettings, Result};
use turbocache_storage::{Artifact, ByteStream, ListingEntry, StorageProvider};

/// Name used in logs and errors.
pub const PROVIDER_NAME: &str = "s3";

const LIST_PAGE_SIZE: i32 = 1000;
const CONTENT_TYPE: &str = "application/octet-stream";

/// Stores artifacts as objects in an S3-compatible bucket.
pub struct ObjectStoreProvider {
    client: Client,
    bucket: String,
    prefix: String,
    codec: CacheKeyCodec,
}

impl fmt::Debug for ObjectStoreProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreProvider")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl ObjectStoreProvider {
    /// Build a client from explicit credentials.
    ///
    /// A non-default endpoint (`MinIO`, R2, a local mock) is addressed
    /// path-style; the default endpoint is left to the SDK's regional
    /// resolution.
    pub async fn new(settings: &ObjectStoreSettings, codec: CacheKeyCodec) -> Self {
        let credentials = Credentials::new(
            &settings.access_key_id,
            settings.secret_access_key.expose_secret(),
            settings
                .session_token
                .as_ref()
                .map(|token| token.expose_secret().to_string()),
            None,
            "turbocache",
        );
        let custom_endpoint = settings.endpoint != DEFAULT_S3_ENDPOINT;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials);
        if custom_endpoint {
            loader = loader.endpoint_url(&settings.endpoint);
        }
        let sdk_config = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(custom_endpoint)
            .build();

        Self::from_client(
            Client::from_conf(config),
            &settings.bucket,
            &settings.prefix,
            codec,
        )
    }

    /// Wrap an already configured client.
    pub fn from_client(
        client: Client,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        codec: CacheKeyCodec,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            codec,
        }
    }

    /// Full object key for an artifact.
    #[must_use]
    pub fn object_key(&self, hash: &str, tag: Option<&str>) -> String {
        format!("{}{}", self.prefix, self.codec.build_key(hash, tag))
    }

    async fn list_under(&self, prefix: &str) -> Result<Vec<ListingEntry>> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .max_keys(LIST_PAGE_SIZE)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| sdk_error("list", &e))?;
            entries.extend(page.contents().iter().filter_map(listing_entry));
            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(entries)
    }

    async fn put_single(&self, key: &str, body: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(S3ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error("save", &e))?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str, first: Bytes, parts: PartReader) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| sdk_error("create multipart upload", &e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                Error::backend(
                    PROVIDER_NAME,
                    "create multipart upload",
                    "response carried no upload id",
                    None,
                )
            })?
            .to_string();

        let result = self.upload_parts(key, &upload_id, first, parts).await;
        if result.is_err()
            && let Err(abort) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
        {
            warn!(key, error = %DisplayErrorContext(&abort), "Failed to abort multipart upload");
        }
        result
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        mut parts: PartReader,
    ) -> Result<()> {
        let mut completed = Vec::new();
        let mut part_number = 1_i32;
        let mut next = Some(first);
        while let Some(part) = next {
            let size = part.len();
            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(S3ByteStream::from(part))
                .send()
                .await
                .map_err(|e| sdk_error("upload part", &e))?;
            completed.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_owned))
                    .part_number(part_number)
                    .build(),
            );
            debug!(key, part_number, size, "Uploaded part");
            part_number += 1;
            next = parts.next_part().await.map_err(read_error)?;
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error("complete multipart upload", &e))?;
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn entry_path(&self, hash: &str, tag: Option<&str>) -> String {
        self.object_key(hash, tag)
    }

    async fn save(&self, hash: &str, tag: Option<&str>, body: ByteStream) -> Result<()> {
        let key = self.object_key(hash, tag);
        let mut parts = PartReader::new(body, PART_SIZE);
        let first = parts.next_part().await.map_err(read_error)?.unwrap_or_default();
        if first.len() < PART_SIZE {
            self.put_single(&key, first).await?;
        } else {
            self.put_multipart(&key, first, parts).await?;
        }
        debug!(key = %key, "Stored object");
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<Artifact>> {
        let wanted = self.object_key(hash, None);
        let candidates = self.list_under(&wanted).await?;
        let Some((entry, tag)) = newest_match(&candidates, &self.prefix, &self.codec, hash) else {
            debug!(key = %wanted, candidates = candidates.len(), "No matching object");
            return Ok(None);
        };

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&entry.path)
            .send()
            .await
        {
            Ok(output) => output,
            // Deleted between listing and fetching
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Ok(None);
            }
            Err(err) => return Err(sdk_error("get", &err)),
        };

        let size = output
            .content_length()
            .and_then(|len| u64::try_from(len).ok());
        let body: ByteStream = Box::pin(ReaderStream::new(output.body.into_async_read()));
        Ok(Some(Artifact { size, tag, body }))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| sdk_error("delete", &e))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ListingEntry>> {
        self.list_under(&self.prefix).await
    }
}

/// The most recently written object whose key is exactly `prefix + hash`,
/// with its tag. Ties on modification time pick any of the tied objects.
fn newest_match<'a>(
    entries: &'a [ListingEntry],
    prefix: &str,
    codec: &CacheKeyCodec,
    hash: &str,
) -> Option<(&'a ListingEntry, Option<String>)> {
    entries
        .iter()
        .filter_map(|entry| {
            let key = entry.path.strip_prefix(prefix)?;
            codec.match_hash(key, hash).map(|tag| (entry, tag))
        })
        .max_by_key(|(entry, _)| entry.created_at)
}

fn listing_entry(object: &Object) -> Option<ListingEntry> {
    let path = object.key()?.to_string();
    // Without a timestamp the object is treated as fresh rather than evicted
    let created_at = object
        .last_modified()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_else(Utc::now);
    let size = object
        .size()
        .and_then(|s| u64::try_from(s).ok())
        .unwrap_or(0);
    Some(ListingEntry {
        path,
        created_at,
        size,
    })
}

fn sdk_error<E>(operation: &'static str, err: &SdkError<E>) -> Error
where
    E: std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    Error::backend(
        PROVIDER_NAME,
        operation,
        DisplayErrorContext(err).to_string(),
        status,
    )
}

fn read_error(err: std::io::Error) -> Error {
    Error::io_no_path(err, "read request body")
}
