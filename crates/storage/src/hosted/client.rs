//! HTTP client for the hosted cache service's Twirp API and its signed blob URLs.

use crate::provider::ByteStream;
use crate::retry::{RetryConfig, retry_with_backoff};
use futures::TryStreamExt;
use reqwest::{Response, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::debug;
use turbocache_core::{Error, Result};

use super::PROVIDER_NAME;

const SERVICE_PATH: &str = "twirp/github.actions.results.api.v1.CacheService";

/// Outcome of a service call that has an expected "no" answer.
#[derive(Debug)]
pub(crate) enum Reply<T> {
    Ok(T),
    /// Entry already exists (reserve) or does not exist (lookup)
    Declined,
}

#[derive(Debug, Serialize)]
struct CreateCacheEntryRequest<'a> {
    key: &'a str,
    version: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateCacheEntryResponse {
    ok: bool,
    #[serde(alias = "signedUploadUrl")]
    signed_upload_url: String,
}

#[derive(Debug, Serialize)]
struct FinalizeCacheEntryUploadRequest<'a> {
    key: &'a str,
    version: &'a str,
    size_bytes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FinalizeCacheEntryUploadResponse {
    ok: bool,
    #[serde(alias = "entryId")]
    entry_id: String,
}

#[derive(Debug, Serialize)]
struct GetCacheEntryDownloadUrlRequest<'a> {
    key: &'a str,
    restore_keys: Vec<&'a str>,
    version: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GetCacheEntryDownloadUrlResponse {
    ok: bool,
    #[serde(alias = "signedDownloadUrl")]
    signed_download_url: String,
    #[serde(alias = "matchedKey")]
    matched_key: String,
}

/// A cache entry located by [`CacheServiceClient::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheHit {
    pub download_url: String,
    pub matched_key: String,
}

/// Thin typed wrapper over the service endpoints.
#[derive(Debug, Clone)]
pub(crate) struct CacheServiceClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
    version: String,
    retry: RetryConfig,
}

impl CacheServiceClient {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: &str,
        token: SecretString,
        version: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            version: version.into(),
            retry,
        }
    }

    /// Reserve `key`; `Declined` when an entry already exists.
    pub(crate) async fn reserve(&self, key: &str) -> Result<Reply<String>> {
        let request = CreateCacheEntryRequest {
            key,
            version: &self.version,
        };
        let reply: Reply<CreateCacheEntryResponse> =
            self.call("CreateCacheEntry", "reserve", &request).await?;
        Ok(match reply {
            Reply::Ok(resp) if resp.ok && !resp.signed_upload_url.is_empty() => {
                Reply::Ok(resp.signed_upload_url)
            }
            _ => Reply::Declined,
        })
    }

    /// Stream the staged file at `path` to the signed upload URL.
    pub(crate) async fn upload(&self, url: &str, path: &Path, size: u64) -> Result<()> {
        retry_with_backoff(&self.retry, "upload", || async move {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| Error::io(e, path, "open staged upload"))?;
            let response = self
                .http
                .put(url)
                .header("x-ms-blob-type", "BlockBlob")
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_LENGTH, size)
                .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
                .send()
                .await
                .map_err(|e| transport_error("upload", &e))?;
            ensure_success("upload", response).await.map(|_| ())
        })
        .await
    }

    /// Commit a finished upload of `size` bytes.
    pub(crate) async fn commit(&self, key: &str, size: u64) -> Result<()> {
        let request = FinalizeCacheEntryUploadRequest {
            key,
            version: &self.version,
            size_bytes: size.to_string(),
        };
        match self
            .call::<_, FinalizeCacheEntryUploadResponse>(
                "FinalizeCacheEntryUpload",
                "commit",
                &request,
            )
            .await?
        {
            Reply::Ok(resp) if resp.ok => {
                debug!(key, entry_id = %resp.entry_id, "Committed cache entry");
                Ok(())
            }
            _ => Err(Error::backend(
                PROVIDER_NAME,
                "commit",
                format!("service refused to finalize {key}"),
                None,
            )),
        }
    }

    /// Find the newest entry whose key starts with `key`.
    pub(crate) async fn lookup(&self, key: &str) -> Result<Reply<CacheHit>> {
        let request = GetCacheEntryDownloadUrlRequest {
            key,
            restore_keys: vec![key],
            version: &self.version,
        };
        let reply: Reply<GetCacheEntryDownloadUrlResponse> = self
            .call("GetCacheEntryDownloadURL", "lookup", &request)
            .await?;
        Ok(match reply {
            Reply::Ok(resp) if resp.ok && !resp.signed_download_url.is_empty() => {
                Reply::Ok(CacheHit {
                    download_url: resp.signed_download_url,
                    matched_key: resp.matched_key,
                })
            }
            _ => Reply::Declined,
        })
    }

    /// Open the signed download URL as a stream.
    pub(crate) async fn download(&self, url: &str) -> Result<Option<(Option<u64>, ByteStream)>> {
        let response = retry_with_backoff(&self.retry, "download", || async move {
            self.http
                .get(url)
                .send()
                .await
                .map_err(|e| transport_error("download", &e))
        })
        .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success("download", response).await?;
        let size = response.content_length();
        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Some((size, Box::pin(body))))
    }

    async fn call<Req, Resp>(
        &self,
        method: &str,
        operation: &'static str,
        request: &Req,
    ) -> Result<Reply<Resp>>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{SERVICE_PATH}/{method}", self.base_url);
        let url = url.as_str();
        retry_with_backoff(&self.retry, operation, || async move {
            let response = self
                .http
                .post(url)
                .bearer_auth(self.token.expose_secret())
                .json(request)
                .send()
                .await
                .map_err(|e| transport_error(operation, &e))?;

            match response.status() {
                StatusCode::CONFLICT | StatusCode::NOT_FOUND => {
                    debug!(method, status = %response.status(), "Cache service declined");
                    Ok(Reply::Declined)
                }
                _ => {
                    let response = ensure_success(operation, response).await?;
                    let body = response
                        .json::<Resp>()
                        .await
                        .map_err(|e| Error::backend(PROVIDER_NAME, operation, e.to_string(), None))?;
                    Ok(Reply::Ok(body))
                }
            }
        })
        .await
    }
}

fn transport_error(operation: &'static str, err: &reqwest::Error) -> Error {
    Error::backend(
        PROVIDER_NAME,
        operation,
        err.to_string(),
        err.status().map(|s| s.as_u16()),
    )
}

async fn ensure_success(operation: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::backend(
        PROVIDER_NAME,
        operation,
        if body.is_empty() {
            status.to_string()
        } else {
            body
        },
        Some(status.as_u16()),
    ))
}
