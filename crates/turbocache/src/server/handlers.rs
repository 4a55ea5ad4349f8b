//! Route handlers for status, artifacts and shutdown.

use super::DaemonContext;
use crate::daemon::{self, DaemonState};
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use serde_json::{Value, json};
use std::io;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use turbocache_core::Error;
use turbocache_storage::{ByteStream, retention};

/// Header carrying the artifact tag in both directions.
pub const ARTIFACT_TAG_HEADER: &str = "x-artifact-tag";

/// A failed request: logged, then answered with `500 {ok: false, error}`.
pub(crate) struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": self.0.to_string() })),
        )
            .into_response()
    }
}

pub(crate) async fn status() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[instrument(name = "upload", skip_all, fields(hash = %hash))]
pub(crate) async fn upload(
    State(ctx): State<Arc<DaemonContext>>,
    Path(hash): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Value>, ApiError> {
    let tag = artifact_tag(&headers);
    info!(tag = tag.as_deref(), "Received artifact");

    let stream: ByteStream = Box::pin(body.into_data_stream().map_err(io::Error::other));
    ctx.provider.save(&hash, tag.as_deref(), stream).await?;

    info!("Saved artifact");
    Ok(Json(json!({ "ok": true })))
}

#[instrument(name = "download", skip_all, fields(hash = %hash))]
pub(crate) async fn download(
    State(ctx): State<Arc<DaemonContext>>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    info!("Requested artifact");
    let Some(artifact) = ctx.provider.get(&hash).await? else {
        info!("Artifact not found");
        return Ok((StatusCode::NOT_FOUND, Json(json!({ "ok": false }))).into_response());
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(size) = artifact.size {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    }
    if let Some(tag) = artifact.tag.as_deref() {
        match HeaderValue::from_str(tag) {
            Ok(value) => {
                headers.insert(ARTIFACT_TAG_HEADER, value);
            }
            Err(_) => warn!(tag, "Stored tag is not a valid header value, omitting it"),
        }
    }

    info!(size = artifact.size, "Sending artifact");
    Ok((StatusCode::OK, headers, Body::from_stream(artifact.body)).into_response())
}

#[instrument(name = "shutdown", skip_all)]
pub(crate) async fn shutdown(State(ctx): State<Arc<DaemonContext>>) -> Response {
    info!("Shutdown requested");
    daemon::enter(DaemonState::Draining);
    let response = match retention::run(ctx.provider.as_ref(), &ctx.retention).await {
        Ok(report) => {
            info!(
                listed = report.listed,
                deleted = report.deleted,
                failed = report.failed,
                skipped = report.skipped,
                "Cleanup finished"
            );
            (StatusCode::OK, Json(json!({ "ok": true })))
        }
        Err(err) => {
            error!(error = %err, "Cleanup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": err.to_string() })),
            )
        }
    };

    info!(summary = %ctx.tracker.summary(), "Latency summary");
    ctx.schedule_shutdown();
    response.into_response()
}

/// The request's tag; an empty header counts as no tag.
fn artifact_tag(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ARTIFACT_TAG_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
}
