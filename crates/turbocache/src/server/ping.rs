//! `GET /ping`: round-trips a synthetic artifact through the active provider.

use super::DaemonContext;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use turbocache_storage::{StorageProvider, byte_stream_from, collect_bytes};

/// Upper bound for the whole self-test.
pub const SELF_TEST_TIMEOUT: Duration = Duration::from_secs(10);

const PAYLOAD: &[u8] = b"turbocache self-test payload";
const PING_TAG: &str = "ping";

/// Outcome of a self-test: which steps passed and, on failure, why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfTestReport {
    /// Every required step passed
    pub ok: bool,
    /// Steps that passed, in order
    pub tests: Vec<String>,
    /// What went wrong
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[instrument(name = "ping", skip_all)]
pub(crate) async fn self_test(
    State(ctx): State<Arc<DaemonContext>>,
) -> (StatusCode, Json<SelfTestReport>) {
    let mut tests = Vec::new();
    let outcome =
        tokio::time::timeout(SELF_TEST_TIMEOUT, run_steps(ctx.provider.as_ref(), &mut tests))
            .await;
    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(message)) => Some(message),
        Err(_) => Some(format!(
            "self-test timed out after {}s",
            SELF_TEST_TIMEOUT.as_secs()
        )),
    };

    match &error {
        None => info!(tests = ?tests, "Self-test passed"),
        Some(message) => warn!(tests = ?tests, error = %message, "Self-test failed"),
    }
    let status = if error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(SelfTestReport {
            ok: error.is_none(),
            tests,
            error,
        }),
    )
}

async fn run_steps(
    provider: &dyn StorageProvider,
    tests: &mut Vec<String>,
) -> Result<(), String> {
    let hash = format!("turbocache-ping-{}", uuid::Uuid::new_v4().simple());

    provider
        .save(&hash, Some(PING_TAG), byte_stream_from(PAYLOAD))
        .await
        .map_err(|e| format!("save failed: {e}"))?;
    tests.push("save".to_string());

    let artifact = provider
        .get(&hash)
        .await
        .map_err(|e| format!("get failed: {e}"))?
        .ok_or_else(|| "get failed: artifact missing after save".to_string())?;
    let body = collect_bytes(artifact.body)
        .await
        .map_err(|e| format!("get failed: {e}"))?;
    if body != PAYLOAD {
        return Err(format!(
            "get failed: read {} bytes that differ from the {} saved",
            body.len(),
            PAYLOAD.len()
        ));
    }
    tests.push("get".to_string());

    // Cleanup is best-effort; providers that cannot delete still pass
    let path = provider.entry_path(&hash, Some(PING_TAG));
    match provider.delete(&path).await {
        Ok(()) => tests.push("delete".to_string()),
        Err(err) if err.is_unsupported() => info!("Provider cannot delete, skipping cleanup"),
        Err(err) => warn!(%path, error = %err, "Failed to remove self-test artifact"),
    }
    Ok(())
}
