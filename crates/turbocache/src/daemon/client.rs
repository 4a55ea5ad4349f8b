//! HTTP client for talking to a running daemon.

use crate::cli::CliError;
use crate::server::SelfTestReport;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use turbocache_core::SERVER_PORT;

/// Bound for a single liveness probe.
pub const DETECT_TIMEOUT: Duration = Duration::from_millis(500);
/// Bound for the remote self-test.
pub const PING_TIMEOUT: Duration = Duration::from_secs(15);

/// Whether a daemon answers on the configured address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    /// `GET /` answered `{ok: true}`
    Running,
    /// Nothing answered in time
    NotRunning,
}

/// Reply to `DELETE /shutdown`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShutdownReply {
    /// Retention ran without error
    pub ok: bool,
    /// Retention failure, if any
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct StatusReply {
    ok: bool,
}

/// Client for the daemon's control routes.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    /// Client for the daemon on this machine's well-known port.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn local() -> Result<Self, CliError> {
        Self::new(format!("http://127.0.0.1:{SERVER_PORT}"))
    }

    /// Client for a daemon at `base_url`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, CliError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("turbocache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CliError::other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests go to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `GET /` once.
    pub async fn detect(&self) -> DaemonStatus {
        let reply = self
            .http
            .get(format!("{}/", self.base_url))
            .timeout(DETECT_TIMEOUT)
            .send()
            .await;
        let running = match reply {
            Ok(response) if response.status().is_success() => response
                .json::<StatusReply>()
                .await
                .is_ok_and(|status| status.ok),
            Ok(response) => {
                debug!(status = %response.status(), "Unexpected status from daemon");
                false
            }
            Err(err) => {
                debug!(error = %err, "Daemon not reachable");
                false
            }
        };
        if running {
            DaemonStatus::Running
        } else {
            DaemonStatus::NotRunning
        }
    }

    /// Poll [`DaemonClient::detect`] every `interval` until it reports
    /// running or `timeout` has passed.
    pub async fn wait_ready(&self, timeout: Duration, interval: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.detect().await == DaemonStatus::Running {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Send `DELETE /shutdown` and return the daemon's answer.
    ///
    /// # Errors
    ///
    /// Fails when the daemon cannot be reached or answers with something
    /// other than a shutdown reply.
    pub async fn shutdown(&self) -> Result<ShutdownReply, CliError> {
        let response = self
            .http
            .delete(format!("{}/shutdown", self.base_url))
            .send()
            .await
            .map_err(|e| {
                CliError::other_with_help(
                    format!("Failed to reach the daemon: {e}"),
                    "Is the daemon running? Start it with `turbocache start`",
                )
            })?;
        response
            .json::<ShutdownReply>()
            .await
            .map_err(|e| CliError::other(format!("Unexpected shutdown reply: {e}")))
    }

    /// Run the daemon's provider self-test.
    ///
    /// # Errors
    ///
    /// Fails when the daemon cannot be reached within [`PING_TIMEOUT`] or
    /// answers with something other than a self-test report.
    pub async fn ping(&self) -> Result<SelfTestReport, CliError> {
        let response = self
            .http
            .get(format!("{}/ping", self.base_url))
            .timeout(PING_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CliError::other("Cache provider test timed out")
                } else {
                    CliError::other(format!("Failed to reach the daemon: {e}"))
                }
            })?;
        response
            .json::<SelfTestReport>()
            .await
            .map_err(|e| CliError::other(format!("Unexpected self-test reply: {e}")))
    }
}
