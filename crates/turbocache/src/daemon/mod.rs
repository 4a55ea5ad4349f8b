//! Daemon lifecycle management.
//!
//! `start` launches the server as a detached process, waits for it to answer
//! and exports the Turborepo variables. The daemon only ever stops through
//! `DELETE /shutdown`, which `kill` and `post` send.

mod client;
mod env;
mod launch;

pub use client::{DETECT_TIMEOUT, DaemonClient, DaemonStatus, PING_TIMEOUT, ShutdownReply};
pub use env::{TURBO_CREDENTIAL, export_variables, turbo_variables};
pub use launch::{launch, read_log};

use crate::cli::CliError;
use crate::server::SelfTestReport;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use turbocache_core::SERVER_PORT;

/// How long `start` and `ping` wait for the daemon to answer.
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);
/// Delay between readiness probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle of the background daemon as seen by the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// No daemon answers
    NotRunning,
    /// The server process is being spawned
    Launching,
    /// Spawned; polling for the first answer
    WaitingReady,
    /// Answering requests
    Ready,
    /// Shutdown requested; retention is running
    Draining,
    /// Stopped
    Terminated,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotRunning => "not-running",
            Self::Launching => "launching",
            Self::WaitingReady => "waiting-ready",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        })
    }
}

/// Log a lifecycle transition.
pub fn enter(state: DaemonState) {
    info!(%state, "Daemon state changed");
}

/// Inputs for [`start`].
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Where the daemon writes its output
    pub log_file: PathBuf,
    /// Extra arguments after `serve` (log level, log format)
    pub serve_args: Vec<String>,
    /// The CI environment file to append variables to, if any
    pub github_env: Option<PathBuf>,
}

/// Make sure a daemon is running and export the Turborepo variables.
///
/// A daemon that already answers is reused.
///
/// # Errors
///
/// Fails when the process cannot be spawned, or when it does not become
/// ready within [`READY_TIMEOUT`]; the error then carries the daemon log.
pub async fn start(
    client: &DaemonClient,
    options: &StartOptions,
    out: &mut impl Write,
) -> Result<DaemonState, CliError> {
    if client.detect().await == DaemonStatus::Running {
        info!("Daemon already running");
    } else {
        enter(DaemonState::NotRunning);
        enter(DaemonState::Launching);
        launch(&options.log_file, &options.serve_args)?;

        enter(DaemonState::WaitingReady);
        if !client.wait_ready(READY_TIMEOUT, POLL_INTERVAL).await {
            let log = read_log(&options.log_file).await.unwrap_or_default();
            return Err(CliError::other_with_help(
                format!(
                    "Daemon did not become ready within {}s. Log output:\n{log}",
                    READY_TIMEOUT.as_secs()
                ),
                format!("See {}", options.log_file.display()),
            ));
        }
    }

    enter(DaemonState::Ready);
    info!(log_file = %options.log_file.display(), "Server is now up and running");
    export_variables(
        &turbo_variables(SERVER_PORT),
        options.github_env.as_deref(),
        out,
    )?;
    Ok(DaemonState::Ready)
}

/// Ask the daemon to shut down without waiting for it to exit.
///
/// # Errors
///
/// Fails when the daemon cannot be reached.
pub async fn kill(client: &DaemonClient) -> Result<(), CliError> {
    enter(DaemonState::Draining);
    let reply = client.shutdown().await?;
    if let Some(error) = reply.error.filter(|_| !reply.ok) {
        warn!(%error, "Daemon cleanup failed");
    }
    Ok(())
}

/// Wait for the daemon, then run its provider self-test.
///
/// # Errors
///
/// Fails when no daemon becomes ready, the daemon cannot be reached, or
/// the self-test reports a failure.
pub async fn ping(client: &DaemonClient) -> Result<SelfTestReport, CliError> {
    if !client.wait_ready(READY_TIMEOUT, POLL_INTERVAL).await {
        return Err(CliError::other_with_help(
            "No daemon is running",
            "Start it with `turbocache start`",
        ));
    }
    let report = client.ping().await?;
    if !report.ok {
        let error = report.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(CliError::other(format!("Cache provider test failed: {error}")));
    }
    info!(tests = %report.tests.join(", "), "Cache provider test completed successfully");
    Ok(report)
}

/// CI post step: stop the daemon, then copy its log to `out`.
///
/// The log is written even when the shutdown request fails.
///
/// # Errors
///
/// Returns the shutdown error, or the error reading or writing the log.
pub async fn post(
    client: &DaemonClient,
    log_file: &std::path::Path,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let shutdown = kill(client).await;
    let log = read_log(log_file).await?;
    out.write_all(log.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|e| CliError::other(format!("Failed to write daemon log: {e}")))?;
    shutdown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(DaemonState::WaitingReady.to_string(), "waiting-ready");
        assert_eq!(DaemonState::NotRunning.to_string(), "not-running");
    }

    #[tokio::test]
    async fn test_post_prints_log_when_daemon_is_gone() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = DaemonClient::new(format!("http://127.0.0.1:{port}")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("daemon.log");
        std::fs::write(&log_file, "earlier output\n").unwrap();

        let mut out = Vec::new();
        assert!(post(&client, &log_file, &mut out).await.is_err());
        assert_eq!(out, b"earlier output\n");
    }
}
