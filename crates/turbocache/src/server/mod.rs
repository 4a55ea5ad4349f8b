//! HTTP protocol handler
//!
//! Serves the Turborepo `v8` artifacts API plus the daemon's control routes
//! on top of one shared [`DaemonContext`]:
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /` | liveness |
//! | `GET /ping` | provider self-test |
//! | `PUT /v8/artifacts/:hash` | upload |
//! | `GET /v8/artifacts/:hash` (and `HEAD`) | download |
//! | `DELETE /shutdown` | retention, latency summary, graceful stop |

mod handlers;
mod ping;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, put};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use turbocache_core::{LatencyTracker, RetentionPolicy};
use turbocache_storage::StorageProvider;

pub use ping::SelfTestReport;

/// Delay between answering `DELETE /shutdown` and closing the listener.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Everything a request handler needs, shared by all requests.
pub struct DaemonContext {
    /// The provider chosen at startup
    pub provider: Arc<dyn StorageProvider>,
    /// Latency totals reported at shutdown
    pub tracker: Arc<LatencyTracker>,
    /// Budgets applied at shutdown
    pub retention: RetentionPolicy,
    /// Cancelled once the server should stop accepting connections
    pub shutdown: CancellationToken,
    /// Delay before `shutdown` is cancelled after a shutdown request
    pub grace: Duration,
}

impl DaemonContext {
    /// Context with a fresh shutdown token and the default grace delay.
    #[must_use]
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        tracker: Arc<LatencyTracker>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            provider,
            tracker,
            retention,
            shutdown: CancellationToken::new(),
            grace: SHUTDOWN_GRACE,
        }
    }

    /// Cancel the shutdown token once the grace delay has passed.
    pub fn schedule_shutdown(&self) {
        let token = self.shutdown.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            token.cancel();
        });
    }
}

/// Build the router for `ctx`.
pub fn router(ctx: Arc<DaemonContext>) -> Router {
    Router::new()
        .route("/", get(handlers::status))
        .route("/ping", get(ping::self_test))
        .route(
            "/v8/artifacts/:hash",
            put(handlers::upload).get(handlers::download),
        )
        .route("/shutdown", delete(handlers::shutdown))
        .layer(DefaultBodyLimit::disable())
        .with_state(ctx)
}

/// Serve on `listener` until the context's shutdown token is cancelled and
/// in-flight requests have finished.
///
/// # Errors
///
/// Returns the I/O error that stopped the accept loop.
pub async fn serve(listener: TcpListener, ctx: Arc<DaemonContext>) -> io::Result<()> {
    let token = ctx.shutdown.clone();
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, provider = ctx.provider.name(), "Server listening");
    }
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    info!("Server stopped");
    Ok(())
}
