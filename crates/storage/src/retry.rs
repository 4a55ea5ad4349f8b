//! Retry with exponential backoff for hosted cache calls

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};
use std::time::Duration;
use tracing::{debug, warn};
use turbocache_core::{Error, Result};

/// Retry tuning for backend calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor between delays
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Retry a fallible async operation while its error looks transient.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = create_backoff(config);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempts,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempts >= config.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }

                let Some(duration) = backoff.next_backoff() else {
                    return Err(err);
                };
                warn!(
                    operation = operation_name,
                    attempts = attempts,
                    error = %err,
                    retry_in_ms = duration.as_millis(),
                    "Operation failed, retrying"
                );
                tokio::time::sleep(duration).await;
            }
        }
    }
}

fn create_backoff(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_backoff)
        .with_max_interval(config.max_backoff)
        .with_multiplier(config.multiplier)
        .with_max_elapsed_time(None)
        .build()
}

/// Connection failures, throttling and server errors are worth another try.
fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Backend { status: None, .. } | Error::Io { .. } => true,
        Error::Backend {
            status: Some(status),
            ..
        } => *status == 429 || *status >= 500,
        Error::Configuration { .. } | Error::InvalidKey { .. } | Error::Unsupported { .. } => {
            false
        }
    }
}
