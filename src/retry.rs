//! Pluggable retry policy for outbound calls
//!
//! Every outbound request the pipeline makes (metadata fetch, download
//! request, upload) goes through [`with_retry`] and a [`RetryPolicy`]. The
//! default policy is [`NoRetry`]: the first failure is terminal for the
//! session. [`ExponentialBackoff`] is used when `retry.max_attempts > 0`.
//!
//! # Example
//!
//! ```no_run
//! use build_relay::config::RetryConfig;
//! use build_relay::retry::{policy_from_config, with_retry};
//! use build_relay::error::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = policy_from_config(&RetryConfig::default());
//! let body = with_retry(policy.as_ref(), "fetch", || async {
//!     Ok::<_, Error>("metadata".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DownloadError, Error, FetchError, UploadError};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused connections, 5xx, 429) return `true`.
/// Everything else (bad credentials, malformed metadata, local disk errors)
/// returns `false` and ends the session even under a retrying policy.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation may be retried
    fn is_retryable(&self) -> bool;
}

fn transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn transient_transport(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { source, .. } => transient_transport(source),
            FetchError::HttpStatus { status, .. } => transient_status(*status),
            FetchError::Decode { .. } => false,
        }
    }
}

impl IsRetryable for DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::HttpStatus { status, .. } => transient_status(*status),
            DownloadError::Transport { source, .. } => transient_transport(source),
        }
    }
}

impl IsRetryable for UploadError {
    fn is_retryable(&self) -> bool {
        match self {
            UploadError::HttpStatus { status, .. } => transient_status(*status),
            UploadError::Transport { source, .. } => transient_transport(source),
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch(e) => e.is_retryable(),
            Error::Download(e) => e.is_retryable(),
            Error::Upload(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Local artifact errors need an operator
            Error::FileIo { .. } => false,
            Error::Config { .. }
            | Error::Auth(_)
            | Error::LinkMissing
            | Error::Timeout(_)
            | Error::ShuttingDown
            | Error::Serialization(_)
            | Error::ApiServerError(_) => false,
        }
    }
}

/// Decides whether, and after how long, a failed call is attempted again
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Delay before retry number `retry` (1-based), or `None` to give up
    fn backoff(&self, retry: u32) -> Option<Duration>;
}

/// Never retry
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn backoff(&self, _retry: u32) -> Option<Duration> {
        None
    }
}

/// Exponential backoff with optional jitter, bounded by `max_attempts`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    /// Create a backoff policy from configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay for `retry` before jitter is applied
    fn base_delay(&self, retry: u32) -> Duration {
        let max = self.config.max_delay.as_secs_f64();
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.config.initial_delay.as_secs_f64()
            * self.config.backoff_multiplier.powi(exponent);

        if secs.is_finite() {
            Duration::from_secs_f64(secs.clamp(0.0, max))
        } else {
            self.config.max_delay
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn backoff(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.config.max_attempts {
            return None;
        }

        let delay = self.base_delay(retry);
        Some(if self.config.jitter {
            add_jitter(delay)
        } else {
            delay
        })
    }
}

/// Select the policy described by `config`
pub fn policy_from_config(config: &RetryConfig) -> Arc<dyn RetryPolicy> {
    if config.max_attempts == 0 {
        Arc::new(NoRetry)
    } else {
        Arc::new(ExponentialBackoff::new(config.clone()))
    }
}

/// Execute an async operation under a retry policy
///
/// Non-retryable errors are returned immediately regardless of the policy.
pub async fn with_retry<F, Fut, T, E>(
    policy: &dyn RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retry > 0 {
                    tracing::info!(
                        operation = operation_name,
                        attempts = retry + 1,
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() => {
                retry += 1;
                let Some(delay) = policy.backoff(retry) else {
                    return Err(e);
                };

                tracing::warn!(
                    operation = operation_name,
                    error = %e,
                    retry,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
