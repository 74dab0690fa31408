use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use ca_core::config::RetryConfig;
use ca_telemetry::error_log::ErrorLogger;
use serde_json::json;
use tracing::{debug, warn};

/// Retry behaviour for batch operations.
///
/// A failed attempt is retried up to `max_retries` times. Before retry `n`
/// (1-based) the policy waits `base_delay * n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self::new(cfg.max_retries, Duration::from_millis(cfg.delay_ms))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Wait before the given 1-based retry.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// Total number of attempts a permanently failing operation gets.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `f` until it succeeds or the retry budget is spent.
    ///
    /// Each retry is reported to `logger` as a warning
    /// (`"Retry attempt {n} of {max}"`, context carries the error). After the
    /// final failure the last error is returned unchanged.
    pub async fn run<F, Fut, T, E>(
        &self,
        logger: &dyn ErrorLogger,
        operation: &str,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut retry = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!(operation, attempt = retry + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        operation,
                        retry,
                        max_retries = self.max_retries,
                        "attempt failed: {e}. Retrying in {delay:?}"
                    );
                    logger
                        .log_warning(
                            &format!("Retry attempt {retry} of {}", self.max_retries),
                            json!({ "error": e.to_string(), "operation": operation }),
                        )
                        .await;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
