//! Retry with exponential backoff for calls that leave the process.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use netledger_core::RetryConfig;

use crate::error::{DiscoverError, Result};

/// Backoff schedule applied to scans and inventory calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(&RetryConfig::none())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts run out. Waiting between attempts is cut short by `cancel`.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.initial_backoff;
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(DiscoverError::Cancelled);
            }

            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        operation = what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Transient failure, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(DiscoverError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }

                    delay = std::cmp::min(delay * 2 + jitter(), self.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

fn jitter() -> Duration {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::Instant::now().hash(&mut hasher);
    Duration::from_millis(hasher.finish() % 100)
}
