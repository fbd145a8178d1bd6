//! Resilient call executor: retry with backoff under an absolute deadline.

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::timeout::with_deadline_cancelling;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs a fallible network operation until it succeeds, fails with a
/// non-retryable error, or the absolute deadline elapses.
///
/// Only server errors (5xx) are retried. Client errors and unclassified
/// errors propagate unchanged after a single attempt. The deadline covers
/// the whole loop, including time spent waiting on a slow attempt and time
/// spent in backoff.
///
/// Every attempt receives a cancellation token. When the deadline fires the
/// token is cancelled and the in-flight attempt is dropped, so no retry can
/// outlive the deadline. This is the only retry loop in the engine.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    backoff: BackoffConfig,
    deadline: Duration,
}

impl RetryExecutor {
    /// Creates an executor.
    pub fn new(backoff: BackoffConfig, deadline: Duration) -> Self {
        Self { backoff, deadline }
    }

    /// Creates an executor from the engine configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.backoff.clone(), config.request_long_timeout)
    }

    /// Executes `operation` with retries.
    ///
    /// Cancelling `parent` stops the loop with [`SyncError::Cancelled`].
    pub async fn run<T, F, Fut>(&self, parent: &CancellationToken, mut operation: F) -> SyncResult<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let expired = parent.child_token();
        let mut backoff = Backoff::new(self.backoff.clone());

        let attempts = async {
            let mut attempt: u32 = 0;
            loop {
                // Set once the deadline fired; no listener is left for the result.
                if expired.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                attempt += 1;

                let outcome = tokio::select! {
                    biased;
                    _ = expired.cancelled() => Err(SyncError::Cancelled),
                    outcome = operation(expired.clone()) => outcome,
                };

                match outcome {
                    Ok(value) => return Ok(value),
                    Err(err) if err.is_retryable() => {
                        debug!(attempt, error = %err, "retrying after server error");
                    }
                    Err(err) => return Err(err),
                }

                tokio::select! {
                    biased;
                    _ = expired.cancelled() => return Err(SyncError::Cancelled),
                    _ = backoff.wait() => {}
                }
            }
        };

        let result = with_deadline_cancelling(self.deadline, &expired, attempts).await;
        if result.is_err() {
            debug!(deadline = ?self.deadline, "resilient call timed out");
        }
        result?
    }
}
