//! Deadline guard for asynchronous operations.

use crate::error::{SyncError, SyncResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Races `operation` against `deadline`.
///
/// Returns the operation's output if it finishes first, or
/// [`SyncError::Timeout`] once the deadline elapses. On timeout the operation
/// future is dropped, which aborts any request it still has in flight. The
/// single deadline timer is disarmed as soon as the operation completes.
pub async fn with_deadline<F>(deadline: Duration, operation: F) -> SyncResult<F::Output>
where
    F: Future,
{
    tokio::time::timeout(deadline, operation)
        .await
        .map_err(|_| SyncError::Timeout)
}

/// Like [`with_deadline`], and additionally cancels `expired` when the
/// deadline fires so that work spawned outside the future can stop too.
pub async fn with_deadline_cancelling<F>(
    deadline: Duration,
    expired: &CancellationToken,
    operation: F,
) -> SyncResult<F::Output>
where
    F: Future,
{
    let result = with_deadline(deadline, operation).await;
    if matches!(result, Err(SyncError::Timeout)) {
        expired.cancel();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn returns_result_when_operation_wins() {
        let result = with_deadline(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            7
        })
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_a_hanging_operation() {
        let start = Instant::now();
        let result = with_deadline(Duration::from_secs(3), std::future::pending::<()>()).await;
        assert_eq!(result, Err(SyncError::Timeout));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn inner_errors_pass_through_unchanged() {
        let result = with_deadline(Duration::from_secs(1), async {
            Err::<(), _>(SyncError::Network("reset".into()))
        })
        .await;
        assert_eq!(result, Ok(Err(SyncError::Network("reset".into()))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancels_token_only_on_expiry() {
        let token = CancellationToken::new();
        let ok = with_deadline_cancelling(Duration::from_secs(1), &token, async { 1 }).await;
        assert_eq!(ok, Ok(1));
        assert!(!token.is_cancelled());

        let late =
            with_deadline_cancelling(Duration::from_secs(1), &token, std::future::pending::<()>())
                .await;
        assert_eq!(late, Err(SyncError::Timeout));
        assert!(token.is_cancelled());
    }
}
