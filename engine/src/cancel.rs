//! Cancellation helpers
//!
//! Every suspension point in the executor (a transport send, a backoff
//! wait) races against the caller's `CancellationToken` so that an outer
//! scope can abandon a call without waiting for its remaining retries.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The token fired before the raced future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Race a future against a `CancellationToken`.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Cancelled>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Cancelled> {
        tokio::select! {
            // Cancellation wins ties.
            biased;
            _ = token.cancelled() => Err(Cancelled),
            res = self => Ok(res),
        }
    }
}

/// Sleep for `duration` unless the token fires first.
pub async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> Result<(), Cancelled> {
    if duration.is_zero() {
        return if token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::time::sleep(duration).or_cancel(token).await
}
