//! Cancellation helpers for index-scoped async work.
//!
//! Every long-lived task in the console (the alert stream, the historical
//! seed fetch, reconnect backoff sleeps) is tied to a `CancellationToken`
//! owned by the component that spawned it. Once that token fires the work
//! must stop and its late results must be discarded, never applied.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned when the owning scope was torn down before the work finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("owning scope was torn down")]
pub struct TornDown;

/// Extension trait racing any future against a teardown token.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Resolve to `Ok(output)` if the future wins, or `Err(TornDown)` if the
    /// token is (or already was) cancelled first.
    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, TornDown>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, TornDown> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(TornDown),
            res = self => Ok(res),
        }
    }
}

/// Sleep for `duration` unless the token fires first.
///
/// A zero duration returns immediately without checking the token.
pub async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> Result<(), TornDown> {
    if duration.is_zero() {
        return Ok(());
    }

    tokio::time::sleep(duration).or_cancel(token).await
}
