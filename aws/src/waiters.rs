//! Polling and backoff helpers (§4.8 Waiters & Stabilization).
//!
//! There is no retry-policy crate in the teacher's dependency stack, so this
//! hand-rolls the same exponential-backoff shape the teacher's gRPC and
//! index retry loops use: a capped doubling delay driven by `tokio::time`.

use lbc_core::{ControllerError, Result};
use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_WAIT: Duration = Duration::from_secs(5 * 60);

/// Repeatedly calls `check` until it reports readiness (`Ok(true)`), a fatal
/// condition (`Err`), or the overall wait budget is exhausted, in which case
/// a [`ControllerError::TransientIo`] is returned so the caller's retry loop
/// picks the wait back up on the next reconcile.
pub async fn poll_until<F, Fut>(mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let deadline = tokio::time::Instant::now() + MAX_WAIT;
    let mut delay = INITIAL_BACKOFF;

    loop {
        if check().await? {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ControllerError::TransientIo {
                message: "timed out waiting for resource to stabilize".into(),
                context: lbc_core::ErrorContext::none(),
            });
        }
        tokio::time::sleep(delay).await;
        delay = std::cmp::min(delay * 2, MAX_BACKOFF);
    }
}

/// Sleeps for the post-create stabilization window (§4.8) before a
/// newly-created load balancer is considered ready for downstream listener
/// attachment. Length is configurable via [`crate::provider::CloudConfig`].
pub async fn stabilize(window: Duration) {
    if !window.is_zero() {
        tokio::time::sleep(window).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn poll_until_returns_once_check_reports_ready() {
        let calls = AtomicU32::new(0);
        poll_until(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(n >= 2)
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_propagates_fatal_errors_immediately() {
        let result = poll_until(|| async {
            Err(ControllerError::fatal("boom", lbc_core::ErrorContext::none()))
        })
        .await;
        assert!(matches!(result, Err(ControllerError::Fatal { .. })));
    }
}
