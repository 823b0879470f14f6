use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::PriceError;

/// Deadline and cancellation carried by a single price request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// No deadline, only explicit cancellation.
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `fut` until it completes, the context is cancelled, or the deadline passes.
    /// Cancellation takes priority over the deadline.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, PriceError>
    where
        F: Future,
    {
        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PriceError::Cancelled),
            _ = expiry => Err(PriceError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_before_deadline() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(100));
        let out = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                7
            })
            .await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_hits_deadline() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let out = ctx.run(tokio::time::sleep(Duration::from_secs(1))).await;
        assert!(matches!(out, Err(PriceError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_expired_deadline() {
        let ctx = RequestContext::with_deadline(Instant::now());
        let clone = ctx.clone();
        clone.cancel();

        assert!(ctx.is_cancelled());
        let out = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(out, Err(PriceError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_has_no_deadline() {
        let ctx = RequestContext::background();
        assert!(ctx.deadline().is_none());
        let out = ctx.run(tokio::time::sleep(Duration::from_secs(3600))).await;
        assert!(out.is_ok());
    }
}
