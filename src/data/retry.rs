use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::data::context::RequestContext;
use crate::error::{PriceError, UpstreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the failed attempt with index `attempt`: `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(200))
    }
}

/// Result of one attempt, as seen by the retry loop.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Retryable(UpstreamError),
    Fatal(UpstreamError),
}

impl<T> From<Result<T, UpstreamError>> for Outcome<T> {
    fn from(result: Result<T, UpstreamError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(e) if e.is_retryable() => Outcome::Retryable(e),
            Err(e) => Outcome::Fatal(e),
        }
    }
}

enum State<T> {
    Attempting { attempt: u32 },
    RetryableFailure { attempt: u32, error: UpstreamError },
    Success(T),
    FatalFailure(UpstreamError),
    Exhausted(UpstreamError),
}

/// Drives `op` through the retry state machine.
///
/// `op` receives the zero-based attempt index. Attempts and backoff waits both
/// run under `ctx`, so an expired deadline or a cancellation ends the loop with
/// `DeadlineExceeded`/`Cancelled` instead of the upstream error.
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &RequestContext,
    mut op: F,
) -> Result<T, PriceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let mut state = State::Attempting { attempt: 0 };
    loop {
        state = match state {
            State::Attempting { attempt } => match ctx.run(op(attempt)).await? {
                Outcome::Success(value) => State::Success(value),
                Outcome::Retryable(error) => State::RetryableFailure { attempt, error },
                Outcome::Fatal(error) => State::FatalFailure(error),
            },
            State::RetryableFailure { attempt, error } => {
                if attempt >= policy.max_retries {
                    State::Exhausted(error)
                } else {
                    let delay = policy.backoff(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt + 1,
                        policy.max_attempts(),
                        error,
                        delay
                    );
                    ctx.run(tokio::time::sleep(delay)).await?;
                    State::Attempting {
                        attempt: attempt + 1,
                    }
                }
            }
            State::Success(value) => return Ok(value),
            State::FatalFailure(error) => return Err(PriceError::UpstreamFatal(error)),
            State::Exhausted(error) => return Err(PriceError::UpstreamUnavailable(error)),
        };
    }
}
