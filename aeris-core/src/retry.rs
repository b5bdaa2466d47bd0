use std::future::Future;
use std::time::Duration;

/// Lets the retry loop distinguish transactional conflicts (retryable) from
/// business-rule and validation failures (surfaced immediately).
pub trait RetryableError {
    fn is_conflict(&self) -> bool;

    /// The error surfaced once the conflict budget is exhausted
    fn contention_exhausted() -> Self;
}

/// Bounded retry with exponential backoff for optimistic transactions.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-conflict error, or the
    /// attempt budget runs out. Each attempt must begin its own transaction.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        E: RetryableError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Err(err) if err.is_conflict() => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(attempt, "conflict budget exhausted, surfacing contention");
                        return Err(E::contention_exhausted());
                    }
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transaction conflict, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }
}
