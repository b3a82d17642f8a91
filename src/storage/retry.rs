use std::future::Future;
use std::time::Duration;

use crate::models::Result;

/// Bounded exponential backoff for transient store and network failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            base_backoff_ms,
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt,
    /// capped so the shift cannot overflow.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }

    /// Runs `op` until it succeeds or the retry budget is exhausted,
    /// sleeping between attempts. The final error is returned as-is.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries => {
                    let backoff = self.delay_for(attempt);
                    tracing::warn!(
                        op = op_name,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient failure; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
