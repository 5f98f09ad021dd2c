use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Bounded retry with exponential backoff and jitter, applied to transient failures only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        let base = u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX).max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base,
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retrying after failed attempt number `attempt` (1-based), without jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(backoff.max(self.base_delay_ms)).min(MAX_BACKOFF)
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let jitter = rand::thread_rng().gen_range(0..=self.base_delay_ms);
                    let delay = self.delay_for_attempt(attempt) + Duration::from_millis(jitter);
                    log::warn!(
                        "{label}: attempt {attempt}/{} failed ({err}); retrying in {}ms",
                        self.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if attempt > 1 {
                        log::warn!("{label}: giving up after {attempt} attempts: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }
}
