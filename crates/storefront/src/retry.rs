//! Jittered exponential backoff for outbound marketplace calls.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// Exponential backoff policy with jitter and an attempt ceiling.
///
/// Delays double per attempt from `base_delay_ms`, cap at
/// `max_delay_ms`, and spread by `jitter_pct` in either direction.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base_delay_ms.max(1),
            max_delay_ms: max_delay_ms.max(base_delay_ms.max(1)),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Policy used for marketplace calls: 4 attempts, 250ms base, 5s cap.
    #[must_use]
    pub fn marketplace() -> Self {
        Self::new(4, 250, 5_000, 0.2)
    }

    /// Delay before retrying after a (zero-based) failed attempt.
    #[must_use]
    pub fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);

        let jittered = if self.jitter_pct > 0.0 {
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rand::rng().random_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    /// Sleep for the backoff delay after a failed attempt, honoring an
    /// explicit server-provided hint (e.g. a 429 `Retry-After`) when one
    /// is larger than the computed delay.
    pub async fn wait(&self, attempt: usize, hint: Option<Duration>) {
        let delay = self.next_delay(attempt);
        sleep(hint.map_or(delay, |h| h.max(delay))).await;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::marketplace()
    }
}
