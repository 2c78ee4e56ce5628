use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// How the gateway retries rate-limited calls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each subsequent one
    pub initial_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Jittered delay to wait before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_delay(self.initial_backoff, attempt, jitter())
    }
}

/// `initial * 2^(attempt-1) * jitter`
pub fn backoff_delay(initial: Duration, attempt: u32, jitter: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let factor = f64::from(1u32 << exponent) * jitter;
    initial.mul_f64(factor)
}

/// Uniform jitter factor in `[0.5, 1.5)`
pub fn jitter() -> f64 {
    rand::thread_rng().gen_range(0.5..1.5)
}
