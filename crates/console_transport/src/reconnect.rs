use std::time::Duration;

/// Delay before the first reconnect attempt.
pub const INITIAL_DELAY_MS: u64 = 1000;
/// Upper bound for any reconnect delay.
pub const MAX_DELAY_MS: u64 = 5000;
/// Reconnect attempts before the channel gives up for good.
pub const MAX_ATTEMPTS: u32 = 5;

/// Capped exponential reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(30);
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Whether another reconnect attempt is allowed after `attempts_made`.
    pub fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
