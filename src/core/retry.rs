use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{validate_positive_duration, validate_range};
use std::time::Duration;

/// Bounded exponential backoff: `initial, 2*initial, 4*initial, ...`, each capped at
/// `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Result<Self> {
        validate_range(
            "retry.max_attempts",
            max_attempts,
            1,
            Self::MAX_ATTEMPTS_LIMIT,
        )?;
        validate_positive_duration("retry.initial_delay_ms", initial_delay)?;
        if initial_delay > max_delay {
            return Err(SyncError::InvalidConfigValueError {
                field: "retry.max_delay_ms".to_string(),
                value: max_delay.as_millis().to_string(),
                reason: format!(
                    "Must be at least the initial delay ({}ms)",
                    initial_delay.as_millis()
                ),
            });
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            max_delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before retry `attempt` (1-based). Attempt 0 is treated as 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// The full delay schedule, one entry per allowed attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|a| self.backoff(a)).collect()
    }
}
