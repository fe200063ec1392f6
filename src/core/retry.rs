//! Retry budget with increasing intervals between attempts.

use std::time::Duration;

/// Attempts made for a section when no job-specific budget applies.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of generation attempts.
    pub max_attempts: u32,
    /// Base interval between attempts in milliseconds.
    pub base_interval_ms: u64,
    /// Amount to increase the interval after each failed attempt.
    pub interval_increment_ms: u64,
}

impl Default for RetryConfig {
    /// Three attempts back to back.
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_interval_ms: 0,
            interval_increment_ms: 0,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration with custom values.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum number of attempts
    /// * `base_interval_ms` - Initial wait time in milliseconds
    /// * `interval_increment_ms` - Amount to add after each failure
    #[must_use]
    pub const fn new(max_attempts: u32, base_interval_ms: u64, interval_increment_ms: u64) -> Self {
        Self {
            max_attempts,
            base_interval_ms,
            interval_increment_ms,
        }
    }

    /// Retries immediately, up to `max_attempts` times.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0, 0)
    }

    /// Calculates the wait after the given zero-based failed attempt.
    ///
    /// Uses linear backoff: base + (attempt * increment)
    ///
    /// # Examples
    ///
    /// ```
    /// use backlogsmith::core::RetryConfig;
    /// use std::time::Duration;
    ///
    /// let config = RetryConfig::new(10, 500, 250);
    /// assert_eq!(config.wait_duration(0), Duration::from_millis(500));
    /// assert_eq!(config.wait_duration(2), Duration::from_millis(1000));
    /// ```
    #[must_use]
    pub const fn wait_duration(&self, attempt: u32) -> Duration {
        let ms = self.base_interval_ms + (attempt as u64 * self.interval_increment_ms);
        Duration::from_millis(ms)
    }

    /// Returns true if another attempt may follow the given one (1-indexed).
    #[must_use]
    pub const fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
