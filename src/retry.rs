//! Retry strategies and backoff logic for slot workers.

use crate::RetrySettings;
use std::time::Duration;

/// Backoff parameters
///
/// Internal type - users configure retries via `RetrySettings`.
#[derive(Debug, Clone)]
pub(crate) struct RetryConfig {
    /// Maximum number of retry attempts after the first submission
    max_retries: u32,
    /// Base backoff duration in milliseconds
    base_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    max_backoff_ms: u64,
    multiplier: f64,
    /// Spread workers that failed together
    jitter: bool,
}

impl RetryConfig {
    pub(crate) fn new(max_retries: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            base_backoff_ms,
            max_backoff_ms,
            multiplier: 2.0,
            jitter: true,
        }
    }

    pub(crate) fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.retry_backoff_ms,
            settings.max_backoff_ms,
        )
    }

    /// Disable jitter
    #[cfg(test)]
    pub(crate) fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// Exponential backoff between submission attempts
#[derive(Debug, Clone, Default)]
pub(crate) struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub(crate) fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Calculate the backoff duration before retry `attempt` (1-indexed)
    pub(crate) fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let mut backoff_ms =
            self.config.base_backoff_ms as f64 * self.config.multiplier.powi(exponent);
        backoff_ms = backoff_ms.min(self.config.max_backoff_ms as f64);

        if self.config.jitter {
            use rand::Rng;
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            backoff_ms = (backoff_ms * jitter_factor).min(self.config.max_backoff_ms as f64);
        }

        Duration::from_millis(backoff_ms as u64)
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Whether another attempt is allowed after `attempt` retries
    pub(crate) fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_retries
    }
}
