//! Retry policy for network fetches
//!
//! The policy is a pure function of the attempt number and the error, so the
//! fetch loop stays free of timing decisions and tests need no clock.

use crate::config::CrawlerConfig;
use crate::FetchError;
use std::time::Duration;

/// What the caller should do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again
    RetryAfter(Duration),
    /// Stop and surface the error
    GiveUp,
}

/// Exponential backoff bounded by an attempt limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Builds the policy from the crawler settings
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Decides whether attempt number `attempt` (1-based) may be followed by
    /// another one
    ///
    /// Permanent errors are never retried. Transient errors are retried
    /// after `base_delay * 2^(attempt - 1)`, capped at `max_delay`, until
    /// `max_attempts` attempts have been made.
    pub fn decide(&self, attempt: u32, error: &FetchError) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        RetryDecision::RetryAfter(self.delay_for(attempt))
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}
