//! Retry logic with exponential backoff
//!
//! This module provides:
//! - Failure classification (success / retryable / rate-limited / terminal)
//! - Exponential backoff with additive jitter and an injectable random source
//! - A shared circuit breaker that trips into degraded mode
//! - Per-call retry policy and progress reporting types

pub mod circuit_breaker;
pub mod classifier;
pub mod strategy;

pub use circuit_breaker::{BreakerPolicy, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use classifier::{AttemptOutcome, Failure};
pub use strategy::{Backoff, FixedJitter, JitterSource, SeededJitter};

use std::time::Duration;


/// Per-call retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap on computed backoff; server `Retry-After` hints are not capped
    pub max_delay: Duration,
    pub timeout_per_attempt: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            timeout_per_attempt: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry(timeout_per_attempt: Duration) -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            timeout_per_attempt,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_timeout(mut self, timeout_per_attempt: Duration) -> Self {
        self.timeout_per_attempt = timeout_per_attempt;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.base_delay > self.max_delay {
            return Err(format!(
                "base_delay ({:?}) must not exceed max_delay ({:?})",
                self.base_delay, self.max_delay
            ));
        }
        if self.timeout_per_attempt.is_zero() {
            return Err("timeout_per_attempt must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Progress report emitted before each retry wait
///
/// Lets callers render "retrying in 2s" style status without scraping logs.
#[derive(Debug, Clone)]
pub struct RetryStatus {
    /// Attempt that just failed (1-indexed)
    pub attempt: u32,
    pub max_attempts: u32,
    /// Time since the first attempt started
    pub elapsed: Duration,
    /// How long the executor will wait before the next attempt
    pub sleep: Duration,
    pub reason: String,
    /// True if the wait comes from a 429 (hinted or not)
    pub is_rate_limit: bool,
}
