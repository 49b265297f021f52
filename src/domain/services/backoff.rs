//! Retry Backoff Service
//!
//! Pure domain logic for deciding whether and when a failed dispatch job is
//! retried.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Exponential backoff with a cap and an attempt ceiling.
///
/// `delay(n) = base * multiplier^(n - 1)`, capped at `max_interval`.
/// The delay never decreases as `n` grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt
    pub base: Duration,
    /// Growth factor per attempt (1 = fixed interval)
    pub multiplier: u32,
    /// Upper bound for any single delay
    pub max_interval: Duration,
    /// Attempts allowed per job before it is abandoned
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            multiplier: 2,
            max_interval: Duration::from_secs(3600),
            max_attempts: 5,
        }
    }
}

/// What to do with a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Create attempt `attempt` to run at `next_attempt_at`
    Retry {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Mark the job abandoned
    GiveUp { reason: String },
}

impl BackoffPolicy {
    /// Delay before the attempt that follows failed attempt `attempt_count`.
    pub fn delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(32);
        let factor = self.multiplier.max(1).checked_pow(exponent).unwrap_or(u32::MAX);
        let delay = self
            .base
            .checked_mul(factor)
            .unwrap_or(self.max_interval);
        delay.min(self.max_interval)
    }

    /// Decide the fate of a job whose attempt `attempt_count` just failed.
    pub fn decide(&self, attempt_count: u32, retryable: bool, failed_at: DateTime<Utc>) -> RetryDecision {
        if !retryable {
            return RetryDecision::GiveUp {
                reason: "non-retryable failure".to_string(),
            };
        }

        if attempt_count >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exhausted", self.max_attempts),
            };
        }

        let Ok(delay) = chrono::Duration::from_std(self.delay(attempt_count)) else {
            return RetryDecision::GiveUp {
                reason: "retry delay out of range".to_string(),
            };
        };

        RetryDecision::Retry {
            attempt: attempt_count + 1,
            next_attempt_at: failed_at + delay,
        }
    }
}
