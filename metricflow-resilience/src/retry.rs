//! Retry policy for task runs
//!
//! A task run is attempted at most `1 + max_retries` times. The policy only decides
//! whether and when another attempt should be dispatched; waiting for the delay is left
//! to the dispatcher.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt
    pub max_retries: u32,

    /// Delay before each retry
    #[serde(with = "serde_seconds")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(10),
        }
    }
}

/// Outcome of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Dispatch another attempt after the delay
    Retry { after: Duration, retry: u32 },
    /// No attempts left
    Exhausted,
    /// The error must not be retried
    Abort,
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryPolicy {
    /// Policy without retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Build from a delay in (possibly fractional or negative) seconds
    pub fn from_seconds(max_retries: u32, delay_seconds: f64) -> Self {
        let delay = if delay_seconds.is_finite() && delay_seconds > 0.0 {
            Duration::from_secs_f64(delay_seconds)
        } else {
            Duration::ZERO
        };
        Self { max_retries, delay }
    }

    /// Total number of attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decide what follows the failed attempt number `attempt` (1-based)
    pub fn decide<E: Retryable>(&self, attempt: u32, error: &E) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Abort;
        }
        if attempt >= self.max_attempts() {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry {
            after: self.delay,
            retry: attempt,
        }
    }
}

/// Serde helper for Duration serialization as fractional seconds
pub mod serde_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(serde::de::Error::custom("duration must be a positive number of seconds"));
        }
        Ok(Duration::from_secs_f64(seconds))
    }
}
