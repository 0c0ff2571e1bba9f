//! Resilience patterns for metricflow
//!
//! This crate provides the retry policy applied to task runs and a thread-safe
//! fixed-window rate limiter for sinks pacing their outgoing calls.

pub mod rate_limit;
pub mod retry;

// Re-export commonly used types
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{RetryDecision, RetryPolicy, Retryable};
