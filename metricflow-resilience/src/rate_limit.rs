//! Fixed-window rate limiting
//!
//! A sink may be called by several task runs at once. The limiter keeps its counter and
//! window start behind one lock, so a window rollover and the first call of the new
//! window happen atomically for concurrent callers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::retry::serde_seconds;

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Calls allowed per window
    pub calls: u32,

    /// Length of a window
    #[serde(with = "serde_seconds")]
    pub period: Duration,
}

#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    count: u32,
}

/// Thread-safe fixed-window rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<WindowState>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
            })),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take a slot, or return how long until the current window ends
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    /// Take a slot at a given instant
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.window_start);
        if elapsed >= self.config.period {
            state.window_start = now;
            state.count = 0;
        }

        if state.count < self.config.calls {
            state.count += 1;
            return Ok(());
        }

        let elapsed = now.saturating_duration_since(state.window_start);
        Err(self.config.period.saturating_sub(elapsed))
    }

    /// Block the calling thread until a slot is available
    pub fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    tracing::debug!(
                        target: "rate_limit",
                        wait_ms = wait.as_millis() as u64,
                        "Rate limit reached, waiting for next window"
                    );
                    std::thread::sleep(wait.max(Duration::from_millis(1)));
                }
            }
        }
    }

    /// Calls taken in the current window
    pub fn used(&self) -> u32 {
        self.state.lock().count
    }
}
