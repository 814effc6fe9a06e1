//! Token bucket used to throttle repetitive events such as log lines.
//!
//! Tokens accrue at `refill_rate` tokens/second up to `capacity`. Each event
//! consumes one token; when none is available `try_acquire` returns `false`
//! and the event should be suppressed.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Token bucket configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum tokens in the bucket (burst size).
    pub capacity: f64,
    /// Token refill rate (tokens per second).
    pub refill_rate: f64,
}

impl RateLimiterConfig {
    /// `burst` events at once, then one event per `interval`.
    pub fn every(interval: Duration, burst: u32) -> Self {
        let secs = interval.as_secs_f64();
        Self {
            capacity: f64::from(burst.max(1)),
            refill_rate: if secs > 0.0 { 1.0 / secs } else { f64::INFINITY },
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket.
pub struct TokenBucket {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let new_tokens = elapsed * self.config.refill_rate;
        if new_tokens.is_finite() {
            state.tokens = (state.tokens + new_tokens).min(self.config.capacity);
        } else {
            state.tokens = self.config.capacity;
        }
        state.last_refill = now;
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.config.capacity)
            .field("refill_rate", &self.config.refill_rate)
            .finish()
    }
}
