//! Throttling policy shared by the transports.
//!
//! The WebSocket connect loop uses a [`TokenBucket`] so repeated dial
//! failures produce at most one warning per interval.

pub mod rate_limiter;

pub use rate_limiter::{RateLimiterConfig, TokenBucket};
