// crates/dcal-broker/src/rate_limiter.rs
// ============================================================================
// Module: Ingestion Rate Limiter
// Description: Token-bucket admission control for the ingestion consumer.
// Purpose: Bound sustained throughput while tolerating a configured burst,
//          applying cooperative backoff rather than dropping over-rate
//          traffic.
// Dependencies: std::sync, std::time
// ============================================================================

//! ## Overview
//! Unlike a fixed-window limiter, a token bucket replenishes continuously:
//! tokens accrue in proportion to elapsed wall-clock time, capped at the
//! configured burst, and are debited one per admitted message. A caller
//! that arrives with an empty bucket is told how long to wait rather than
//! being rejected outright, matching the rate-limit-exceeded handling in
//! spec §4.9 ("apply backoff ... do not drop").

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// Token-bucket configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Sustained admission rate, in tokens (messages) per second.
    pub rate_per_second: u32,
    /// Maximum tokens the bucket can hold, i.e. the allowed burst.
    pub burst: u32,
}

/// Decision returned by the limiter for one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitDecision {
    /// Admit the message; a token was debited.
    Allow,
    /// Apply cooperative backoff for the given duration before retrying.
    Limited {
        /// How long to sleep before the next admission check.
        retry_after: Duration,
    },
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single shared token bucket guarding the ingestion consumer's poll
/// loop.
pub struct TokenBucketLimiter {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    /// Creates a limiter whose bucket starts full (able to absorb an
    /// initial burst).
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, state: Mutex::new(BucketState { tokens: f64::from(config.burst), last_refill: Instant::now() }) }
    }

    /// Attempts to admit one message, refilling the bucket for elapsed
    /// time first.
    pub fn check(&self) -> RateLimitDecision {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let refill = elapsed * f64::from(self.config.rate_per_second);
        state.tokens = (state.tokens + refill).min(f64::from(self.config.burst));
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            RateLimitDecision::Allow
        } else {
            let deficit = 1.0 - state.tokens;
            let seconds_needed = deficit / f64::from(self.config.rate_per_second.max(1));
            RateLimitDecision::Limited { retry_after: Duration::from_secs_f64(seconds_needed) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_burst_then_limits() {
        let limiter = TokenBucketLimiter::new(RateLimitConfig { rate_per_second: 10, burst: 3 });
        assert_eq!(limiter.check(), RateLimitDecision::Allow);
        assert_eq!(limiter.check(), RateLimitDecision::Allow);
        assert_eq!(limiter.check(), RateLimitDecision::Allow);
        assert!(matches!(limiter.check(), RateLimitDecision::Limited { .. }));
    }

    #[test]
    fn refills_over_time() {
        let limiter = TokenBucketLimiter::new(RateLimitConfig { rate_per_second: 1_000, burst: 1 });
        assert_eq!(limiter.check(), RateLimitDecision::Allow);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(limiter.check(), RateLimitDecision::Allow);
    }
}
