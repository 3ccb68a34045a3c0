// crates/dcal-core/src/runtime/breaker.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Per-dependency CLOSED/OPEN/HALF_OPEN state machine (C8).
// Purpose: Track consecutive failures for one external dependency and gate
//          calls to it once the failure threshold is crossed.
// Dependencies: std::sync::Mutex, std::time::Instant
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through normally.
    Closed,
    /// Calls are fast-failed without reaching the dependency.
    Open,
    /// A limited number of probe calls are allowed through.
    HalfOpen,
}

/// Tuning parameters for one breaker instance.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that trip CLOSED → OPEN (default 5).
    pub failure_threshold: u32,
    /// How long OPEN holds before probing HALF_OPEN (default 30s).
    pub timeout: Duration,
    /// Maximum concurrent probe calls allowed in HALF_OPEN (default 3).
    pub half_open_max_calls: u32,
    /// Consecutive HALF_OPEN successes that close the breaker (default 3).
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
            success_threshold: 3,
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_calls_in_flight: u32,
    opened_at: Option<Instant>,
}

/// A circuit breaker guarding one external dependency. `call` decides
/// whether the call may proceed; `record_success`/`record_failure` report
/// the outcome afterward.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Whether a call through the breaker is permitted right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPermit {
    /// The call may proceed.
    Allowed,
    /// The breaker is open; fail fast without attempting the call.
    Rejected,
}

impl CircuitBreaker {
    /// Builds a breaker in the CLOSED state.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                half_open_calls_in_flight: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns the current state, first advancing OPEN → HALF_OPEN if
    /// `timeout` has elapsed.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.maybe_transition_to_half_open(&mut guard);
        guard.state
    }

    /// Decides whether a call may proceed, admitting at most
    /// `half_open_max_calls` concurrent probes while HALF_OPEN.
    pub fn try_call(&self) -> CallPermit {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.maybe_transition_to_half_open(&mut guard);
        match guard.state {
            BreakerState::Closed => CallPermit::Allowed,
            BreakerState::Open => CallPermit::Rejected,
            BreakerState::HalfOpen => {
                if guard.half_open_calls_in_flight < self.config.half_open_max_calls {
                    guard.half_open_calls_in_flight += 1;
                    CallPermit::Allowed
                } else {
                    CallPermit::Rejected
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.consecutive_failures = 0;
        match guard.state {
            BreakerState::Closed => {}
            BreakerState::HalfOpen => {
                guard.half_open_calls_in_flight = guard.half_open_calls_in_flight.saturating_sub(1);
                guard.consecutive_successes += 1;
                if guard.consecutive_successes >= self.config.success_threshold {
                    guard.state = BreakerState::Closed;
                    guard.consecutive_successes = 0;
                    guard.opened_at = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Records a failed call, tripping or re-opening the breaker as
    /// appropriate.
    pub fn record_failure(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.consecutive_successes = 0;
        match guard.state {
            BreakerState::Closed => {
                guard.consecutive_failures += 1;
                if guard.consecutive_failures >= self.config.failure_threshold {
                    guard.state = BreakerState::Open;
                    guard.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                guard.half_open_calls_in_flight = guard.half_open_calls_in_flight.saturating_sub(1);
                guard.state = BreakerState::Open;
                guard.opened_at = Some(Instant::now());
            }
            BreakerState::Open => {}
        }
    }

    fn maybe_transition_to_half_open(&self, guard: &mut BreakerInner) {
        if guard.state == BreakerState::Open {
            if let Some(opened_at) = guard.opened_at {
                if opened_at.elapsed() >= self.config.timeout {
                    guard.state = BreakerState::HalfOpen;
                    guard.half_open_calls_in_flight = 0;
                    guard.consecutive_successes = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig { failure_threshold: 2, timeout: Duration::from_millis(10), half_open_max_calls: 1, success_threshold: 1 }
    }

    #[test]
    fn trips_open_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.try_call(), CallPermit::Rejected);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.try_call(), CallPermit::Allowed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(breaker.try_call(), CallPermit::Allowed);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
