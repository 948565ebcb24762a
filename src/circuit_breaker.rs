//! Per-destination circuit breaker.
//!
//! Each provider owns exactly one breaker. All four mutable fields live behind a single
//! `RwLock`: `is_allowed` takes the read side first and only upgrades to the write side
//! (re-checking under it) when it has to move `Open → HalfOpen`.
//!
//! ```text
//! Closed ──(max_failures failures)──► Open ──(open_timeout elapsed)──► HalfOpen
//!   ▲                                  ▲                                  │
//!   └──────────────(success)───────────┼──────────────────────────────────┤
//!                                      └────────────(failure)─────────────┘
//! ```

use crate::clock::{Clock, MonotonicClock};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Refuses attempts until the open timeout elapses.
    Open,
    /// Trial mode: attempts are let through to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerError {
    /// Failure threshold must be > 0.
    #[error("max_failures must be > 0 (got {provided})")]
    InvalidMaxFailures {
        /// Value provided by caller.
        provided: usize,
    },
    /// Open timeout must be > 0.
    #[error("open_timeout must be > 0 (got {0:?})")]
    InvalidOpenTimeout(Duration),
}

/// Validated configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    max_failures: usize,
    open_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Create a config with validation.
    pub fn new(max_failures: usize, open_timeout: Duration) -> Result<Self, CircuitBreakerError> {
        if max_failures == 0 {
            return Err(CircuitBreakerError::InvalidMaxFailures { provided: max_failures });
        }
        if open_timeout.is_zero() {
            return Err(CircuitBreakerError::InvalidOpenTimeout(open_timeout));
        }
        Ok(Self { max_failures, open_timeout })
    }

    /// Failures recorded while Closed before the circuit opens.
    pub fn max_failures(&self) -> usize {
        self.max_failures
    }

    /// Time since the last failure after which an Open circuit admits a trial attempt.
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { max_failures: 5, open_timeout: Duration::from_secs(60) }
    }
}

/// Point-in-time view of a breaker, used for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: usize,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    last_failure: Duration,
}

/// Failure-tracking state machine guarding one destination.
///
/// Not `Clone`: each breaker belongs to exactly one provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a closed breaker. `name` identifies the destination in logs.
    ///
    /// # Examples
    /// ```
    /// use telemetry_forwarder::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    /// let breaker = CircuitBreaker::new("Honeycomb", CircuitBreakerConfig::default());
    /// assert!(breaker.is_allowed());
    /// assert_eq!(breaker.state(), CircuitState::Closed);
    /// ```
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: Duration::ZERO,
            }),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Destination this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Threshold and cool-down in effect.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without triggering the Open → HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        self.read().state
    }

    /// Failures counted since the circuit last closed. Zero unless Closed.
    pub fn failure_count(&self) -> usize {
        self.read().failure_count
    }

    /// State and failure count read under one lock.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let guard = self.read();
        CircuitSnapshot { state: guard.state, failure_count: guard.failure_count }
    }

    /// Whether an attempt against the destination is currently permitted.
    ///
    /// An Open circuit whose timeout has elapsed moves to HalfOpen and admits the caller.
    /// Callers racing through that window may all be admitted; only the transition itself
    /// is serialized.
    pub fn is_allowed(&self) -> bool {
        {
            let guard = self.read();
            match guard.state {
                CircuitState::Closed | CircuitState::HalfOpen => return true,
                CircuitState::Open if !self.open_timeout_elapsed(&guard) => return false,
                CircuitState::Open => {}
            }
        }

        let mut guard = self.write();
        let current = guard.state;
        match current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open if self.open_timeout_elapsed(&guard) => {
                guard.state = CircuitState::HalfOpen;
                tracing::info!(provider = %self.name, "Circuit breaker → half-open: admitting a trial attempt");
                true
            }
            CircuitState::Open => false,
        }
    }

    /// Record a delivered event. Closes a HalfOpen circuit; no-op otherwise.
    pub fn record_success(&self) {
        let mut guard = self.write();
        if guard.state == CircuitState::HalfOpen {
            guard.state = CircuitState::Closed;
            guard.failure_count = 0;
            tracing::info!(provider = %self.name, "Circuit breaker → closed: destination recovered");
        }
    }

    /// Record a failed delivery.
    ///
    /// Always refreshes the last-failure time. While Closed the failure is counted and the
    /// circuit opens on reaching `max_failures`; the counter restarts at zero once open.
    /// A failure while HalfOpen reopens immediately.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut guard = self.write();
        guard.last_failure = now;

        let current = guard.state;
        match current {
            CircuitState::Closed => {
                guard.failure_count += 1;
                if guard.failure_count >= self.config.max_failures {
                    let failures = guard.failure_count;
                    guard.state = CircuitState::Open;
                    guard.failure_count = 0;
                    tracing::error!(
                        provider = %self.name,
                        failures,
                        threshold = self.config.max_failures,
                        "Circuit breaker → open: refusing deliveries"
                    );
                }
            }
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open;
                tracing::warn!(provider = %self.name, "Circuit breaker: trial attempt failed → open");
            }
            CircuitState::Open => {}
        }
    }

    fn open_timeout_elapsed(&self, state: &BreakerState) -> bool {
        self.clock.now().saturating_sub(state.last_failure) > self.config.open_timeout
    }

    fn read(&self) -> RwLockReadGuard<'_, BreakerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BreakerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(max_failures: usize, open_timeout_ms: u64) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new();
        let config =
            CircuitBreakerConfig::new(max_failures, Duration::from_millis(open_timeout_ms))
                .expect("valid config");
        (CircuitBreaker::new("test", config).with_clock(clock.clone()), clock)
    }

    fn open(breaker: &CircuitBreaker) {
        for _ in 0..breaker.config().max_failures() {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn rejects_zero_max_failures() {
        let err = CircuitBreakerConfig::new(0, Duration::from_secs(1))
            .expect_err("zero failures should be invalid");
        assert_eq!(err, CircuitBreakerError::InvalidMaxFailures { provided: 0 });
    }

    #[test]
    fn rejects_zero_open_timeout() {
        let err = CircuitBreakerConfig::new(1, Duration::ZERO)
            .expect_err("zero timeout should be invalid");
        assert_eq!(err, CircuitBreakerError::InvalidOpenTimeout(Duration::ZERO));
    }

    #[test]
    fn starts_closed_and_allows() {
        let (breaker, _) = breaker(3, 1_000);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.is_allowed());
    }

    #[test]
    fn opens_after_max_failures_and_refuses_immediately() {
        let (breaker, _) = breaker(3, 1_000);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 2);
        assert!(breaker.is_allowed());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_allowed());
    }

    #[test]
    fn failure_count_is_zero_outside_closed() {
        let (breaker, _) = breaker(2, 1_000);
        open(&breaker);
        assert_eq!(breaker.snapshot(), CircuitSnapshot { state: CircuitState::Open, failure_count: 0 });
    }

    #[test]
    fn open_timeout_must_be_exceeded_not_just_reached() {
        let (breaker, clock) = breaker(1, 100);
        open(&breaker);

        clock.advance(Duration::from_millis(100));
        assert!(!breaker.is_allowed(), "exactly the timeout is not enough");
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(1));
        assert!(breaker.is_allowed());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_failure_reopens_without_counting() {
        let (breaker, clock) = breaker(5, 100);
        open(&breaker);
        clock.advance(Duration::from_millis(150));
        assert!(breaker.is_allowed());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_allowed(), "reopened circuit restarts its cool-down");

        clock.advance(Duration::from_millis(150));
        assert!(breaker.is_allowed());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let (breaker, clock) = breaker(2, 100);
        open(&breaker);
        clock.advance(Duration::from_millis(101));
        assert!(breaker.is_allowed());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);

        // A fresh run of max_failures is needed to open again.
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn success_while_closed_leaves_the_counter_alone() {
        let (breaker, _) = breaker(3, 1_000);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 2);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn failure_while_open_extends_the_cool_down() {
        let (breaker, clock) = breaker(1, 100);
        open(&breaker);

        clock.advance(Duration::from_millis(80));
        breaker.record_failure();
        clock.advance(Duration::from_millis(80));
        assert!(!breaker.is_allowed(), "late failure from an in-flight send refreshes the timer");

        clock.advance(Duration::from_millis(30));
        assert!(breaker.is_allowed());
    }

    #[test]
    fn breakers_are_independent() {
        let (a, _) = breaker(1, 1_000);
        let (b, _) = breaker(1, 1_000);
        a.record_failure();
        assert_eq!(a.state(), CircuitState::Open);
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.is_allowed());
    }

    #[test]
    fn concurrent_callers_after_timeout_are_all_admitted() {
        let (breaker, clock) = breaker(1, 10);
        open(&breaker);
        clock.advance(Duration::from_millis(20));

        let breaker = Arc::new(breaker);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                std::thread::spawn(move || breaker.is_allowed())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().expect("thread panicked"));
        }
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn state_display_is_lowercase() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
        assert_eq!(CircuitState::Open.to_string(), "open");
    }
}
