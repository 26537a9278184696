//! Per-source circuit breaker.
//!
//! Guards each remote patient source with an explicit tagged state machine:
//!
//! - `Closed`: calls flow normally; consecutive failures are counted.
//! - `Open`: the failure threshold was crossed; calls are refused without
//!   touching the network until the cool-down elapses.
//! - `HalfOpen`: the cool-down elapsed; calls are allowed through as
//!   probes. A success closes the breaker, a failure re-opens it and
//!   restarts the cool-down.
//!
//! Counters are shared across concurrent requests and mutated on every
//! fetch outcome. Updates are atomic per source (a single short mutex);
//! there is no cross-source ordering.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for one remote source.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cool_down: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    ///
    /// # Arguments
    ///
    /// * `name` - Source name, used in transition logs
    /// * `failure_threshold` - Consecutive failures that trip the breaker
    ///   (values below 1 are clamped to 1)
    /// * `cool_down` - How long the breaker refuses calls once open
    pub fn new(name: impl Into<String>, failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            cool_down,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// While `Open`, returns `false` until the cool-down has elapsed, at
    /// which point the breaker moves to `HalfOpen` and lets the call
    /// through as a probe.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock_inner();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cool_down {
                    inner.state = BreakerState::HalfOpen;
                    tracing::info!(source = %self.name, "circuit half-open, probing source");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call: the breaker closes and counters reset.
    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        if inner.state != BreakerState::Closed {
            tracing::info!(source = %self.name, "circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Records a failed call.
    ///
    /// A failure while `HalfOpen` re-opens immediately; otherwise the
    /// consecutive-failure count is incremented and the breaker trips once
    /// it reaches the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.lock_inner();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_open = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.consecutive_failures >= self.failure_threshold,
            BreakerState::Open => false,
        };
        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::warn!(
                source = %self.name,
                failures = inner.consecutive_failures,
                cool_down = ?self.cool_down,
                "circuit opened"
            );
        }
    }

    /// Current state tag.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock_inner();
        // Report the cool-down expiry without requiring a call attempt.
        if inner.state == BreakerState::Open {
            let elapsed = inner
                .opened_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= self.cool_down {
                inner.state = BreakerState::HalfOpen;
            }
        }
        inner.state
    }

    /// Consecutive failures recorded since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock_inner().consecutive_failures
    }

    /// Source name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    // State updates never panic mid-transition; recover from poisoning.
    fn lock_inner(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cool_down: Duration) -> CircuitBreaker {
        CircuitBreaker::new("patient-service", threshold, cool_down)
    }

    #[test]
    fn new_breaker_is_closed_and_allows_calls() {
        let breaker = breaker(3, Duration::from_secs(30));
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire());
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn trips_open_at_threshold() {
        let breaker = breaker(3, Duration::from_secs(30));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed, "below threshold stays closed");

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire(), "open breaker should refuse calls");
        assert_eq!(breaker.consecutive_failures(), 3);
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = breaker(3, Duration::from_secs(30));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(
            breaker.state(),
            BreakerState::Closed,
            "count should have restarted after the success"
        );
    }

    #[test]
    fn half_open_after_cool_down_then_closes_on_success() {
        let breaker = breaker(1, Duration::from_millis(20));

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.try_acquire(), "cool-down elapsed, probe should pass");
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn half_open_failure_reopens_and_restarts_cool_down() {
        let breaker = breaker(1, Duration::from_millis(40));

        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(50));
        assert!(breaker.try_acquire(), "probe should be allowed after cool-down");

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(
            !breaker.try_acquire(),
            "fresh cool-down should refuse calls again"
        );
    }

    #[test]
    fn threshold_is_clamped_to_at_least_one() {
        let breaker = breaker(0, Duration::from_secs(30));
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
