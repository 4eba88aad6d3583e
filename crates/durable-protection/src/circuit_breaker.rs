//! Circuit breaker with deterministic threshold-based transitions.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use durable_types::OpId;
use parking_lot::Mutex;

use crate::{ProtectionResult, Refusal};

/// Observable state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls are admitted normally.
    Closed,
    /// Calls are refused until the reset window elapses.
    Open,
    /// A single trial call is admitted to probe recovery.
    HalfOpen,
}

/// Protects a downstream dependency from sustained failure by refusing
/// calls once a failure threshold is crossed, and probing recovery after a
/// reset window.
#[async_trait]
pub trait CircuitBreaker: Send + Sync {
    /// Check whether a call should be admitted. Refuses while `Open`.
    async fn try_acquire(&self, op_id: &OpId) -> ProtectionResult<()>;

    /// Record that the guarded call succeeded, driving `HalfOpen ->
    /// Closed` or resetting the failure count in `Closed`.
    async fn record_success(&self, op_id: &OpId);

    /// Record that the guarded call failed, driving `Closed -> Open`
    /// once the failure threshold is crossed, or `HalfOpen -> Open`
    /// immediately.
    async fn record_failure(&self, op_id: &OpId);

    /// Current state, for introspection and tests.
    fn state(&self) -> BreakerState;
}

/// Never trips. The default when no circuit breaking is configured.
#[derive(Debug, Default)]
pub struct NoopCircuitBreaker;

#[async_trait]
impl CircuitBreaker for NoopCircuitBreaker {
    async fn try_acquire(&self, _op_id: &OpId) -> ProtectionResult<()> {
        Ok(())
    }

    async fn record_success(&self, _op_id: &OpId) {}

    async fn record_failure(&self, _op_id: &OpId) {}

    fn state(&self) -> BreakerState {
        BreakerState::Closed
    }
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Threshold-based circuit breaker: opens after `failure_threshold`
/// consecutive failures, stays open for `reset_timeout`, then admits one
/// half-open trial. Transitions are deterministic given the sequence of
/// `record_success`/`record_failure` calls and elapsed time.
pub struct StandardCircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl StandardCircuitBreaker {
    /// Construct a breaker that opens after `failure_threshold`
    /// consecutive failures and waits `reset_timeout` before probing
    /// recovery.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    fn reset_window_remaining(&self, inner: &Inner) -> Duration {
        match inner.opened_at {
            Some(opened_at) => {
                let elapsed = opened_at.elapsed();
                self.reset_timeout.saturating_sub(elapsed)
            }
            None => self.reset_timeout,
        }
    }
}

#[async_trait]
impl CircuitBreaker for StandardCircuitBreaker {
    async fn try_acquire(&self, _op_id: &OpId) -> ProtectionResult<()> {
        let mut inner = self.inner.lock();

        if inner.state == BreakerState::Open {
            let remaining = self.reset_window_remaining(&inner);
            if remaining > Duration::ZERO {
                return Err(Refusal {
                    retry_after: remaining,
                    source: "circuit_breaker",
                });
            }
            inner.state = BreakerState::HalfOpen;
        }

        Ok(())
    }

    async fn record_success(&self, _op_id: &OpId) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
    }

    async fn record_failure(&self, _op_id: &OpId) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Closed | BreakerState::Open => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }

    fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}
