//! Hedged (parallel, speculative) attempts.

use std::time::Duration;

use async_trait::async_trait;
use durable_types::OpId;

/// Decides whether the executor should launch a parallel hedge attempt
/// after the primary attempt has been running for a while. The first
/// non-`Retry` response wins; the rest are cancelled. This is safe only
/// because the user action must be idempotent under the same `OpId`.
#[async_trait]
pub trait HedgePolicy: Send + Sync {
    /// Delay after which a hedge attempt is launched, if the primary
    /// attempt hasn't completed. `None` disables hedging for this
    /// attempt.
    async fn hedge_delay(&self, op_id: &OpId) -> Option<Duration>;

    /// Maximum number of hedge attempts (not counting the primary) the
    /// executor may launch for a single `execute` call.
    async fn max_hedges(&self, op_id: &OpId) -> usize;
}

/// Never hedges. The default when no hedge policy is configured.
#[derive(Debug, Default)]
pub struct NoopHedgePolicy;

#[async_trait]
impl HedgePolicy for NoopHedgePolicy {
    async fn hedge_delay(&self, _op_id: &OpId) -> Option<Duration> {
        None
    }

    async fn max_hedges(&self, _op_id: &OpId) -> usize {
        0
    }
}

/// Launches up to `max_hedges` parallel attempts, each `hedge_delay`
/// after the previous one, if the call hasn't completed yet.
#[derive(Debug, Clone, Copy)]
pub struct FixedHedgePolicy {
    delay: Duration,
    max_hedges: usize,
}

impl FixedHedgePolicy {
    /// Construct a policy hedging after `delay`, up to `max_hedges`
    /// parallel attempts.
    pub fn new(delay: Duration, max_hedges: usize) -> Self {
        Self { delay, max_hedges }
    }
}

#[async_trait]
impl HedgePolicy for FixedHedgePolicy {
    async fn hedge_delay(&self, _op_id: &OpId) -> Option<Duration> {
        if self.max_hedges == 0 {
            None
        } else {
            Some(self.delay)
        }
    }

    async fn max_hedges(&self, _op_id: &OpId) -> usize {
        self.max_hedges
    }
}
