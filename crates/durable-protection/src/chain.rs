//! Wires the admission-control policies together in the order the
//! orchestrator expects.

use std::sync::Arc;

use durable_types::OpId;
use tracing::debug;

use crate::{
    Bulkhead, BulkheadPermit, CircuitBreaker, HedgePolicy, NoopBulkhead, NoopCircuitBreaker,
    NoopHedgePolicy, NoopRateLimiter, NoopTimeoutPolicy, ProtectionResult, RateLimiter,
    TimeoutPolicy,
};

/// Proof that `op_id` was admitted through the full chain. Dropping it
/// releases any acquired bulkhead slot. The caller must report the
/// outcome via [`Admission::record_success`] or
/// [`Admission::record_failure`] so the circuit breaker can track it.
pub struct Admission {
    op_id: OpId,
    circuit_breaker: Arc<dyn CircuitBreaker>,
    _bulkhead_permit: BulkheadPermit,
}

impl Admission {
    /// Report that the guarded attempt succeeded.
    pub async fn record_success(&self) {
        self.circuit_breaker.record_success(&self.op_id).await;
    }

    /// Report that the guarded attempt failed.
    pub async fn record_failure(&self) {
        self.circuit_breaker.record_failure(&self.op_id).await;
    }
}

/// The protection chain: RateLimiter, then CircuitBreaker, then
/// Bulkhead, outer to inner, around the user action. TimeoutPolicy and
/// HedgePolicy are exposed for the executor to consult directly since
/// they govern how the action itself is invoked, not whether it's
/// admitted.
pub struct ProtectionChain {
    rate_limiter: Arc<dyn RateLimiter>,
    circuit_breaker: Arc<dyn CircuitBreaker>,
    bulkhead: Arc<dyn Bulkhead>,
    timeout_policy: Arc<dyn TimeoutPolicy>,
    hedge_policy: Arc<dyn HedgePolicy>,
}

impl ProtectionChain {
    /// Construct a chain from explicit policies.
    pub fn new(
        rate_limiter: Arc<dyn RateLimiter>,
        circuit_breaker: Arc<dyn CircuitBreaker>,
        bulkhead: Arc<dyn Bulkhead>,
        timeout_policy: Arc<dyn TimeoutPolicy>,
        hedge_policy: Arc<dyn HedgePolicy>,
    ) -> Self {
        Self {
            rate_limiter,
            circuit_breaker,
            bulkhead,
            timeout_policy,
            hedge_policy,
        }
    }

    /// A chain where every policy is a `NoOp` — nothing is ever refused.
    pub fn noop() -> Self {
        Self::new(
            Arc::new(NoopRateLimiter),
            Arc::new(NoopCircuitBreaker),
            Arc::new(NoopBulkhead),
            Arc::new(NoopTimeoutPolicy),
            Arc::new(NoopHedgePolicy),
        )
    }

    /// Run the chain outer-to-inner for `op_id`. On refusal at any stage,
    /// resources acquired by earlier stages are released before returning
    /// (the bulkhead is innermost and last, so only it can leak, and it
    /// is never reached on an earlier refusal).
    pub async fn admit(&self, op_id: &OpId) -> ProtectionResult<Admission> {
        self.rate_limiter.try_acquire(op_id).await?;
        self.circuit_breaker.try_acquire(op_id).await?;
        let permit = self.bulkhead.try_acquire(op_id).await?;
        debug!(%op_id, "admitted through protection chain");

        Ok(Admission {
            op_id: op_id.clone(),
            circuit_breaker: Arc::clone(&self.circuit_breaker),
            _bulkhead_permit: permit,
        })
    }

    /// Per-attempt timeout policy, for the executor to apply around the
    /// user action.
    pub fn timeout_policy(&self) -> &Arc<dyn TimeoutPolicy> {
        &self.timeout_policy
    }

    /// Hedge policy, for the executor to apply around the user action.
    pub fn hedge_policy(&self) -> &Arc<dyn HedgePolicy> {
        &self.hedge_policy
    }
}
