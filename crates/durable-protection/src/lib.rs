#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-protection** – The protection chain wrapped around every user
//! action: RateLimiter, CircuitBreaker, Bulkhead, TimeoutPolicy, and
//! HedgePolicy.
//!
//! Every policy is a trait with a `NoOp` default so a deployment can opt
//! into only the protections it needs. [`ProtectionChain`] wires them
//! together in the fixed outer-to-inner order the orchestrator expects:
//! RateLimiter, CircuitBreaker, Bulkhead — the user action and its
//! timeout/hedge handling live one layer up, in the executor.

mod bulkhead;
mod chain;
mod circuit_breaker;
mod hedge;
mod rate_limiter;
mod timeout;

pub use bulkhead::{Bulkhead, BulkheadPermit, NoopBulkhead, SemaphoreBulkhead};
pub use chain::{Admission, ProtectionChain};
pub use circuit_breaker::{BreakerState, CircuitBreaker, NoopCircuitBreaker, StandardCircuitBreaker};
pub use hedge::{FixedHedgePolicy, HedgePolicy, NoopHedgePolicy};
pub use rate_limiter::{NoopRateLimiter, RateLimiter, TokenBucketRateLimiter};
pub use timeout::{FixedTimeoutPolicy, NoopTimeoutPolicy, TimeoutPolicy};

use std::time::Duration;

/// A policy in the chain refused to admit the attempt.
///
/// The executor converts this into a `Retry` outcome sized by
/// `retry_after`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{source} refused admission, retry after {retry_after:?}")]
pub struct Refusal {
    /// How long the caller should wait before trying again.
    pub retry_after: Duration,
    /// Which policy refused (`"rate_limiter"`, `"circuit_breaker"`, or
    /// `"bulkhead"`).
    pub source: &'static str,
}

/// Result type returned by protection-chain operations.
pub type ProtectionResult<T> = Result<T, Refusal>;
