//! Token-bucket rate limiting.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use durable_types::OpId;
use parking_lot::Mutex;

use crate::{ProtectionResult, Refusal};

/// Admission control keyed by attempt identity. A refusal is converted by
/// the executor into a `Retry` outcome with a backoff derived from the
/// configured refill rate.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Attempt to acquire one unit of capacity for `op_id`. Implementations
    /// may key capacity however they like (global, per-domain, per-key);
    /// `op_id` is accepted for tracing, not necessarily for bucketing.
    async fn try_acquire(&self, op_id: &OpId) -> ProtectionResult<()>;
}

/// Always admits. The default when no rate limiting is configured.
#[derive(Debug, Default)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn try_acquire(&self, _op_id: &OpId) -> ProtectionResult<()> {
        Ok(())
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Single shared token bucket. `capacity` bounds burst size; `refill_rate`
/// is tokens added per second. Construct one instance per rate-limited
/// resource class (domain, operation type, …) and share it across callers
/// of that class.
pub struct TokenBucketRateLimiter {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucketRateLimiter {
    /// Construct a bucket with the given burst `capacity` and
    /// `refill_rate` (tokens/second).
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    async fn try_acquire(&self, _op_id: &OpId) -> ProtectionResult<()> {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }

        let deficit = 1.0 - state.tokens;
        let retry_after = Duration::from_secs_f64((deficit / self.refill_rate).max(0.0));
        Err(Refusal {
            retry_after,
            source: "rate_limiter",
        })
    }
}
