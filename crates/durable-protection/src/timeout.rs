//! Per-attempt timeout policy.

use std::time::Duration;

use async_trait::async_trait;
use durable_types::OpId;

/// Decides how long a single attempt is allowed to run before the
/// executor converts it into a transient `Retry`.
#[async_trait]
pub trait TimeoutPolicy: Send + Sync {
    /// Per-attempt timeout for `op_id`. `None` (or a zero duration) means
    /// no timeout is enforced.
    async fn per_attempt_timeout(&self, op_id: &OpId) -> Option<Duration>;
}

/// No timeout is ever enforced. The default when no timeout policy is
/// configured.
#[derive(Debug, Default)]
pub struct NoopTimeoutPolicy;

#[async_trait]
impl TimeoutPolicy for NoopTimeoutPolicy {
    async fn per_attempt_timeout(&self, _op_id: &OpId) -> Option<Duration> {
        None
    }
}

/// Applies the same fixed timeout to every attempt.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeoutPolicy {
    timeout: Duration,
}

impl FixedTimeoutPolicy {
    /// Construct a policy enforcing `timeout` on every attempt. A zero
    /// duration disables the timeout, matching [`TimeoutPolicy`]'s
    /// contract.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TimeoutPolicy for FixedTimeoutPolicy {
    async fn per_attempt_timeout(&self, _op_id: &OpId) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }
}
