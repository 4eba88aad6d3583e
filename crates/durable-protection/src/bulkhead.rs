//! Bounded concurrency per domain or operation class.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use durable_types::OpId;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{ProtectionResult, Refusal};

/// Bounds the number of concurrent in-flight attempts. Refusal yields a
/// `Retry`; the executor has no visibility into when capacity frees up, so
/// a short fixed backoff is used regardless of implementation.
#[async_trait]
pub trait Bulkhead: Send + Sync {
    /// Attempt to acquire one slot for `op_id`. The returned
    /// [`BulkheadPermit`] releases the slot when dropped, so it is
    /// released on every exit path including hedge cancellation.
    async fn try_acquire(&self, op_id: &OpId) -> ProtectionResult<BulkheadPermit>;
}

/// RAII guard for a bulkhead slot. Dropping it releases the slot.
pub struct BulkheadPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Semaphore-backed bulkhead bounding concurrency to `limit` in-flight
/// attempts. Construct one instance per bounded class (domain, operation
/// type, …) and share it across callers of that class.
pub struct SemaphoreBulkhead {
    semaphore: Arc<Semaphore>,
    refusal_backoff: Duration,
}

impl SemaphoreBulkhead {
    /// Construct a bulkhead bounding concurrency to `limit`. Refusals
    /// report `refusal_backoff` as the suggested retry delay.
    pub fn new(limit: usize, refusal_backoff: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            refusal_backoff,
        }
    }
}

#[async_trait]
impl Bulkhead for SemaphoreBulkhead {
    async fn try_acquire(&self, _op_id: &OpId) -> ProtectionResult<BulkheadPermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(BulkheadPermit {
                _permit: Some(permit),
            }),
            Err(_) => Err(Refusal {
                retry_after: self.refusal_backoff,
                source: "bulkhead",
            }),
        }
    }
}

/// Never refuses. The default when no bulkhead is configured.
#[derive(Debug, Default)]
pub struct NoopBulkhead;

#[async_trait]
impl Bulkhead for NoopBulkhead {
    async fn try_acquire(&self, _op_id: &OpId) -> ProtectionResult<BulkheadPermit> {
        Ok(BulkheadPermit { _permit: None })
    }
}
