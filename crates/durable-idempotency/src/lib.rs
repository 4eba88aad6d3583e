#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-idempotency** – Idempotency manager port for the durable
//! operation orchestrator.
//!
//! The manager owns exactly one guarantee: for any set of concurrent
//! callers presenting the same [`IdempotencyKey`], exactly one [`OpId`] is
//! minted and every caller observes it. This crate defines the port and
//! ships an in-memory reference implementation; a production deployment
//! backs it with whatever unique-constraint or CAS primitive its store
//! offers.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use durable_types::{IdempotencyKey, OpId};
use tracing::debug;

/// Errors produced while minting or looking up an [`OpId`].
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    /// The backend is unreachable or returned an infrastructure error.
    /// Callers treat this as a transient condition.
    #[error("idempotency backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type returned by [`IdempotencyManager`] operations.
pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

/// Mints and recalls the single [`OpId`] associated with an
/// [`IdempotencyKey`].
///
/// Collisions across unrelated keys are forbidden: the mapping is
/// injective from the caller's point of view. Retention of the mapping is
/// a deployment concern — implementations only need to guarantee it
/// survives at least as long as any in-flight retry.
#[async_trait]
pub trait IdempotencyManager: Send + Sync {
    /// Return the existing `OpId` for `key`, or atomically mint and store
    /// a new one if none exists yet. Concurrent callers with an equal
    /// `key` must all observe the same resulting `OpId`.
    async fn get_or_create(&self, key: IdempotencyKey) -> IdempotencyResult<OpId>;
}

/// In-memory, non-persistent [`IdempotencyManager`] backed by a
/// concurrent hash map. Suitable for tests and single-process
/// development; the mapping does not survive a process restart.
#[derive(Debug, Default)]
pub struct MemoryIdempotencyManager {
    minted: Arc<DashMap<IdempotencyKey, OpId>>,
}

impl MemoryIdempotencyManager {
    /// Construct a new, empty in-memory manager.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyManager for MemoryIdempotencyManager {
    async fn get_or_create(&self, key: IdempotencyKey) -> IdempotencyResult<OpId> {
        if let Some(existing) = self.minted.get(&key) {
            return Ok(existing.clone());
        }

        // `entry` locks the shard for `key` for the duration of the
        // closure, so concurrent callers racing on an equal key are
        // serialized here rather than both minting a fresh OpId.
        let op_id = self
            .minted
            .entry(key)
            .or_insert_with(|| {
                let minted = OpId::new(uuid::Uuid::new_v4().to_string())
                    .expect("uuid v4 hyphenated string satisfies OpId charset and length");
                debug!(%minted, "minted new OpId for idempotency key");
                minted
            })
            .clone();

        Ok(op_id)
    }
}
