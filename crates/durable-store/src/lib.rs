#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-store** – Store port for the durable operation orchestrator.
//!
//! This crate defines the contracts a persistence backend must satisfy —
//! envelope storage, state CAS, WAL append/finalize, and the recovery
//! scans — without providing a concrete implementation. Backends (SQL, KV
//! stores, or the in-memory reference adapter in `durable-store-memory`)
//! implement [`Store`] in their own crates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use durable_state::StateError;
use durable_types::{Envelope, OpId, OperationState, Outcome};

/// Errors produced by a [`Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `storeEnvelope` was called for an `OpId` that already has an
    /// envelope. Envelopes are first-write-wins and immutable.
    #[error("envelope already exists for {0}")]
    AlreadyExists(OpId),
    /// A compare-and-set operation (`setState` or `finalize`) lost the
    /// race: the observed state no longer matches what the caller
    /// expected. Neither side of a `finalize` CAS is modified on this
    /// error.
    #[error("CAS conflict for {op_id}: {source}")]
    Conflict {
        /// The operation whose CAS lost.
        op_id: OpId,
        /// The underlying state-machine violation, if the conflict was a
        /// transition validity failure rather than a bare version race.
        #[source]
        source: StateError,
    },
    /// `finalize` was called but the most recent WAL row for this `OpId`
    /// carries a `Retry` outcome. Retries never finalize.
    #[error("cannot finalize {0}: most recent WAL row is a Retry outcome")]
    RetryNotFinalizable(OpId),
    /// The requested terminal state is not actually terminal.
    #[error("{0} is not a terminal state")]
    NotTerminal(OperationState),
    /// The backend is unreachable or returned an infrastructure error.
    /// Callers treat this as a transient condition (`Retry`).
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type returned by [`Store`] operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage contract for envelopes, operation state, and the WAL.
///
/// All methods must be durable before returning: a successful
/// `store_envelope`, `write_ahead`, or `finalize` call guarantees the
/// written data survives a crash of the calling process.
#[async_trait]
pub trait Store: Send + Sync {
    /// First-write-wins envelope storage. Fails with
    /// [`StoreError::AlreadyExists`] if an envelope already exists for
    /// `envelope.op_id` — callers treat this as re-entry, not an error.
    async fn store_envelope(&self, envelope: Envelope) -> StoreResult<()>;

    /// Point read of the envelope for `op_id`, if any.
    async fn get_envelope(&self, op_id: &OpId) -> StoreResult<Option<Envelope>>;

    /// Point read of the current state for `op_id`, if any.
    async fn get_state(&self, op_id: &OpId) -> StoreResult<Option<OperationState>>;

    /// Compare-and-set the operation's state, validating the transition
    /// with `durable_state::validate`. Fails with [`StoreError::Conflict`]
    /// if the current state has moved since the caller last observed it,
    /// or if the transition itself is illegal.
    async fn set_state(&self, op_id: &OpId, new_state: OperationState) -> StoreResult<()>;

    /// Append a WAL row for `op_id` with `wal_state = Pending`. Multiple
    /// calls for the same `OpId` are allowed — one per attempt — and are
    /// ordered by `occurred_at`.
    async fn write_ahead(&self, op_id: &OpId, outcome: Outcome) -> StoreResult<()>;

    /// Atomically finalize `op_id` to `terminal_state`: validate the
    /// `InProgress -> terminal_state` transition, flip the most recent WAL
    /// row to `Completed`, and set the operation state — or do none of it.
    /// Fails with [`StoreError::RetryNotFinalizable`] if the latest WAL
    /// outcome is a `Retry`, and with [`StoreError::NotTerminal`] if
    /// `terminal_state` isn't terminal.
    async fn finalize(&self, op_id: &OpId, terminal_state: OperationState) -> StoreResult<()>;

    /// Return `OpId`s with a WAL row in `Pending` whose `occurred_at` is
    /// older than `older_than`. Input to the recovery sweeper's
    /// WA-PENDING pass.
    async fn scan_wa(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<OpId>>;

    /// Return `OpId`s currently `InProgress` since before `older_than`.
    /// Input to the recovery sweeper's IN_PROGRESS pass.
    async fn scan_in_progress(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<OpId>>;

    /// The most recent WAL row recorded for `op_id`, if any. Used by the
    /// recovery sweeper and by `finalize` to decide whether the latest
    /// outcome is finalizable.
    async fn latest_wal_entry(
        &self,
        op_id: &OpId,
    ) -> StoreResult<Option<durable_types::WalEntry>>;

    /// Number of WAL rows recorded for `op_id` so far — one per attempt.
    /// Used by the executor to enforce the configured attempt ceiling.
    async fn attempt_count(&self, op_id: &OpId) -> StoreResult<u32>;
}
