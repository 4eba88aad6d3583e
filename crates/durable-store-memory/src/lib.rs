#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-store-memory** – In-memory reference adapter for the
//! [`durable_store::Store`] port.
//!
//! This implementation keeps everything in process memory behind
//! `tokio::sync::RwLock`s. It provides no persistence guarantees of its
//! own — "durable before return" means durable for the lifetime of the
//! process — which makes it suitable for tests and single-process
//! development but not for production use across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use durable_state::{validate, StateError};
use durable_store::{Store, StoreError, StoreResult};
use durable_types::{Envelope, OpId, OperationState, Outcome, WalEntry, WalState};

/// An in-memory, non-persistent implementation of the [`Store`] port.
#[derive(Debug, Default)]
pub struct MemoryStore {
    envelopes: Arc<RwLock<HashMap<OpId, Envelope>>>,
    states: Arc<RwLock<HashMap<OpId, OperationState>>>,
    /// WAL rows per `OpId`, append-only and ordered by push order
    /// (`occurred_at` is monotonic for a single process).
    wal: Arc<RwLock<HashMap<OpId, Vec<WalEntry>>>>,
}

impl MemoryStore {
    /// Construct a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn store_envelope(&self, envelope: Envelope) -> StoreResult<()> {
        let mut envelopes = self.envelopes.write().await;
        if envelopes.contains_key(&envelope.op_id) {
            return Err(StoreError::AlreadyExists(envelope.op_id.clone()));
        }
        let op_id = envelope.op_id.clone();
        envelopes.insert(op_id.clone(), envelope);
        drop(envelopes);

        self.states
            .write()
            .await
            .insert(op_id.clone(), OperationState::Pending);
        debug!(%op_id, "envelope stored");
        Ok(())
    }

    async fn get_envelope(&self, op_id: &OpId) -> StoreResult<Option<Envelope>> {
        Ok(self.envelopes.read().await.get(op_id).cloned())
    }

    async fn get_state(&self, op_id: &OpId) -> StoreResult<Option<OperationState>> {
        Ok(self.states.read().await.get(op_id).copied())
    }

    async fn set_state(&self, op_id: &OpId, new_state: OperationState) -> StoreResult<()> {
        let mut states = self.states.write().await;
        let current = *states
            .get(op_id)
            .ok_or_else(|| StoreError::Conflict {
                op_id: op_id.clone(),
                source: StateError::IllegalTransition {
                    from: OperationState::Pending,
                    to: new_state,
                },
            })?;

        validate(current, new_state).map_err(|source| StoreError::Conflict {
            op_id: op_id.clone(),
            source,
        })?;

        states.insert(op_id.clone(), new_state);
        debug!(%op_id, %new_state, "state transitioned");
        Ok(())
    }

    async fn write_ahead(&self, op_id: &OpId, outcome: Outcome) -> StoreResult<()> {
        let entry = WalEntry::pending(op_id.clone(), outcome);
        self.wal
            .write()
            .await
            .entry(op_id.clone())
            .or_default()
            .push(entry);
        debug!(%op_id, "WAL row appended");
        Ok(())
    }

    async fn finalize(&self, op_id: &OpId, terminal_state: OperationState) -> StoreResult<()> {
        if !terminal_state.is_terminal() {
            return Err(StoreError::NotTerminal(terminal_state));
        }

        let mut states = self.states.write().await;
        let mut wal = self.wal.write().await;

        let current = *states
            .get(op_id)
            .ok_or_else(|| StoreError::Conflict {
                op_id: op_id.clone(),
                source: StateError::IllegalTransition {
                    from: OperationState::Pending,
                    to: terminal_state,
                },
            })?;

        let rows = wal
            .get_mut(op_id)
            .ok_or_else(|| StoreError::RetryNotFinalizable(op_id.clone()))?;
        let latest = rows
            .last_mut()
            .ok_or_else(|| StoreError::RetryNotFinalizable(op_id.clone()))?;

        if matches!(latest.outcome, Outcome::Retry { .. }) {
            return Err(StoreError::RetryNotFinalizable(op_id.clone()));
        }

        validate(current, terminal_state).map_err(|source| StoreError::Conflict {
            op_id: op_id.clone(),
            source,
        })?;

        // Both mutations below happen only once validation above has
        // succeeded — partial success is forbidden by the port contract.
        latest.wal_state = WalState::Completed;
        states.insert(op_id.clone(), terminal_state);
        debug!(%op_id, %terminal_state, "finalized");
        Ok(())
    }

    async fn scan_wa(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<OpId>> {
        let wal = self.wal.read().await;
        let mut out = Vec::new();
        for (op_id, rows) in wal.iter() {
            if let Some(latest) = rows.last() {
                if latest.wal_state == WalState::Pending && latest.occurred_at < older_than {
                    out.push(op_id.clone());
                }
            }
        }
        Ok(out)
    }

    async fn scan_in_progress(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<OpId>> {
        let states = self.states.read().await;
        let envelopes = self.envelopes.read().await;
        let mut out = Vec::new();
        for (op_id, state) in states.iter() {
            if *state != OperationState::InProgress {
                continue;
            }
            let accepted_at = envelopes.get(op_id).map(|e| e.accepted_at);
            if accepted_at.map(|t| t < older_than).unwrap_or(false) {
                out.push(op_id.clone());
            }
        }
        Ok(out)
    }

    async fn latest_wal_entry(&self, op_id: &OpId) -> StoreResult<Option<WalEntry>> {
        Ok(self
            .wal
            .read()
            .await
            .get(op_id)
            .and_then(|rows| rows.last().cloned()))
    }

    async fn attempt_count(&self, op_id: &OpId) -> StoreResult<u32> {
        Ok(self
            .wal
            .read()
            .await
            .get(op_id)
            .map(|rows| rows.len() as u32)
            .unwrap_or(0))
    }
}
