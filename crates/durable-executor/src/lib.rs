#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-executor** – The Accept / Execute / Finalize orchestrator.
//!
//! [`Executor::execute`] is the one public entry point: it mints an
//! `OpId` via the idempotency manager, durably accepts the command,
//! drives the user-supplied [`Action`] through the protection chain
//! (with per-attempt timeout and hedging), and finalizes the result —
//! or schedules a retry on the bus and returns immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use durable_bus::{Bus, BusError};
use durable_idempotency::{IdempotencyError, IdempotencyManager};
use durable_protection::ProtectionChain;
use durable_store::{Store, StoreError};
use durable_types::{Command, Envelope, OpId, OperationState, Outcome, Payload, ValidationError};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, instrument, warn};

/// A user-supplied, idempotent side effect invoked once per attempt.
///
/// Must be idempotent under the same `op_id` — the external system is
/// expected to deduplicate by `provider_txn_id` or an equivalent value
/// derived from it, since the executor may invoke `run` more than once
/// for the same operation (redelivery, duplicate Accept, hedging).
#[async_trait]
pub trait Action: Send + Sync {
    /// Execute one attempt and produce its [`Outcome`].
    async fn run(&self, op_id: &OpId, payload: &Payload) -> Outcome;
}

/// The result of a call to [`Executor::execute`].
#[derive(Debug, Clone)]
pub enum OperationHandle {
    /// The operation reached a terminal outcome synchronously, within
    /// this call.
    Completed {
        /// The operation's identity.
        op_id: OpId,
        /// The terminal outcome.
        outcome: Outcome,
    },
    /// The operation is still in flight — scheduled for redelivery or
    /// already being worked by another caller. Poll `queryStatus(op_id)`
    /// for the eventual result.
    Async {
        /// The operation's identity.
        op_id: OpId,
    },
}

impl OperationHandle {
    /// Construct a [`OperationHandle::Completed`].
    pub fn completed(op_id: OpId, outcome: Outcome) -> Self {
        Self::Completed { op_id, outcome }
    }

    /// Construct a [`OperationHandle::Async`].
    pub fn r#async(op_id: OpId) -> Self {
        Self::Async { op_id }
    }

    /// The operation's identity, regardless of variant.
    pub fn op_id(&self) -> &OpId {
        match self {
            Self::Completed { op_id, .. } | Self::Async { op_id } => op_id,
        }
    }
}

/// Errors that can surface from [`Executor::execute`].
///
/// Per the orchestrator's error-handling policy, `ALREADY_EXISTS` and
/// `CONFLICT` Store responses are recovered locally and never reach this
/// type; only conditions the executor genuinely cannot make progress on
/// do.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The command's idempotency key failed validation.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] ValidationError),
    /// The store backend is unavailable or returned an unexpected error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The bus backend is unavailable or returned an unexpected error.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    /// The idempotency manager backend is unavailable.
    #[error("idempotency manager error: {0}")]
    Idempotency(#[from] IdempotencyError),
}

/// Drives one [`Command`] through Accept, Execute, and Finalize.
pub struct Executor {
    store: Arc<dyn Store>,
    idempotency: Arc<dyn IdempotencyManager>,
    bus: Arc<dyn Bus>,
    protection: ProtectionChain,
    action: Arc<dyn Action>,
    max_attempts: u32,
    dlq_on_max_attempts: bool,
}

impl Executor {
    /// Construct an executor from its collaborating ports and the
    /// user-supplied action.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        idempotency: Arc<dyn IdempotencyManager>,
        bus: Arc<dyn Bus>,
        protection: ProtectionChain,
        action: Arc<dyn Action>,
        max_attempts: u32,
        dlq_on_max_attempts: bool,
    ) -> Self {
        Self {
            store,
            idempotency,
            bus,
            protection,
            action,
            max_attempts,
            dlq_on_max_attempts,
        }
    }

    /// Accept, execute, and finalize (or reschedule) `command`.
    #[instrument(skip(self, command), fields(domain = %command.domain, event_type = %command.event_type))]
    pub async fn execute(&self, command: Command) -> Result<OperationHandle, ExecutorError> {
        let key = command.key()?;
        let op_id = self.idempotency.get_or_create(key).await?;

        match self
            .store
            .store_envelope(Envelope::new(op_id.clone(), command.clone()))
            .await
        {
            Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
            Err(other) => return Err(other.into()),
        }

        match self.store.set_state(&op_id, OperationState::InProgress).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                if let Some(current) = self.store.get_state(&op_id).await? {
                    if current.is_terminal() {
                        let prior = self
                            .store
                            .latest_wal_entry(&op_id)
                            .await?
                            .map(|entry| entry.outcome);
                        return Ok(match prior {
                            Some(outcome) => OperationHandle::completed(op_id, outcome),
                            None => OperationHandle::r#async(op_id),
                        });
                    }
                    // Already IN_PROGRESS: proceed as a duplicate attempt.
                }
            }
            Err(other) => return Err(other.into()),
        }

        if self.store.attempt_count(&op_id).await? >= self.max_attempts {
            return self.force_max_attempts_fail(op_id, command).await;
        }

        let admission = match self.protection.admit(&op_id).await {
            Ok(admission) => admission,
            Err(refusal) => {
                let outcome = Outcome::retry_transient(refusal.retry_after, refusal.source);
                self.store.write_ahead(&op_id, outcome.clone()).await?;
                self.bus
                    .enqueue(op_id.clone(), command, refusal.retry_after)
                    .await?;
                return Ok(OperationHandle::r#async(op_id));
            }
        };

        let outcome = self.run_with_protection(&op_id, &command.payload).await;
        self.store.write_ahead(&op_id, outcome.clone()).await?;

        match &outcome {
            Outcome::Ok { .. } => {
                self.store.finalize(&op_id, OperationState::Completed).await?;
                admission.record_success().await;
                info!(%op_id, "operation completed");
                Ok(OperationHandle::completed(op_id, outcome))
            }
            Outcome::Fail { .. } => {
                self.store.finalize(&op_id, OperationState::Failed).await?;
                admission.record_failure().await;
                info!(%op_id, "operation failed terminally");
                Ok(OperationHandle::completed(op_id, outcome))
            }
            Outcome::Retry { delay, .. } => {
                admission.record_failure().await;
                self.bus.enqueue(op_id.clone(), command, *delay).await?;
                Ok(OperationHandle::r#async(op_id))
            }
        }
    }

    async fn force_max_attempts_fail(
        &self,
        op_id: OpId,
        command: Command,
    ) -> Result<OperationHandle, ExecutorError> {
        let outcome = Outcome::fail_business("MAX_ATTEMPTS", "attempt ceiling exhausted");
        self.store.write_ahead(&op_id, outcome.clone()).await?;
        self.store.finalize(&op_id, OperationState::Failed).await?;
        if self.dlq_on_max_attempts {
            self.bus
                .dead_letter_op(op_id.clone(), command, "attempt ceiling exhausted".into())
                .await?;
            warn!(%op_id, "operation exhausted max attempts, dead-lettered");
        }
        Ok(OperationHandle::completed(op_id, outcome))
    }

    /// Run the action through per-attempt timeout and hedging. The first
    /// non-`Retry` result wins; any still-running hedge attempts are
    /// dropped (and, for timed-out attempts, cancelled) without being
    /// awaited further.
    async fn run_with_protection(&self, op_id: &OpId, payload: &Payload) -> Outcome {
        let per_attempt_timeout = self.protection.timeout_policy().per_attempt_timeout(op_id).await;
        let hedge_delay = self.protection.hedge_policy().hedge_delay(op_id).await;
        let mut hedges_remaining = self.protection.hedge_policy().max_hedges(op_id).await;

        let mut attempts: FuturesUnordered<BoxFuture<'_, Outcome>> = FuturesUnordered::new();
        attempts.push(self.run_single_attempt(op_id, payload, per_attempt_timeout));

        let mut next_hedge = hedge_delay
            .filter(|_| hedges_remaining > 0)
            .map(|delay| Box::pin(tokio::time::sleep(delay)));
        let mut last_retry: Option<Outcome> = None;

        loop {
            tokio::select! {
                biased;
                Some(outcome) = attempts.next() => {
                    if !matches!(outcome, Outcome::Retry { .. }) {
                        return outcome;
                    }
                    let exhausted = attempts.is_empty() && next_hedge.is_none();
                    last_retry = Some(outcome);
                    if exhausted {
                        return last_retry.expect("set immediately above");
                    }
                }
                _ = next_hedge.as_mut().unwrap(), if next_hedge.is_some() => {
                    hedges_remaining -= 1;
                    attempts.push(self.run_single_attempt(op_id, payload, per_attempt_timeout));
                    next_hedge = hedge_delay
                        .filter(|_| hedges_remaining > 0)
                        .map(|delay| Box::pin(tokio::time::sleep(delay)));
                }
            }
        }
    }

    fn run_single_attempt<'a>(
        &'a self,
        op_id: &'a OpId,
        payload: &'a Payload,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let fut = self.action.run(op_id, payload);
            match timeout {
                Some(timeout) if !timeout.is_zero() => match tokio::time::timeout(timeout, fut).await {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::retry_transient(Duration::from_secs(1), "attempt timed out"),
                },
                _ => fut.await,
            }
        })
    }
}
