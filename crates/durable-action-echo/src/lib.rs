#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-action-echo** – Reference [`Action`] implementation.
//!
//! `EchoAction` is the simplest possible idempotent external side effect:
//! it "calls a provider" that deterministically derives its transaction id
//! from the `OpId` and echoes the payload back unchanged. It exists for
//! tests and demos, the way `toka-action-echo`-style stub adapters sit
//! beside the teacher's real kernel/runtime so examples and integration
//! tests don't need a live external dependency.
//!
//! [`CountingEchoAction`] wraps it with an observation counter keyed by
//! `OpId`, so tests can assert the at-most-one-side-effect property (P6)
//! holds across retries, duplicate Accept, and hedged attempts.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use durable_executor::Action;
use durable_types::{OpId, Outcome, Payload};
use tracing::debug;

/// Derives a provider transaction id from `op_id` so that two invocations
/// of the same attempt are always recognized as the same transaction by
/// the (simulated) provider, regardless of how many times the executor
/// calls `run`.
fn provider_txn_id(op_id: &OpId) -> String {
    format!("echo-{op_id}")
}

/// Echoes the payload back as the result. Always succeeds; useful as the
/// default `Action` in examples and as a baseline in integration tests
/// that don't care about failure or retry behavior.
#[derive(Debug, Default)]
pub struct EchoAction;

#[async_trait]
impl Action for EchoAction {
    async fn run(&self, op_id: &OpId, payload: &Payload) -> Outcome {
        debug!(%op_id, "echo action invoked");
        Outcome::ok(provider_txn_id(op_id), payload.clone())
    }
}

/// Wraps any [`Action`] and counts how many times `run` actually reached
/// the point of producing a non-retry outcome for each `OpId`, so tests
/// can assert the external effect is observed at most once per operation
/// even when the executor retries, redelivers, or hedges.
pub struct CountingEchoAction {
    inner: Arc<dyn Action>,
    observations: DashMap<OpId, AtomicU32>,
}

impl CountingEchoAction {
    /// Wrap `inner`, counting its non-retry invocations per `OpId`.
    pub fn wrapping(inner: Arc<dyn Action>) -> Self {
        Self {
            inner,
            observations: DashMap::new(),
        }
    }

    /// Construct a counting wrapper around a plain [`EchoAction`].
    pub fn new() -> Self {
        Self::wrapping(Arc::new(EchoAction))
    }

    /// How many times a non-retry outcome was produced for `op_id`. Under
    /// property P6, this must never exceed 1 once the operation is
    /// terminal — callers typically assert this after draining all
    /// retries to completion.
    pub fn observation_count(&self, op_id: &OpId) -> u32 {
        self.observations
            .get(op_id)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl Default for CountingEchoAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for CountingEchoAction {
    async fn run(&self, op_id: &OpId, payload: &Payload) -> Outcome {
        let outcome = self.inner.run(op_id, payload).await;
        if outcome.is_terminal() {
            self.observations
                .entry(op_id.clone())
                .or_insert_with(|| AtomicU32::new(0))
                .fetch_add(1, Ordering::SeqCst);
        }
        outcome
    }
}
