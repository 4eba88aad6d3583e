#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-runtime** – Facade wiring the durable operation orchestrator
//! together.
//!
//! This is the crate an embedding application depends on directly: it
//! owns [`Config`], assembles the Store/Bus/Idempotency/Protection ports
//! into an [`durable_executor::Executor`], starts the recovery
//! [`durable_sweeper::Sweeper`], and exposes the two inbound ports the
//! specification calls for — `execute` and `query_status` — behind a
//! single [`Runtime`] handle, the way `toka-runtime::Runtime` bundles the
//! kernel, storage, and bus behind one entry point for its embedding
//! application.
//!
//! Concrete backends are an adapter concern: this crate ships only the
//! in-memory reference adapters (`durable-store-memory`, the in-memory
//! `Bus`/`IdempotencyManager`). A deployment wanting SQL/KV storage or a
//! broker-backed bus builds its own `Runtime::new` call with its own
//! `Arc<dyn Store>` / `Arc<dyn Bus>`, exactly as `toka-runtime` selects
//! among `toka-store-memory` / `toka-store-sled` / `toka-store-sqlite`
//! behind Cargo features rather than hard-coding one backend.

use std::sync::Arc;
use std::time::Duration;

use durable_bus::{Bus, MemoryBus};
use durable_executor::{Action, Executor, ExecutorError, OperationHandle};
use durable_idempotency::{IdempotencyManager, MemoryIdempotencyManager};
use durable_protection::ProtectionChain;
use durable_store::{Store, StoreError};
use durable_store_memory::MemoryStore;
use durable_sweeper::{Sweeper, SweeperHandle};
use durable_types::{Command, OpId, OperationState, Outcome};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The recognized configuration knobs from the orchestrator's external
/// interface, with a `Default` impl matching the reference deployment
/// values. Loading this struct from a file or environment is explicitly
/// out of scope for the core — see `toka_runtime::RuntimeConfig`, which
/// the embedding binary likewise constructs itself (from CLI flags, a
/// config file, or a test fixture) rather than receiving a loader from
/// the crate it configures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sweeper age threshold for WA-PENDING recovery.
    pub wal_budget_ms: u64,
    /// Sweeper age threshold for IN_PROGRESS recovery.
    pub inflight_budget_ms: u64,
    /// Interval between sweeper passes.
    pub sweeper_interval_ms: u64,
    /// Used when `TimeoutPolicy` returns `0` but the executor still wants
    /// to enforce a cap. Currently informational: the shipped
    /// `TimeoutPolicy` implementations already encode their own timeout,
    /// so this value is exposed for adapters that implement `NoopTimeoutPolicy`-
    /// style policies and want a shared fallback.
    pub default_per_attempt_timeout_ms: u64,
    /// Used when an action's `Retry` outcome carries no delay. Currently
    /// informational for the same reason: `Outcome::Retry` always carries
    /// an explicit delay in this core, so this is a fallback for adapters
    /// that want to build one without hand-rolling a `Duration`.
    pub default_retry_delay_ms: u64,
    /// Hard cap on attempts before the executor forces a terminal `Fail`
    /// with code `MAX_ATTEMPTS`.
    pub max_attempts: u32,
    /// Whether to dead-letter the message after a forced `MAX_ATTEMPTS`
    /// failure.
    pub dlq_on_max_attempts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_budget_ms: 30_000,
            inflight_budget_ms: 60_000,
            sweeper_interval_ms: 10_000,
            default_per_attempt_timeout_ms: 30_000,
            default_retry_delay_ms: 5_000,
            max_attempts: 10,
            dlq_on_max_attempts: true,
        }
    }
}

/// The status of an operation as surfaced by [`Runtime::query_status`] —
/// the data a REST/RPC facade serializes for its `GET /status/{opId}`
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Current lifecycle state.
    pub state: OperationState,
    /// The terminal outcome, populated only when `state` is terminal.
    pub outcome: Option<Outcome>,
}

/// Errors surfaced by the runtime facade. Wraps each port's scoped error
/// type behind one type at the facade boundary, the same role
/// `toka-runtime`'s facade error plays over `toka-kernel`/`toka-store-core`
/// errors for its embedding application.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The executor could not make progress on `execute`.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    /// The store backend is unavailable or returned an unexpected error
    /// while answering `query_status`.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The assembled orchestrator: an [`Executor`] plus a running recovery
/// [`Sweeper`], behind the two inbound ports the specification defines.
pub struct Runtime {
    store: Arc<dyn Store>,
    executor: Executor,
    sweeper_handle: Option<SweeperHandle>,
}

impl Runtime {
    /// Assemble a runtime from explicit ports and a user-supplied
    /// [`Action`], starting the recovery sweeper immediately.
    pub fn new(
        store: Arc<dyn Store>,
        idempotency: Arc<dyn IdempotencyManager>,
        bus: Arc<dyn Bus>,
        protection: ProtectionChain,
        action: Arc<dyn Action>,
        config: Config,
    ) -> Self {
        info!(?config, "assembling durable runtime");

        let executor = Executor::new(
            Arc::clone(&store),
            idempotency,
            Arc::clone(&bus),
            protection,
            action,
            config.max_attempts,
            config.dlq_on_max_attempts,
        );

        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(&store),
            bus,
            Duration::from_millis(config.wal_budget_ms),
            Duration::from_millis(config.inflight_budget_ms),
            Duration::from_millis(config.sweeper_interval_ms),
        ));

        Self {
            store,
            executor,
            sweeper_handle: Some(sweeper.spawn()),
        }
    }

    /// Assemble a runtime entirely from in-memory reference adapters —
    /// the Store, Bus, and IdempotencyManager all live only for the
    /// process lifetime. Suitable for tests, demos, and single-process
    /// development; not for production use across restarts.
    pub fn in_memory(action: Arc<dyn Action>, config: Config) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryIdempotencyManager::new()),
            Arc::new(MemoryBus::new()),
            ProtectionChain::noop(),
            action,
            config,
        )
    }

    /// Accept, execute, and finalize (or reschedule) `command`. See
    /// [`Executor::execute`] for the full Accept/Execute/Finalize
    /// algorithm this delegates to.
    pub async fn execute(&self, command: Command) -> Result<OperationHandle, RuntimeError> {
        Ok(self.executor.execute(command).await?)
    }

    /// The current state and, if terminal, outcome of `op_id`. Read-your-
    /// writes is only guaranteed for the caller that issued the
    /// corresponding `finalize` — not globally, per the store port's
    /// consistency contract.
    pub async fn query_status(&self, op_id: &OpId) -> Result<Option<Status>, RuntimeError> {
        let Some(state) = self.store.get_state(op_id).await? else {
            return Ok(None);
        };

        let outcome = if state.is_terminal() {
            self.store
                .latest_wal_entry(op_id)
                .await?
                .map(|entry| entry.outcome)
        } else {
            None
        };

        Ok(Some(Status { state, outcome }))
    }

    /// Stop the background recovery sweeper and wait for it to exit.
    /// Safe to call even if the runtime is dropped immediately after —
    /// dropping without calling `shutdown` simply lets the sweeper task
    /// keep running detached until the process exits.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.sweeper_handle.take() {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durable_action_echo::EchoAction;
    use durable_types::Payload;

    fn command(idem: &str) -> Command {
        Command::new("payments", "PAYMENT_CANCEL", "BK-1", Payload::from("{}"), idem)
    }

    #[tokio::test]
    async fn execute_then_query_status_reports_terminal_outcome() {
        let runtime = Runtime::in_memory(Arc::new(EchoAction), Config::default());

        let handle = runtime.execute(command("I-1")).await.unwrap();
        let status = runtime
            .query_status(handle.op_id())
            .await
            .unwrap()
            .expect("operation must exist after execute");

        assert_eq!(status.state, OperationState::Completed);
        assert!(matches!(status.outcome, Some(Outcome::Ok { .. })));

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn query_status_on_unknown_op_id_is_none() {
        let runtime = Runtime::in_memory(Arc::new(EchoAction), Config::default());
        let unknown = OpId::new("never-submitted").unwrap();
        assert!(runtime.query_status(&unknown).await.unwrap().is_none());
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn default_config_matches_reference_values() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 10);
        assert!(config.dlq_on_max_attempts);
    }
}
