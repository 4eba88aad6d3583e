//! Property tests for the quantified invariants P1-P6.
//!
//! Pure, synchronous properties (P2) use `proptest!` directly. Properties
//! that need to drive async ports block on a fresh `tokio` runtime inside
//! the proptest closure, the same pattern `durable-idempotency` uses for
//! its own concurrent-callers unit test.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use durable_bus::{Bus, MemoryBus};
use durable_executor::{Action, Executor, OperationHandle};
use durable_idempotency::{IdempotencyManager, MemoryIdempotencyManager};
use durable_protection::ProtectionChain;
use durable_state::{validate, StateError};
use durable_store::{Store, StoreError};
use durable_store_memory::MemoryStore;
use durable_types::{Command, IdempotencyKey, OpId, OperationState, Outcome, Payload};
use proptest::prelude::*;

fn arbitrary_state() -> impl Strategy<Value = OperationState> {
    prop_oneof![
        Just(OperationState::Pending),
        Just(OperationState::InProgress),
        Just(OperationState::Completed),
        Just(OperationState::Failed),
    ]
}

fn op(id: &str) -> OpId {
    OpId::new(id).unwrap()
}

fn command(idem: &str) -> Command {
    Command::new("payments", "PAYMENT_CANCEL", "BK-1", Payload::from("{}"), idem)
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

proptest! {
    // P2 (Monotonic state): the observed sequence of states is always a
    // prefix of a legal path; no terminal state transitions, for every
    // (from, to) pair the type can express.
    #[test]
    fn p2_monotonic_state_rejects_every_terminal_source(from in arbitrary_state(), to in arbitrary_state()) {
        init_tracing();
        let result = validate(from, to);
        if from.is_terminal() {
            prop_assert_eq!(result, Err(StateError::TerminalSource { from }));
        } else {
            let legal = matches!(
                (from, to),
                (OperationState::Pending, OperationState::InProgress)
                    | (OperationState::InProgress, OperationState::Completed)
                    | (OperationState::InProgress, OperationState::Failed)
            );
            prop_assert_eq!(result.is_ok(), legal);
        }
        // Determinism: repeating the same call yields the same answer.
        prop_assert_eq!(validate(from, to), validate(from, to));
    }

    // P1 (Idempotency): any number of concurrent callers presenting an
    // equal IdempotencyKey mint exactly one OpId, and every caller
    // observes it.
    #[test]
    fn p1_concurrent_callers_converge_on_one_op_id(concurrency in 2usize..12) -> Result<(), TestCaseError> {
        block_on(async move {
            init_tracing();
            let mgr = Arc::new(MemoryIdempotencyManager::new());
            let key = IdempotencyKey::new("payments", "PAYMENT_CANCEL", "BK-1", "I-shared").unwrap();

            let mut handles = Vec::new();
            for _ in 0..concurrency {
                let mgr = Arc::clone(&mgr);
                let key = key.clone();
                handles.push(tokio::spawn(async move { mgr.get_or_create(key).await }));
            }

            let mut ids = Vec::new();
            for h in handles {
                ids.push(h.await.unwrap().unwrap());
            }

            let first = ids[0].clone();
            prop_assert!(ids.into_iter().all(|id| id == first));
            Ok(())
        })?;
        Ok(())
    }

    // P5 (Retry non-finalization): no OpId becomes terminal as a result
    // of any number of Retry outcomes, regardless of their recorded delay
    // or reason text.
    #[test]
    fn p5_retry_outcomes_never_finalize(attempts in 1usize..6, delay_secs in 0u64..120) -> Result<(), TestCaseError> {
        block_on(async move {
            init_tracing();
            let store = MemoryStore::new();
            let id = op("op-p5");
            let envelope = durable_types::Envelope::new(id.clone(), command("I-p5"));
            store.store_envelope(envelope).await.unwrap();
            store.set_state(&id, OperationState::InProgress).await.unwrap();

            for _ in 0..attempts {
                store
                    .write_ahead(&id, Outcome::retry_transient(Duration::from_secs(delay_secs), "net"))
                    .await
                    .unwrap();
            }

            prop_assert_eq!(store.get_state(&id).await.unwrap(), Some(OperationState::InProgress));
            let err = store.finalize(&id, OperationState::Completed).await.unwrap_err();
            prop_assert!(matches!(err, StoreError::RetryNotFinalizable(_)));
            prop_assert_eq!(store.get_state(&id).await.unwrap(), Some(OperationState::InProgress));
            Ok(())
        })?;
        Ok(())
    }
}

// P3 (WAL-Finalize atomicity): after a successful finalize, exactly one
// WAL row is COMPLETED and the state is terminal; a failing finalize
// modifies neither side.
#[tokio::test]
async fn p3_finalize_is_all_or_nothing() {
    init_tracing();
    let store = MemoryStore::new();
    let id = op("op-p3");
    let envelope = durable_types::Envelope::new(id.clone(), command("I-p3"));
    store.store_envelope(envelope).await.unwrap();
    store.set_state(&id, OperationState::InProgress).await.unwrap();
    store.write_ahead(&id, Outcome::ok("ptxn-p3", "{}")).await.unwrap();

    store.finalize(&id, OperationState::Completed).await.unwrap();
    assert_eq!(store.get_state(&id).await.unwrap(), Some(OperationState::Completed));
    let latest = store.latest_wal_entry(&id).await.unwrap().unwrap();
    assert_eq!(latest.wal_state, durable_types::WalState::Completed);

    // Finalizing an already-terminal operation again fails, and leaves
    // both the state and WAL row exactly as they were.
    let err = store.finalize(&id, OperationState::Failed).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert_eq!(store.get_state(&id).await.unwrap(), Some(OperationState::Completed));
    let latest_after = store.latest_wal_entry(&id).await.unwrap().unwrap();
    assert_eq!(latest_after, latest);
}

// P4 (Recovery closure): any OpId with a WAL-PENDING(Ok|Fail) row older
// than the budget is terminal, with the matching state, after one
// sweeper pass.
#[tokio::test]
async fn p4_recovery_closure_over_ok_and_fail_rows() {
    init_tracing();
    for (outcome, expected_state) in [
        (Outcome::ok("ptxn-ok", "{}"), OperationState::Completed),
        (Outcome::fail_http("FORBIDDEN", 403), OperationState::Failed),
    ] {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryBus::new());
        let id = op(&format!("op-p4-{expected_state}"));
        let envelope = durable_types::Envelope::new(id.clone(), command("I-p4"));
        store.store_envelope(envelope).await.unwrap();
        store.set_state(&id, OperationState::InProgress).await.unwrap();
        store.write_ahead(&id, outcome).await.unwrap();

        let sweeper = durable_sweeper::Sweeper::new(
            store.clone(),
            bus,
            Duration::ZERO,
            Duration::from_secs(3600),
            Duration::from_secs(1),
        );
        sweeper.sweep_once().await.unwrap();

        assert_eq!(store.get_state(&id).await.unwrap(), Some(expected_state));
    }
}

// P6 (At-most-one side effect): the action's observable effect happens
// at most once per OpId, even across a run that scripts several Retry
// outcomes before the eventual terminal one.
#[tokio::test]
async fn p6_action_observed_at_most_once_per_op_id_across_retries() {
    init_tracing();
    struct RetryThenSucceed {
        remaining: AtomicU32,
        inner: Arc<durable_action_echo::CountingEchoAction>,
    }

    #[async_trait]
    impl Action for RetryThenSucceed {
        async fn run(&self, op_id: &OpId, payload: &Payload) -> Outcome {
            let prior = self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| {
                Some(r.saturating_sub(1))
            });
            if prior.unwrap_or(0) > 0 {
                Outcome::retry_transient(Duration::from_secs(1), "net")
            } else {
                self.inner.run(op_id, payload).await
            }
        }
    }

    let counting = Arc::new(durable_action_echo::CountingEchoAction::new());
    let action = Arc::new(RetryThenSucceed {
        remaining: AtomicU32::new(3),
        inner: Arc::clone(&counting),
    });

    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    let executor = Executor::new(
        store.clone(),
        Arc::new(MemoryIdempotencyManager::new()),
        bus.clone(),
        ProtectionChain::noop(),
        action.clone() as Arc<dyn Action>,
        10,
        false,
    );

    let mut handle = executor.execute(command("I-p6")).await.unwrap();
    while matches!(handle, OperationHandle::Async { .. }) {
        let (_, cmd, receipt) = bus
            .poll(Duration::from_secs(30))
            .await
            .unwrap()
            .expect("a retry must have been enqueued while not yet terminal");
        handle = executor.execute(cmd).await.unwrap();
        bus.ack(receipt).await.unwrap();
    }

    assert!(matches!(handle, OperationHandle::Completed { outcome: Outcome::Ok { .. }, .. }));
    assert_eq!(counting.observation_count(handle.op_id()), 1);
}
