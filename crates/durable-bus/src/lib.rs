#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-bus** – Redelivery bus port for the durable operation
//! orchestrator.
//!
//! The bus schedules re-execution of `Retry` outcomes and hands them back
//! to the executor with at-least-once delivery. No cross-key ordering is
//! guaranteed, and per-`OpId` ordering is not required either — the
//! Store's compare-and-set is what actually commits progress, so
//! out-of-order or duplicate redelivery is expected and safe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use durable_types::{Command, OpId};
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_util::time::DelayQueue;
use tracing::debug;

/// Opaque handle to a message currently invisible to other pollers.
///
/// Returned by [`Bus::poll`] and consumed by exactly one of [`Bus::ack`],
/// [`Bus::nack`], or [`Bus::dead_letter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Receipt(u64);

/// Errors produced by a [`Bus`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The backend is unreachable or returned an infrastructure error.
    /// Callers treat this as a transient condition.
    #[error("bus backend unavailable: {0}")]
    Unavailable(String),
    /// The receipt does not correspond to a message currently in flight —
    /// it may have already been acked, nacked, dead-lettered, or reclaimed
    /// after its visibility timeout expired.
    #[error("receipt {0:?} is unknown or already settled")]
    UnknownReceipt(Receipt),
}

/// Result type returned by [`Bus`] operations.
pub type BusResult<T> = Result<T, BusError>;

/// An entry moved to the dead-letter queue via [`Bus::dead_letter`].
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Operation the message concerned.
    pub op_id: OpId,
    /// The command that was being redelivered.
    pub command: Command,
    /// Caller-supplied reason for giving up on redelivery.
    pub reason: String,
    /// When the entry was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}

/// Redelivery bus contract: at-least-once delivery, no ordering
/// guarantees, visibility-timeout based hand-off, and an inspectable
/// dead-letter queue for operations that exhaust retries.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Schedule `command` for redelivery after `after_delay`. Must survive
    /// a process restart in a durable deployment.
    async fn enqueue(&self, op_id: OpId, command: Command, after_delay: Duration) -> BusResult<()>;

    /// Fetch the next due message, if any, making it invisible to other
    /// pollers for `visibility_timeout`. Returns `None` when nothing is
    /// currently due — this is not an error.
    async fn poll(
        &self,
        visibility_timeout: Duration,
    ) -> BusResult<Option<(OpId, Command, Receipt)>>;

    /// Commit a successfully processed message, removing it permanently.
    async fn ack(&self, receipt: Receipt) -> BusResult<()>;

    /// Return a message to the ready queue after `requeue_delay`, undoing
    /// its visibility timeout early.
    async fn nack(&self, receipt: Receipt, requeue_delay: Duration) -> BusResult<()>;

    /// Give up on redelivering a message and move it to the dead-letter
    /// queue with `reason`.
    async fn dead_letter(&self, receipt: Receipt, reason: String) -> BusResult<()>;

    /// Move `op_id`/`command` straight to the dead-letter queue without
    /// going through `poll`/a `Receipt` first. Used by callers that give up
    /// on an operation before it was ever enqueued for redelivery — e.g.
    /// the executor, when an operation exhausts `max_attempts` on its very
    /// first attempt and `dlq_on_max_attempts` is set.
    async fn dead_letter_op(&self, op_id: OpId, command: Command, reason: String) -> BusResult<()>;

    /// Inspect the current contents of the dead-letter queue.
    async fn dead_letters(&self) -> BusResult<Vec<DeadLetter>>;
}

struct QueuedMessage {
    op_id: OpId,
    command: Command,
}

struct InFlightEntry {
    op_id: OpId,
    command: Command,
    deadline: Instant,
}

/// In-memory, non-persistent [`Bus`] implementation backed by a
/// [`DelayQueue`] for pending redeliveries and a map of in-flight
/// receipts. Suitable for tests and single-process development; nothing
/// here survives a process restart.
pub struct MemoryBus {
    ready: Arc<Mutex<DelayQueue<QueuedMessage>>>,
    in_flight: Arc<Mutex<HashMap<u64, InFlightEntry>>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    next_receipt: Arc<AtomicU64>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Construct a new, empty in-memory bus.
    pub fn new() -> Self {
        Self {
            ready: Arc::new(Mutex::new(DelayQueue::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
            next_receipt: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Move any in-flight entries whose visibility timeout has elapsed
    /// back onto the ready queue with no further delay. Called at the
    /// start of every `poll` so an un-acked message eventually becomes
    /// pollable again.
    async fn reclaim_expired_in_flight(&self) {
        let now = Instant::now();
        let mut in_flight = self.in_flight.lock().await;
        let expired: Vec<u64> = in_flight
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(receipt, _)| *receipt)
            .collect();

        if expired.is_empty() {
            return;
        }

        let mut ready = self.ready.lock().await;
        for receipt in expired {
            if let Some(entry) = in_flight.remove(&receipt) {
                debug!(op_id = %entry.op_id, "visibility timeout expired, reclaiming message");
                ready.insert(
                    QueuedMessage {
                        op_id: entry.op_id,
                        command: entry.command,
                    },
                    Duration::ZERO,
                );
            }
        }
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn enqueue(&self, op_id: OpId, command: Command, after_delay: Duration) -> BusResult<()> {
        debug!(%op_id, delay_ms = after_delay.as_millis(), "enqueued for redelivery");
        self.ready
            .lock()
            .await
            .insert(QueuedMessage { op_id, command }, after_delay);
        Ok(())
    }

    async fn poll(
        &self,
        visibility_timeout: Duration,
    ) -> BusResult<Option<(OpId, Command, Receipt)>> {
        self.reclaim_expired_in_flight().await;

        let mut ready = self.ready.lock().await;
        // `poll_expired` needs a `Context`; `now_or_never` drives it once
        // without blocking so this stays a non-blocking, pollable read
        // rather than awaiting the next due item.
        let expired = std::future::poll_fn(|cx| ready.poll_expired(cx)).now_or_never();
        drop(ready);

        let expired = match expired {
            Some(Some(expired)) => expired,
            _ => return Ok(None),
        };

        let msg = expired.into_inner();
        let receipt = Receipt(self.next_receipt.fetch_add(1, Ordering::SeqCst));
        self.in_flight.lock().await.insert(
            receipt.0,
            InFlightEntry {
                op_id: msg.op_id.clone(),
                command: msg.command.clone(),
                deadline: Instant::now() + visibility_timeout,
            },
        );
        debug!(op_id = %msg.op_id, "polled message, now invisible");
        Ok(Some((msg.op_id, msg.command, receipt)))
    }

    async fn ack(&self, receipt: Receipt) -> BusResult<()> {
        self.in_flight
            .lock()
            .await
            .remove(&receipt.0)
            .ok_or(BusError::UnknownReceipt(receipt))?;
        Ok(())
    }

    async fn nack(&self, receipt: Receipt, requeue_delay: Duration) -> BusResult<()> {
        let entry = self
            .in_flight
            .lock()
            .await
            .remove(&receipt.0)
            .ok_or(BusError::UnknownReceipt(receipt))?;

        self.ready.lock().await.insert(
            QueuedMessage {
                op_id: entry.op_id,
                command: entry.command,
            },
            requeue_delay,
        );
        Ok(())
    }

    async fn dead_letter(&self, receipt: Receipt, reason: String) -> BusResult<()> {
        let entry = self
            .in_flight
            .lock()
            .await
            .remove(&receipt.0)
            .ok_or(BusError::UnknownReceipt(receipt))?;

        self.dead_letters.lock().await.push(DeadLetter {
            op_id: entry.op_id,
            command: entry.command,
            reason,
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn dead_letter_op(&self, op_id: OpId, command: Command, reason: String) -> BusResult<()> {
        debug!(%op_id, %reason, "dead-lettered without a prior enqueue");
        self.dead_letters.lock().await.push(DeadLetter {
            op_id,
            command,
            reason,
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn dead_letters(&self) -> BusResult<Vec<DeadLetter>> {
        Ok(self.dead_letters.lock().await.clone())
    }
}
