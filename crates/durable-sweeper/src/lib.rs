#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-sweeper** – The recovery sweeper (C8).
//!
//! Runs two idempotent passes on an interval: WA-PENDING, which
//! finalizes or re-enqueues operations whose most recent WAL row has sat
//! unfinalized past `wal_budget`, and IN_PROGRESS, which re-enqueues
//! operations that crashed between Accept and their first WAL row past
//! `inflight_budget`. Double-running either pass is always safe — every
//! mutation downstream is CAS-guarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use durable_bus::{Bus, BusError};
use durable_store::{Store, StoreError};
use durable_types::{OperationState, Outcome};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors produced while running a sweep pass.
#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    /// The store backend is unavailable or returned an unexpected error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The bus backend is unavailable or returned an unexpected error.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

/// Tally of work performed by one call to [`Sweeper::sweep_once`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Operations finalized by the WA-PENDING pass.
    pub finalized: u32,
    /// Operations re-enqueued by the WA-PENDING pass (stale `Retry` rows).
    pub retried: u32,
    /// Operations re-enqueued by the IN_PROGRESS pass (crash between
    /// Accept and first attempt).
    pub recovered: u32,
}

/// Periodically reconciles stuck operations. See the module docs for the
/// two passes.
pub struct Sweeper {
    store: Arc<dyn Store>,
    bus: Arc<dyn Bus>,
    wal_budget: Duration,
    inflight_budget: Duration,
    sweep_interval: Duration,
}

impl Sweeper {
    /// Construct a sweeper over `store`/`bus` with the given budgets and
    /// pass interval.
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<dyn Bus>,
        wal_budget: Duration,
        inflight_budget: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            wal_budget,
            inflight_budget,
            sweep_interval,
        }
    }

    /// Run both passes once and return a tally of what they did.
    pub async fn sweep_once(&self) -> Result<SweepReport, SweeperError> {
        let (finalized, retried) = self.sweep_wa_pending().await?;
        let recovered = self.sweep_in_progress().await?;
        Ok(SweepReport {
            finalized,
            retried,
            recovered,
        })
    }

    async fn sweep_wa_pending(&self) -> Result<(u32, u32), SweeperError> {
        let threshold = Utc::now() - chrono_duration(self.wal_budget);
        let stale = self.store.scan_wa(threshold).await?;

        let mut finalized = 0;
        let mut retried = 0;
        for op_id in stale {
            let Some(entry) = self.store.latest_wal_entry(&op_id).await? else {
                continue;
            };

            match entry.outcome {
                Outcome::Ok { .. } => {
                    match self.store.finalize(&op_id, OperationState::Completed).await {
                        Ok(()) => finalized += 1,
                        Err(StoreError::Conflict { .. }) => {
                            debug!(%op_id, "WA-PENDING finalize raced, already terminal");
                        }
                        Err(other) => return Err(other.into()),
                    }
                }
                Outcome::Fail { .. } => {
                    match self.store.finalize(&op_id, OperationState::Failed).await {
                        Ok(()) => finalized += 1,
                        Err(StoreError::Conflict { .. }) => {
                            debug!(%op_id, "WA-PENDING finalize raced, already terminal");
                        }
                        Err(other) => return Err(other.into()),
                    }
                }
                Outcome::Retry { delay, .. } => {
                    if let Some(envelope) = self.store.get_envelope(&op_id).await? {
                        self.bus.enqueue(op_id.clone(), envelope.command, delay).await?;
                        retried += 1;
                    }
                }
            }
        }

        Ok((finalized, retried))
    }

    async fn sweep_in_progress(&self) -> Result<u32, SweeperError> {
        let threshold = Utc::now() - chrono_duration(self.inflight_budget);
        let stuck = self.store.scan_in_progress(threshold).await?;

        let mut recovered = 0;
        for op_id in stuck {
            // A WAL row already exists for this attempt — it's the
            // WA-PENDING pass's responsibility, not a crash-between-S1-
            // and-S2 recovery.
            if self.store.latest_wal_entry(&op_id).await?.is_some() {
                continue;
            }
            if let Some(envelope) = self.store.get_envelope(&op_id).await? {
                self.bus
                    .enqueue(op_id.clone(), envelope.command, Duration::ZERO)
                    .await?;
                recovered += 1;
            }
        }

        Ok(recovered)
    }

    /// Spawn a background task that runs [`Sweeper::sweep_once`] on
    /// `sweep_interval`, logging (not propagating) pass failures so a
    /// single bad pass doesn't kill the loop.
    pub fn spawn(self: Arc<Self>) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let sweeper = self;
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.sweep_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match sweeper.sweep_once().await {
                            Ok(report) => debug!(?report, "sweep pass complete"),
                            Err(err) => warn!(error = %err, "sweep pass failed"),
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        SweeperHandle {
            join,
            shutdown: shutdown_tx,
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Handle to a running sweeper background task.
pub struct SweeperHandle {
    join: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl SweeperHandle {
    /// Signal the sweeper loop to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}
