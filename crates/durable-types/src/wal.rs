//! `WalEntry` — a single append-only write-ahead-log row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::OpId;
use crate::outcome::Outcome;

/// The durability state of a [`WalEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalState {
    /// Written, but not yet reflected in the operation's terminal state.
    /// A WAL row stuck in `Pending` longer than the configured budget is
    /// exactly the recovery sweeper's WA-PENDING signal.
    Pending,
    /// Matched to a terminal `finalize` call.
    Completed,
}

/// One row of the append-only, per-`OpId`-ordered write-ahead log.
///
/// Multiple rows may exist per `OpId` — one per attempt — but only the
/// most recent row is ever consulted for `finalize`/recovery decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// The operation this row belongs to.
    pub op_id: OpId,
    /// The attempt's outcome.
    pub outcome: Outcome,
    /// Durability state of this row.
    pub wal_state: WalState,
    /// Wall-clock time the attempt occurred.
    pub occurred_at: DateTime<Utc>,
}

impl WalEntry {
    /// Construct a new, `Pending` WAL row for `op_id`, timestamped now.
    pub fn pending(op_id: OpId, outcome: Outcome) -> Self {
        Self {
            op_id,
            outcome,
            wal_state: WalState::Pending,
            occurred_at: Utc::now(),
        }
    }
}
