//! `OperationState` — the data-model half of the operation lifecycle.
//!
//! The legality of *transitions* between states is owned by the
//! `durable-state` crate; this module only defines the states themselves
//! and which of them are terminal.

use serde::{Deserialize, Serialize};

/// The lifecycle state of an operation.
///
/// Terminal states are [`OperationState::Completed`] and
/// [`OperationState::Failed`] — once reached, an operation never
/// transitions again (invariant 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationState {
    /// Accepted but not yet in progress. Transient — the executor moves an
    /// operation to `InProgress` as part of Accept itself.
    Pending,
    /// Currently executing, or awaiting a scheduled retry.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished permanently unsuccessfully.
    Failed,
}

impl OperationState {
    /// Whether this state is terminal (no further transitions permitted).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}
