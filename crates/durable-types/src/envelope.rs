//! `Envelope` — the durable, immutable record of an accepted command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::ids::OpId;

/// The durable, immutable record of an accepted [`Command`] under an
/// [`OpId`]. Stored exactly once per `OpId` (invariant 1) and never
/// mutated after Accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The operation this envelope belongs to.
    pub op_id: OpId,
    /// The command that was accepted.
    pub command: Command,
    /// Monotonically assigned version, for optimistic-concurrency adapters.
    pub version: i64,
    /// Wall-clock time the envelope was durably accepted.
    pub accepted_at: DateTime<Utc>,
}

impl Envelope {
    /// Construct a new envelope at version 1, accepted now.
    pub fn new(op_id: OpId, command: Command) -> Self {
        Self {
            op_id,
            command,
            version: 1,
            accepted_at: Utc::now(),
        }
    }

    /// Construct an envelope with explicit version/timestamp, for adapters
    /// reconstructing one from durable storage.
    pub fn with_metadata(
        op_id: OpId,
        command: Command,
        version: i64,
        accepted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            op_id,
            command,
            version,
            accepted_at,
        }
    }
}
