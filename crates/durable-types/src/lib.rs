#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-types** – Core identity and value types for the durable
//! operation orchestrator.
//!
//! This crate sits at the very bottom of the crate graph: it has no
//! knowledge of storage, transport, or concurrency, and every other crate
//! in the workspace depends on it. It owns the data model described by the
//! orchestrator's specification — `OpId`, `IdempotencyKey`, `Payload`,
//! `Command`, `Envelope`, `OperationState` and `Outcome` — and enforces the
//! structural validation each of them requires at construction time.

mod command;
mod envelope;
mod ids;
mod outcome;
mod payload;
mod state;
mod wal;

pub use command::Command;
pub use envelope::Envelope;
pub use ids::{IdempotencyKey, OpId, ValidationError};
pub use outcome::{FailStatus, Outcome};
pub use payload::Payload;
pub use state::OperationState;
pub use wal::{WalEntry, WalState};

/// Convenience re-export of the most commonly used types.
pub mod prelude {
    pub use super::{
        Command, Envelope, FailStatus, IdempotencyKey, OpId, OperationState, Outcome, Payload,
        ValidationError, WalEntry, WalState,
    };
}
