#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **durable-state** – Deterministic state machine for the durable
//! operation orchestrator.
//!
//! This crate owns exactly one thing: the pure, side-effect-free function
//! that decides whether a transition between two [`OperationState`]s is
//! legal. The Store port calls it to guard every write; nothing in this
//! crate performs I/O.

use durable_types::OperationState;

/// Errors produced while validating a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The source state is terminal; terminal states never transition.
    #[error("cannot transition out of terminal state {from}")]
    TerminalSource {
        /// The terminal state the transition was attempted from.
        from: OperationState,
    },
    /// The requested transition is not among the legal edges of the state
    /// machine.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        /// Source state.
        from: OperationState,
        /// Requested destination state.
        to: OperationState,
    },
}

/// Validate a transition from `from` to `to`.
///
/// Legal edges are exactly:
/// `Pending -> InProgress`, `InProgress -> Completed`,
/// `InProgress -> Failed`.
///
/// A terminal source state is always rejected, even if `from == to`
/// (terminal states never transition, not even to themselves) — this is
/// invariant 2 of the data model.
pub fn validate(from: OperationState, to: OperationState) -> Result<(), StateError> {
    if from.is_terminal() {
        return Err(StateError::TerminalSource { from });
    }

    let legal = matches!(
        (from, to),
        (OperationState::Pending, OperationState::InProgress)
            | (OperationState::InProgress, OperationState::Completed)
            | (OperationState::InProgress, OperationState::Failed)
    );

    if legal {
        Ok(())
    } else {
        Err(StateError::IllegalTransition { from, to })
    }
}
