//! `Command` — the business intent submitted by a caller.

use serde::{Deserialize, Serialize};

use crate::ids::{IdempotencyKey, ValidationError};
use crate::payload::Payload;

/// A business intent submitted to the orchestrator.
///
/// `execute(command)` collapses repeated submissions of an equal
/// [`IdempotencyKey`] onto the same [`crate::OpId`] — the command itself
/// carries all four key components plus the opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Business domain (e.g. `payments`).
    pub domain: String,
    /// Upper-case, underscore-separated event type (e.g. `PAYMENT_CANCEL`).
    pub event_type: String,
    /// Business key the event concerns.
    pub biz_key: String,
    /// Opaque request payload.
    pub payload: Payload,
    /// Caller-supplied idempotency token.
    pub idem_key: String,
}

impl Command {
    /// Construct a new command.
    pub fn new(
        domain: impl Into<String>,
        event_type: impl Into<String>,
        biz_key: impl Into<String>,
        payload: impl Into<Payload>,
        idem_key: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            event_type: event_type.into(),
            biz_key: biz_key.into(),
            payload: payload.into(),
            idem_key: idem_key.into(),
        }
    }

    /// Derive the [`IdempotencyKey`] this command collapses onto,
    /// validating all four components.
    pub fn key(&self) -> Result<IdempotencyKey, ValidationError> {
        IdempotencyKey::new(
            self.domain.clone(),
            self.event_type.clone(),
            self.biz_key.clone(),
            self.idem_key.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_roundtrips_components() {
        let cmd = Command::new("payments", "PAYMENT_CANCEL", "BK-1", "{}", "I-1");
        let key = cmd.key().unwrap();
        assert_eq!(key.domain, "payments");
        assert_eq!(key.event_type, "PAYMENT_CANCEL");
        assert_eq!(key.biz_key, "BK-1");
        assert_eq!(key.idem_key, "I-1");
    }

    #[test]
    fn key_rejects_invalid_components() {
        let cmd = Command::new("payments", "payment_cancel", "BK-1", "{}", "I-1");
        assert!(cmd.key().is_err());
    }
}
