//! `Outcome` — the tagged result of one execution attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The status attached to a [`Outcome::Fail`] — either an HTTP status code
/// or an opaque business status string, per the data model's
/// `httpStatus|businessStatus` union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailStatus {
    /// An HTTP status code (e.g. 403).
    Http(u16),
    /// An opaque business status (e.g. `"INSUFFICIENT_FUNDS"`).
    Business(String),
}

/// The tagged result of one execution attempt.
///
/// Every consumer must exhaustively match all three variants — there is
/// deliberately no default/fallback arm in the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// Success. Idempotent at the provider: re-invoking the user action
    /// under the same `OpId` after this point must never happen again.
    Ok {
        /// Provider-assigned transaction id, for dedup/audit on their side.
        provider_txn_id: String,
        /// Opaque result payload.
        result_payload: crate::Payload,
    },
    /// Must be rescheduled. The operation is *not* terminal.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
        /// Human-readable reason, for logs and the DLQ.
        reason: String,
        /// Whether this retry stems from a transient infrastructure
        /// condition (timeouts, refusals) as opposed to a business
        /// decision to retry.
        transient: bool,
    },
    /// Permanent failure.
    Fail {
        /// Caller-facing failure code.
        code: String,
        /// HTTP or business status accompanying the failure.
        status: FailStatus,
    },
}

impl Outcome {
    /// Convenience constructor for [`Outcome::Ok`].
    pub fn ok(provider_txn_id: impl Into<String>, result_payload: impl Into<crate::Payload>) -> Self {
        Self::Ok {
            provider_txn_id: provider_txn_id.into(),
            result_payload: result_payload.into(),
        }
    }

    /// Convenience constructor for a transient [`Outcome::Retry`].
    pub fn retry_transient(delay: Duration, reason: impl Into<String>) -> Self {
        Self::Retry {
            delay,
            reason: reason.into(),
            transient: true,
        }
    }

    /// Convenience constructor for [`Outcome::Fail`] with an HTTP status.
    pub fn fail_http(code: impl Into<String>, status: u16) -> Self {
        Self::Fail {
            code: code.into(),
            status: FailStatus::Http(status),
        }
    }

    /// Convenience constructor for [`Outcome::Fail`] with a business
    /// status.
    pub fn fail_business(code: impl Into<String>, status: impl Into<String>) -> Self {
        Self::Fail {
            code: code.into(),
            status: FailStatus::Business(status.into()),
        }
    }

    /// Whether this outcome finalizes the operation (invariant 3 and P5:
    /// only `Ok`/`Fail` ever finalize; `Retry` never does).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retry { .. })
    }
}
