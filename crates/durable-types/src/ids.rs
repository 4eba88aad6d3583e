//! Operation identity: `OpId` and `IdempotencyKey`.

use serde::{Deserialize, Serialize};

/// Maximum length of an [`OpId`], in bytes.
pub const OP_ID_MAX_LEN: usize = 255;

/// Maximum length of an `IdempotencyKey::event_type` field, in bytes.
pub const EVENT_TYPE_MAX_LEN: usize = 50;

/// Maximum length of an `IdempotencyKey::biz_key` field, in bytes.
pub const BIZ_KEY_MAX_LEN: usize = 100;

/// Errors raised while constructing or validating a core value type.
///
/// Validation errors never reach the Store — they are raised synchronously
/// to the caller at Accept time, per the orchestrator's error propagation
/// policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A field that must not be empty was empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Name of the offending field.
        field: &'static str,
    },
    /// A field exceeded its maximum allowed length.
    #[error("{field} exceeds maximum length of {max} (got {actual})")]
    TooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
        /// Actual length observed.
        actual: usize,
    },
    /// A field contained characters outside its allowed charset.
    #[error("{field} contains characters outside the allowed charset")]
    InvalidCharset {
        /// Name of the offending field.
        field: &'static str,
    },
}

fn check_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

fn check_max_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.len() > max {
        return Err(ValidationError::TooLong {
            field,
            max,
            actual: value.len(),
        });
    }
    Ok(())
}

fn is_op_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Globally unique operation identifier.
///
/// Assigned once at Accept and never reused or mutated. Must match
/// `[A-Za-z0-9_-]+` and be 1–255 characters long.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(String);

impl OpId {
    /// Validate and wrap a raw string as an [`OpId`].
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        check_non_empty("OpId", &raw)?;
        check_max_len("OpId", &raw, OP_ID_MAX_LEN)?;
        if !raw.chars().all(is_op_id_char) {
            return Err(ValidationError::InvalidCharset { field: "OpId" });
        }
        Ok(Self(raw))
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OpId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The structured business identity used to collapse duplicate submissions.
///
/// Equality is structural over all four fields; this is the *only* input
/// the idempotency manager uses to decide "same request?".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    /// Business domain the event belongs to (e.g. `payments`).
    pub domain: String,
    /// Upper-case, underscore-separated event type (e.g. `PAYMENT_CANCEL`).
    pub event_type: String,
    /// Business key the event concerns (e.g. an order or payment id).
    pub biz_key: String,
    /// Caller-supplied idempotency token disambiguating retries of the
    /// same business intent.
    pub idem_key: String,
}

impl IdempotencyKey {
    /// Validate and construct an [`IdempotencyKey`].
    pub fn new(
        domain: impl Into<String>,
        event_type: impl Into<String>,
        biz_key: impl Into<String>,
        idem_key: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let domain = domain.into();
        let event_type = event_type.into();
        let biz_key = biz_key.into();
        let idem_key = idem_key.into();

        check_non_empty("domain", &domain)?;
        check_non_empty("event_type", &event_type)?;
        check_max_len("event_type", &event_type, EVENT_TYPE_MAX_LEN)?;
        if !event_type
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_')
        {
            return Err(ValidationError::InvalidCharset {
                field: "event_type",
            });
        }
        check_non_empty("biz_key", &biz_key)?;
        check_max_len("biz_key", &biz_key, BIZ_KEY_MAX_LEN)?;
        check_non_empty("idem_key", &idem_key)?;

        Ok(Self {
            domain,
            event_type,
            biz_key,
            idem_key,
        })
    }
}
