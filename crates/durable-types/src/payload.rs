//! Opaque byte payloads carried by commands and outcomes.

use serde::{Deserialize, Serialize};

/// Recommended upper bound on payload size, per the orchestrator's data
/// model. Not enforced as a hard invariant — the core never inspects or
/// rejects a payload on size alone; this constant exists so adapters can
/// surface a warning or reject at the ingress boundary if they choose to.
pub const RECOMMENDED_MAX_BYTES: usize = 1024 * 1024;

/// An opaque byte sequence. The core never inspects its contents —
/// schema evolution of the payload body is explicitly out of scope.
///
/// May be empty, but is never null-semantic-absent: a `Payload` always
/// owns a (possibly empty) byte buffer rather than an `Option<Vec<u8>>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wrap raw bytes as a [`Payload`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The empty payload.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Whether this payload exceeds the recommended size budget.
    pub fn is_oversized(&self) -> bool {
        self.0.len() > RECOMMENDED_MAX_BYTES
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_not_absent() {
        let p = Payload::empty();
        assert_eq!(p.as_bytes(), b"");
        assert!(!p.is_oversized());
    }

    #[test]
    fn oversized_detection() {
        let p = Payload::new(vec![0u8; RECOMMENDED_MAX_BYTES + 1]);
        assert!(p.is_oversized());
    }
}
