//! Dedup store error types.

use thiserror::Error;

/// Errors returned by dedup store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DedupError {
    /// The fingerprint has been committed and can no longer be released.
    #[error("Fingerprint {0} is already committed")]
    AlreadyCommitted(String),

    /// The fingerprint is not reserved.
    #[error("Fingerprint {0} is not reserved")]
    NotReserved(String),
}

impl DedupError {
    pub fn already_committed(fingerprint: impl Into<String>) -> Self {
        Self::AlreadyCommitted(fingerprint.into())
    }

    pub fn not_reserved(fingerprint: impl Into<String>) -> Self {
        Self::NotReserved(fingerprint.into())
    }
}
