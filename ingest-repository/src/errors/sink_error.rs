//! Sink error types.
//!
//! This module defines the errors a sink adapter can report and classifies
//! them as retryable (transient) or terminal (permanent).

use std::io::ErrorKind;
use thiserror::Error;

/// Errors that can occur while committing a document to a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink is temporarily unable to accept the document (timeouts,
    /// connection resets, rate limiting).
    #[error("Transient sink error: {0}")]
    Transient(String),

    /// The sink will never accept this document as it is.
    #[error("Permanent sink error: {0}")]
    Permanent(String),

    /// Filesystem or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the document for the sink.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SinkError {
    /// Create a transient error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a permanent error.
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Determine if the error is retryable (transient failures).
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Transient(_) => true,
            SinkError::Io(err) => !matches!(
                err.kind(),
                ErrorKind::PermissionDenied | ErrorKind::InvalidInput | ErrorKind::InvalidData
            ),
            SinkError::Permanent(_) | SinkError::Serialization(_) => false,
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
