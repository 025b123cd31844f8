//! Error types for the ingest pipeline.

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use ingest_repository::SinkError;
use ingest_shared::{InvalidTransition, RawDocument, RecordState};

/// Errors that can occur in the ingest pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No identity could be derived from the document.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Error from the sink.
    #[error("Sink error: {0}")]
    SinkError(#[from] SinkError),

    /// A record was driven through a transition the state machine forbids.
    #[error("State error: {0}")]
    StateError(#[from] InvalidTransition),

    /// Invalid pipeline configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A worker task panicked or was cancelled.
    #[error("Worker error: {0}")]
    WorkerError(String),
}

impl PipelineError {
    /// Create a malformed document error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::WorkerError(msg.into())
    }
}

/// Errors returned to producers by the ingestion queue.
///
/// The rejected document is handed back so the producer can decide whether
/// to retry or drop it.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue is at capacity (non-blocking mode only).
    #[error("Queue is full")]
    Full(Arc<RawDocument>),

    /// Intake was closed; nothing will ever dequeue the document.
    #[error("Queue is closed")]
    Closed(Arc<RawDocument>),
}

impl QueueError {
    /// Take back the document that could not be enqueued.
    pub fn into_document(self) -> Arc<RawDocument> {
        match self {
            Self::Full(doc) | Self::Closed(doc) => doc,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

/// Errors returned by operator commands.
#[derive(Error, Debug)]
pub enum OperatorError {
    /// No triage entry exists for the document.
    #[error("No triage entry for document {0}")]
    NotFound(Uuid),

    /// Only failed records can be resubmitted.
    #[error("Document {document_id} is {state} and cannot be resubmitted")]
    NotResubmittable {
        document_id: Uuid,
        state: RecordState,
    },

    /// The queue refused the resubmitted document.
    #[error("Resubmission failed: {0}")]
    QueueError(#[from] QueueError),
}
