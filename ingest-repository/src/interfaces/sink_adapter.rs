//! Sink adapter trait definition.
//!
//! This module defines the abstract interface to the persistence layer,
//! allowing for different backend implementations (graph store writer,
//! archive writer, etc.).

use async_trait::async_trait;

use crate::errors::SinkError;
use crate::types::CommitReceipt;
use ingest_shared::{Fingerprint, RawDocument, Reason};

/// Abstracts the persistence layer documents are committed to.
///
/// Implementations are injected into the pipeline as `Arc<dyn SinkAdapter>`.
/// Calls may block on network I/O; the pipeline never holds a lock while
/// awaiting them.
#[async_trait]
pub trait SinkAdapter: Send + Sync {
    /// Persist an accepted document.
    ///
    /// # Arguments
    ///
    /// * `document` - The validated document
    /// * `fingerprint` - Its reserved fingerprint
    ///
    /// # Returns
    ///
    /// * `Ok(CommitReceipt)` - If the document was persisted (or already was)
    /// * `Err(SinkError)` - Classified by `SinkError::is_retryable`
    async fn commit(
        &self,
        document: &RawDocument,
        fingerprint: &Fingerprint,
    ) -> Result<CommitReceipt, SinkError>;

    /// Route a document to the quarantine area for human review.
    ///
    /// `fingerprint` is `None` only if no fingerprint could be derived.
    async fn commit_quarantine(
        &self,
        document: &RawDocument,
        fingerprint: Option<&Fingerprint>,
        reason: &Reason,
    ) -> Result<(), SinkError>;

    /// Check if the sink is reachable and writable.
    async fn health_check(&self) -> Result<bool, SinkError>;
}
