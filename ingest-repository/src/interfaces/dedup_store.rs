//! Dedup store trait definition.

use crate::errors::DedupError;
use crate::types::DedupEntry;
use ingest_shared::Fingerprint;

/// Tracks which fingerprints have been claimed or committed.
///
/// The store is injected into the pipeline; there is no global registry.
/// Methods are synchronous and must never be called while awaiting I/O.
///
/// `reserve` is the only operation that claims a fingerprint and must be
/// atomic: no two concurrent callers may both see it return `true` for the
/// same fingerprint.
pub trait DedupStore: Send + Sync {
    /// Non-blocking membership check.
    fn contains(&self, fingerprint: &Fingerprint) -> bool;

    /// Insert the fingerprint if absent. Returns `false` for a duplicate.
    fn reserve(&self, fingerprint: &Fingerprint) -> bool;

    /// Record the first commit of a reserved fingerprint.
    fn mark_committed(&self, fingerprint: &Fingerprint, commit_id: &str);

    /// Record that a reserved fingerprint was quarantined. The reservation
    /// is kept so the document is not reprocessed.
    fn mark_quarantined(&self, fingerprint: &Fingerprint);

    /// Record that a reserved fingerprint failed validation. The reservation
    /// is kept.
    fn mark_rejected(&self, fingerprint: &Fingerprint);

    /// Drop a reservation so a later resubmission can be processed. Only
    /// called when the sink commit failed.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the reservation was removed
    /// * `Err(DedupError::AlreadyCommitted)` - If the fingerprint was committed
    /// * `Err(DedupError::NotReserved)` - If the fingerprint is unknown
    fn release(&self, fingerprint: &Fingerprint) -> Result<(), DedupError>;

    /// Look up the entry for a fingerprint.
    fn entry(&self, fingerprint: &Fingerprint) -> Option<DedupEntry>;

    /// Number of tracked fingerprints.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batch existence check: the subset of `fingerprints` the store has not
    /// seen, in input order.
    fn missing(&self, fingerprints: &[Fingerprint]) -> Vec<Fingerprint> {
        fingerprints
            .iter()
            .filter(|fp| !self.contains(fp))
            .cloned()
            .collect()
    }
}
