//! In-memory dedup store.
//!
//! Holds fingerprint entries for the lifetime of the process. A restart over
//! a persisted archive seeds the store with already-committed fingerprints
//! via `with_committed`.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::errors::DedupError;
use crate::interfaces::DedupStore;
use crate::types::{DedupEntry, DedupStatus};
use ingest_shared::Fingerprint;

/// Dedup store backed by a mutex-guarded hash map.
///
/// Every operation takes the lock for a single map access, so `reserve` is
/// an atomic check-and-insert. The lock is never held across an await.
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    entries: Mutex<HashMap<Fingerprint, DedupEntry>>,
}

impl InMemoryDedupStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already knows the given committed fingerprints.
    pub fn with_committed<I>(committed: I) -> Self
    where
        I: IntoIterator<Item = (Fingerprint, String)>,
    {
        let entries = committed
            .into_iter()
            .map(|(fp, commit_id)| (fp, DedupEntry::committed(commit_id)))
            .collect();

        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Move a claimed fingerprint to a final non-committed status.
    fn settle(&self, fingerprint: &Fingerprint, status: DedupStatus) {
        let mut entries = self.lock();
        let entry = entries
            .entry(fingerprint.clone())
            .or_insert_with(DedupEntry::reserved);
        if !entry.is_committed() {
            entry.status = status;
        }
    }

    // A panic while holding the lock cannot leave a half-written entry, so a
    // poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, DedupEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DedupStore for InMemoryDedupStore {
    fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains_key(fingerprint)
    }

    fn reserve(&self, fingerprint: &Fingerprint) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(fingerprint) {
            return false;
        }
        entries.insert(fingerprint.clone(), DedupEntry::reserved());
        true
    }

    fn mark_committed(&self, fingerprint: &Fingerprint, commit_id: &str) {
        let mut entries = self.lock();
        match entries.get_mut(fingerprint) {
            Some(entry) if entry.is_committed() => {
                debug!(
                    fingerprint = %fingerprint.short(),
                    "Fingerprint already committed, keeping first commit"
                );
            }
            Some(entry) => {
                entry.status = DedupStatus::Committed {
                    commit_id: commit_id.to_string(),
                };
                entry.committed_at = Some(Utc::now());
            }
            None => {
                warn!(
                    fingerprint = %fingerprint.short(),
                    "Committing a fingerprint that was never reserved"
                );
                entries.insert(fingerprint.clone(), DedupEntry::committed(commit_id));
            }
        }
    }

    fn mark_quarantined(&self, fingerprint: &Fingerprint) {
        self.settle(fingerprint, DedupStatus::Quarantined);
    }

    fn mark_rejected(&self, fingerprint: &Fingerprint) {
        self.settle(fingerprint, DedupStatus::Rejected);
    }

    fn release(&self, fingerprint: &Fingerprint) -> Result<(), DedupError> {
        let mut entries = self.lock();
        match entries.get(fingerprint) {
            None => Err(DedupError::not_reserved(fingerprint.as_str())),
            Some(entry) if entry.is_committed() => {
                Err(DedupError::already_committed(fingerprint.as_str()))
            }
            Some(_) => {
                entries.remove(fingerprint);
                Ok(())
            }
        }
    }

    fn entry(&self, fingerprint: &Fingerprint) -> Option<DedupEntry> {
        self.lock().get(fingerprint).cloned()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
