//! Outcome log and operator surface.
//!
//! Every record that reaches a terminal state is reported here. Routine
//! outcomes only move counters; failed and quarantined records are retained
//! for manual triage, and failed ones can be resubmitted to the queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::OperatorError;
use crate::queue::{Ack, EnqueueMode, QueueProducer};
use ingest_shared::{Fingerprint, IngestionRecord, RawDocument, Reason, RecordState, SinkResult};

/// Counters per terminal outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeStats {
    pub committed: usize,
    /// Rejected records, duplicates included.
    pub rejected: usize,
    /// Rejected because the fingerprint was already seen.
    pub duplicates: usize,
    pub quarantined: usize,
    pub failed: usize,
}

impl OutcomeStats {
    pub fn total(&self) -> usize {
        self.committed + self.rejected + self.quarantined + self.failed
    }
}

/// A failed or quarantined record kept for manual review.
#[derive(Debug, Clone)]
pub struct TriageEntry {
    pub document: Arc<RawDocument>,
    pub fingerprint: Option<Fingerprint>,
    pub state: RecordState,
    pub reason: Option<Reason>,
    /// For failed records: whether a later run may succeed.
    pub retryable: bool,
    pub attempts: u32,
    /// When a worker took the document off the queue.
    pub received_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Which triage entries to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriageFilter {
    #[default]
    All,
    Failed,
    Quarantined,
}

impl TriageFilter {
    fn matches(self, state: RecordState) -> bool {
        match self {
            Self::All => true,
            Self::Failed => state == RecordState::Failed,
            Self::Quarantined => state == RecordState::Quarantined,
        }
    }
}

#[derive(Debug, Default)]
struct LogState {
    stats: OutcomeStats,
    triage: Vec<TriageEntry>,
}

/// Log of terminal outcomes, shared between workers and operators.
#[derive(Debug, Default)]
pub struct OutcomeLog {
    state: Mutex<LogState>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report a record that reached a terminal state.
    pub fn record(&self, record: &IngestionRecord) {
        let document = record.document();
        let fingerprint = record.fingerprint().map(|fp| fp.short()).unwrap_or("-");
        let reason = record
            .reason()
            .map(ToString::to_string)
            .unwrap_or_default();

        match record.state() {
            RecordState::Committed => {
                debug!(
                    document_id = %document.document_id,
                    fingerprint = %fingerprint,
                    attempts = record.attempts(),
                    "Document committed"
                );
            }
            RecordState::Rejected => {
                debug!(
                    document_id = %document.document_id,
                    fingerprint = %fingerprint,
                    reason = %reason,
                    "Document rejected"
                );
            }
            RecordState::Quarantined => {
                info!(
                    document_id = %document.document_id,
                    fingerprint = %fingerprint,
                    origin = %document.origin,
                    reason = %reason,
                    "Document quarantined"
                );
            }
            RecordState::Failed => {
                error!(
                    document_id = %document.document_id,
                    fingerprint = %fingerprint,
                    origin = %document.origin,
                    attempts = record.attempts(),
                    reason = %reason,
                    "Document failed"
                );
            }
            state => {
                warn!(
                    document_id = %document.document_id,
                    state = %state,
                    "Ignoring report for a record that is not terminal"
                );
                return;
            }
        }

        let mut log = self.lock();
        match record.state() {
            RecordState::Committed => log.stats.committed += 1,
            RecordState::Rejected => {
                log.stats.rejected += 1;
                if record.reason().is_some_and(|r| r.is("duplicate")) {
                    log.stats.duplicates += 1;
                }
            }
            RecordState::Quarantined => log.stats.quarantined += 1,
            RecordState::Failed => log.stats.failed += 1,
            _ => {}
        }

        if matches!(record.state(), RecordState::Failed | RecordState::Quarantined) {
            let retryable = matches!(
                record.sink_result(),
                Some(SinkResult::Failed { retryable: true, .. })
            );
            log.triage.retain(|e| e.document.document_id != document.document_id);
            log.triage.push(TriageEntry {
                document: document.clone(),
                fingerprint: record.fingerprint().cloned(),
                state: record.state(),
                reason: record.reason().cloned(),
                retryable,
                attempts: record.attempts(),
                received_at: record.received_at(),
                finished_at: Utc::now(),
            });
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> OutcomeStats {
        self.lock().stats
    }

    /// List triage entries, oldest first. Read-only.
    pub fn triage(&self, filter: TriageFilter) -> Vec<TriageEntry> {
        self.lock()
            .triage
            .iter()
            .filter(|entry| filter.matches(entry.state))
            .cloned()
            .collect()
    }

    /// Put a failed record's original document back on the queue.
    ///
    /// The entry leaves the triage list once the queue accepts the document;
    /// if the queue refuses it the entry is kept.
    pub async fn resubmit(
        &self,
        document_id: Uuid,
        producer: &QueueProducer,
        mode: EnqueueMode,
    ) -> Result<Ack, OperatorError> {
        let entry = {
            let mut log = self.lock();
            let index = log
                .triage
                .iter()
                .position(|e| e.document.document_id == document_id)
                .ok_or(OperatorError::NotFound(document_id))?;

            if log.triage[index].state != RecordState::Failed {
                return Err(OperatorError::NotResubmittable {
                    document_id,
                    state: log.triage[index].state,
                });
            }
            log.triage.remove(index)
        };

        match producer.submit(entry.document.clone(), mode).await {
            Ok(ack) => {
                info!(document_id = %document_id, "Resubmitted failed document");
                Ok(ack)
            }
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "Resubmission refused by queue");
                self.lock().triage.push(entry);
                Err(e.into())
            }
        }
    }
}
