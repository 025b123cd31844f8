//! Request and response types for sink and dedup operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Acknowledgement returned by a sink after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Sink-specific identifier of the persisted document.
    pub commit_id: String,
    /// True when the sink already held this document and did not write it
    /// again.
    pub already_present: bool,
}

impl CommitReceipt {
    pub fn new(commit_id: impl Into<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
            already_present: false,
        }
    }

    pub fn existing(commit_id: impl Into<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
            already_present: true,
        }
    }
}

/// Where a fingerprint stands in the dedup store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupStatus {
    /// Claimed by a worker; the document is in flight.
    Reserved,
    /// Routed to quarantine; stays claimed so it is not reprocessed.
    Quarantined,
    /// Failed validation; stays claimed so the same document is rejected
    /// as a duplicate instead of being validated again.
    Rejected,
    /// Persisted by the sink.
    Committed { commit_id: String },
}

/// A dedup index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupEntry {
    pub status: DedupStatus,
    /// When the fingerprint was first reserved.
    pub first_seen: DateTime<Utc>,
    /// When the commit was recorded, if it has been.
    pub committed_at: Option<DateTime<Utc>>,
}

impl DedupEntry {
    pub fn reserved() -> Self {
        Self {
            status: DedupStatus::Reserved,
            first_seen: Utc::now(),
            committed_at: None,
        }
    }

    pub fn committed(commit_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status: DedupStatus::Committed {
                commit_id: commit_id.into(),
            },
            first_seen: now,
            committed_at: Some(now),
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.status, DedupStatus::Committed { .. })
    }
}
