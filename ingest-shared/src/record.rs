//! Per-document state tracked by the pipeline.
//!
//! An `IngestionRecord` is created when a worker dequeues a document and is
//! dropped once it reaches a terminal state and has been reported. Transitions
//! follow a fixed state machine; anything else is refused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::document::RawDocument;
use crate::fingerprint::Fingerprint;
use crate::outcome::{Reason, SinkResult, ValidationOutcome};

/// Lifecycle state of an ingestion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordState {
    Received,
    Fingerprinted,
    DedupChecked,
    Validated,
    RetryPending,
    Committed,
    Quarantined,
    Rejected,
    Failed,
}

impl RecordState {
    /// Terminal states end the record's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Committed | Self::Quarantined | Self::Rejected | Self::Failed
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Any non-terminal state may fail (hard stop). Rejection is reachable
    /// before validation for malformed and duplicate documents.
    pub fn can_transition_to(self, next: RecordState) -> bool {
        use RecordState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }

        matches!(
            (self, next),
            (Received, Fingerprinted)
                | (Received, Rejected)
                | (Fingerprinted, DedupChecked)
                | (Fingerprinted, Rejected)
                | (DedupChecked, Validated)
                | (Validated, Committed)
                | (Validated, Quarantined)
                | (Validated, Rejected)
                | (Validated, RetryPending)
                | (RetryPending, RetryPending)
                | (RetryPending, Committed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Fingerprinted => "fingerprinted",
            Self::DedupChecked => "dedup_checked",
            Self::Validated => "validated",
            Self::RetryPending => "retry_pending",
            Self::Committed => "committed",
            Self::Quarantined => "quarantined",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid record transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RecordState,
    pub to: RecordState,
}

/// The unit tracked through the pipeline.
#[derive(Debug, Clone)]
pub struct IngestionRecord {
    document: Arc<RawDocument>,
    state: RecordState,
    fingerprint: Option<Fingerprint>,
    validation: Option<ValidationOutcome>,
    sink_result: Option<SinkResult>,
    reason: Option<Reason>,
    attempts: u32,
    received_at: DateTime<Utc>,
}

impl IngestionRecord {
    /// Start tracking a freshly dequeued document.
    pub fn received(document: Arc<RawDocument>) -> Self {
        Self {
            document,
            state: RecordState::Received,
            fingerprint: None,
            validation: None,
            sink_result: None,
            reason: None,
            attempts: 0,
            received_at: Utc::now(),
        }
    }

    pub fn document(&self) -> &Arc<RawDocument> {
        &self.document
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn validation(&self) -> Option<&ValidationOutcome> {
        self.validation.as_ref()
    }

    pub fn sink_result(&self) -> Option<&SinkResult> {
        self.sink_result.as_ref()
    }

    /// Reason for the terminal outcome, when it is not a commit.
    pub fn reason(&self) -> Option<&Reason> {
        self.reason.as_ref()
    }

    /// Number of sink commit attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    fn transition(&mut self, next: RecordState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Attach the fingerprint.
    pub fn fingerprinted(&mut self, fingerprint: Fingerprint) -> Result<(), InvalidTransition> {
        self.transition(RecordState::Fingerprinted)?;
        self.fingerprint = Some(fingerprint);
        Ok(())
    }

    /// The fingerprint has been reserved in the dedup store.
    pub fn dedup_checked(&mut self) -> Result<(), InvalidTransition> {
        self.transition(RecordState::DedupChecked)
    }

    /// Attach the validation outcome. Rejected and quarantined outcomes are
    /// settled by `reject` / `quarantine` afterwards.
    pub fn validated(&mut self, outcome: ValidationOutcome) -> Result<(), InvalidTransition> {
        self.transition(RecordState::Validated)?;
        self.validation = Some(outcome);
        Ok(())
    }

    /// Record one failed, retryable commit attempt.
    pub fn retry_pending(&mut self, reason: Reason) -> Result<(), InvalidTransition> {
        self.transition(RecordState::RetryPending)?;
        self.attempts += 1;
        self.reason = Some(reason);
        Ok(())
    }

    pub fn committed(&mut self, commit_id: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(RecordState::Committed)?;
        self.attempts += 1;
        self.reason = None;
        self.sink_result = Some(SinkResult::Committed {
            commit_id: commit_id.into(),
        });
        Ok(())
    }

    pub fn quarantined(&mut self, reason: Reason) -> Result<(), InvalidTransition> {
        self.transition(RecordState::Quarantined)?;
        self.reason = Some(reason);
        Ok(())
    }

    pub fn rejected(&mut self, reason: Reason) -> Result<(), InvalidTransition> {
        self.transition(RecordState::Rejected)?;
        self.reason = Some(reason);
        Ok(())
    }

    /// Terminal failure. `attempted` counts a final commit attempt that did
    /// not go through `retry_pending`.
    pub fn failed(
        &mut self,
        reason: Reason,
        retryable: bool,
        attempted: bool,
    ) -> Result<(), InvalidTransition> {
        self.transition(RecordState::Failed)?;
        if attempted {
            self.attempts += 1;
        }
        self.sink_result = Some(SinkResult::Failed {
            retryable,
            reason: reason.clone(),
        });
        self.reason = Some(reason);
        Ok(())
    }
}
