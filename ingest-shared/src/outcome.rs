//! Outcome types attached to a record as it moves through the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a document was rejected, quarantined, or failed.
///
/// `code` is a short stable token that callers match on; `detail` is
/// free text for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: String,
    pub detail: String,
}

impl Reason {
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
        }
    }

    /// The fingerprint was already reserved or committed.
    pub fn duplicate(fingerprint: &str) -> Self {
        Self::new("duplicate", format!("fingerprint {} already seen", fingerprint))
    }

    /// No identity could be derived from the document.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new("malformed", detail)
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            f.write_str(&self.code)
        } else {
            write!(f, "{}: {}", self.code, self.detail)
        }
    }
}

/// Result of running the validator chain over a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(Reason),
    Quarantined(Reason),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Self::Accepted => None,
            Self::Rejected(reason) | Self::Quarantined(reason) => Some(reason),
        }
    }
}

/// Terminal result of handing a document to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkResult {
    /// The sink persisted the document under `commit_id`.
    Committed { commit_id: String },
    /// The sink did not persist the document.
    Failed { retryable: bool, reason: Reason },
}

impl SinkResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}
