//! Processor module for the ingest pipeline.
//!
//! Fingerprints and validates documents.

mod fingerprint;
pub mod rules;
mod validator;

use std::sync::Arc;
use tracing::error;

pub use fingerprint::Fingerprinter;
pub use rules::{ModelCheckRule, ModelClassifier};
pub use validator::{Rule, RuleVerdict, Validator, ValidatorConfig, DEFAULT_MAX_PAYLOAD_BYTES};

use crate::errors::PipelineError;
use ingest_shared::{Fingerprint, RawDocument, Reason, ValidationOutcome};

/// Processor that derives identities and validates documents.
///
/// Both steps are pure; the processor holds no mutable state and is shared
/// by all workers.
#[derive(Clone)]
pub struct DocumentProcessor {
    fingerprinter: Fingerprinter,
    validator: Arc<Validator>,
}

impl DocumentProcessor {
    /// Create a processor with the standard rule chain.
    pub fn new(config: &ValidatorConfig) -> Self {
        Self::with_validator(Validator::standard(config))
    }

    /// Create a processor with a custom rule chain.
    pub fn with_validator(validator: Validator) -> Self {
        Self {
            fingerprinter: Fingerprinter::new(),
            validator: Arc::new(validator),
        }
    }

    pub fn fingerprint(&self, document: &RawDocument) -> Result<Fingerprint, PipelineError> {
        self.fingerprinter.fingerprint(document)
    }

    /// Run the validator on the blocking pool.
    ///
    /// Rules may block (model calls wait up to their timeout), so they never
    /// run on a runtime worker thread. A panicking rule quarantines the
    /// document rather than losing it.
    pub async fn validate(&self, document: Arc<RawDocument>) -> ValidationOutcome {
        let validator = self.validator.clone();
        let document_id = document.document_id;

        match tokio::task::spawn_blocking(move || validator.validate(&document)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(document_id = %document_id, error = %e, "Validator task failed");
                ValidationOutcome::Quarantined(Reason::new("validator_error", e.to_string()))
            }
        }
    }
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(&ValidatorConfig::default())
    }
}
