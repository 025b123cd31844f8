//! Loader module for the ingest pipeline.
//!
//! Commits accepted documents to the sink, retrying transient failures with
//! exponential backoff.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use ingest_repository::{CommitReceipt, SinkAdapter};
use ingest_shared::{Fingerprint, IngestionRecord, RawDocument, Reason};

/// Retry policy for sink commits.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total commit attempts per record, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// How a commit with retries ended.
#[derive(Debug)]
pub enum CommitOutcome {
    /// The sink accepted the document.
    Committed(CommitReceipt),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last_error: String },
    /// The sink refused the document for good.
    Permanent { error: String },
}

/// Loader that commits documents through a sink adapter.
#[derive(Clone)]
pub struct SinkLoader {
    sink: Arc<dyn SinkAdapter>,
    config: RetryConfig,
}

impl SinkLoader {
    /// Create a new sink loader with the default retry policy.
    pub fn new(sink: Arc<dyn SinkAdapter>) -> Self {
        Self {
            sink,
            config: RetryConfig::default(),
        }
    }

    /// Create a new sink loader with a custom retry policy.
    pub fn with_config(sink: Arc<dyn SinkAdapter>, config: RetryConfig) -> Self {
        Self { sink, config }
    }

    /// Commit a validated record, retrying transient failures.
    ///
    /// Each failed attempt that will be retried moves the record to
    /// `RetryPending`. The final transition (committed or failed) is left to
    /// the caller, which also owns the dedup reservation.
    pub async fn commit(
        &self,
        record: &mut IngestionRecord,
        fingerprint: &Fingerprint,
    ) -> Result<CommitOutcome, PipelineError> {
        let document = record.document().clone();
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.sink.commit(&document, fingerprint).await {
                Ok(receipt) => {
                    if attempt > 1 {
                        info!(
                            attempt = attempt,
                            document_id = %document.document_id,
                            "Commit succeeded after retry"
                        );
                    }
                    return Ok(CommitOutcome::Committed(receipt));
                }
                Err(e) if !e.is_retryable() => {
                    debug!(
                        document_id = %document.document_id,
                        error = %e,
                        "Non-retryable sink error encountered"
                    );
                    return Ok(CommitOutcome::Permanent {
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    // Don't wait after the last attempt
                    if attempt == max_attempts {
                        return Ok(CommitOutcome::Exhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = self.config.delay_for(attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        document_id = %document.document_id,
                        error = %e,
                        "Commit failed, retrying"
                    );
                    record.retry_pending(Reason::new("sink", e.to_string()))?;
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        Ok(CommitOutcome::Exhausted {
            attempts: max_attempts,
            last_error: "no commit attempt made".to_string(),
        })
    }

    /// Route a document to the quarantine area.
    pub async fn quarantine(
        &self,
        document: &RawDocument,
        fingerprint: Option<&Fingerprint>,
        reason: &Reason,
    ) -> Result<(), PipelineError> {
        Ok(self.sink.commit_quarantine(document, fingerprint, reason).await?)
    }
}
