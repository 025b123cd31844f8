//! # Ingest Pipeline
//!
//! This crate provides the pipeline components that take raw documents from
//! producers and persist each logical document exactly once.
//!
//! ## Architecture
//!
//! The pipeline follows the Queue-Processor-Loader pattern:
//!
//! 1. **Queue**: Bounded buffer between producers and workers (backpressure)
//! 2. **Processor**: Fingerprints and validates documents
//! 3. **Loader**: Commits accepted documents to the sink with retries
//! 4. **Orchestrator**: Runs the workers, drives each record's state machine
//! 5. **Outcomes**: Records terminal outcomes; operator triage and resubmit

pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod outcomes;
pub mod processor;
pub mod queue;

pub use errors::{OperatorError, PipelineError, QueueError};
pub use loader::{CommitOutcome, RetryConfig, SinkLoader};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, RunSummary, ShutdownHandle, ShutdownMode,
};
pub use outcomes::{OutcomeLog, OutcomeStats, TriageEntry, TriageFilter};
pub use processor::{DocumentProcessor, Fingerprinter, Validator, ValidatorConfig};
pub use queue::{bounded, Ack, EnqueueMode, QueueConsumer, QueueProducer};
