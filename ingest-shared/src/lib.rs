//! # Ingest Shared
//!
//! Shared types for the document ingestion core: the raw documents producers
//! hand in, the fingerprints derived from them, and the per-record state that
//! the pipeline tracks until a document reaches a terminal outcome.

pub mod document;
pub mod fingerprint;
pub mod outcome;
pub mod record;

pub use document::{DeclaredKey, RawDocument};
pub use fingerprint::Fingerprint;
pub use outcome::{Reason, SinkResult, ValidationOutcome};
pub use record::{IngestionRecord, InvalidTransition, RecordState};
