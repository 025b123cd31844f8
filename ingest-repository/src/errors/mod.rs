//! Error types for the ingest repository.

mod dedup_error;
mod sink_error;

pub use dedup_error::DedupError;
pub use sink_error::SinkError;
