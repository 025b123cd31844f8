//! # Ingest Repository
//!
//! This crate provides the storage seams of the ingestion core: the
//! `SinkAdapter` trait the pipeline commits documents through, the
//! `DedupStore` trait that tracks fingerprint reservations, and concrete
//! implementations (an in-memory dedup store and a file-backed archive sink).

pub mod archive;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod interfaces;
pub mod types;

pub use archive::ArchiveSink;
pub use config::ArchiveConfig;
pub use dedup::InMemoryDedupStore;
pub use errors::{DedupError, SinkError};
pub use interfaces::{DedupStore, SinkAdapter};
pub use types::{CommitReceipt, DedupEntry, DedupStatus};
