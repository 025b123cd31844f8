//! # Ingest Service
//!
//! Main library for the document ingestion service.
//!
//! This crate provides the configuration, dependency wiring and the
//! directory producer used by the `ingest-service` binary.

pub mod config;
pub mod producer;

pub use config::{Dependencies, ServiceConfig};
pub use producer::{DirectoryProducer, ProducerReport};

use thiserror::Error;

/// Errors that can occur during service initialization or execution.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] ingest_pipeline::PipelineError),

    /// Queue error.
    #[error("Queue error: {0}")]
    QueueError(#[from] ingest_pipeline::QueueError),

    /// Sink error.
    #[error("Sink error: {0}")]
    SinkError(#[from] ingest_repository::SinkError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ServiceError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
