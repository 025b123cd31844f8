//! Dependency initialization and wiring for the ingest service.

use std::sync::Arc;
use tracing::info;

use crate::{ServiceConfig, ServiceError};
use ingest_pipeline::{DocumentProcessor, Orchestrator};
use ingest_repository::{ArchiveSink, InMemoryDedupStore, SinkAdapter};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
    /// Dedup store shared with the orchestrator, used by the producer's
    /// existence pre-check.
    pub dedup: Arc<InMemoryDedupStore>,
    pub archive: Arc<ArchiveSink>,
}

impl Dependencies {
    /// Initialize all dependencies from the service configuration.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(ServiceError)` - If the archive is unusable
    pub async fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        info!(
            source_dir = %config.source_dir.display(),
            archive_dir = %config.archive.root.display(),
            workers = config.orchestrator.workers,
            queue_capacity = config.queue_capacity,
            "Initializing dependencies"
        );

        let archive = Arc::new(ArchiveSink::with_config(config.archive.clone()));

        // Verify the archive is writable
        let healthy = archive
            .health_check()
            .await
            .map_err(|e| ServiceError::config(format!("Archive health check failed: {}", e)))?;

        if !healthy {
            return Err(ServiceError::config("Archive is not writable"));
        }

        info!("Archive verified");

        // Rebuild the dedup index from what is already archived
        let committed = archive.committed_fingerprints().await?;
        let dedup = Arc::new(InMemoryDedupStore::with_committed(committed));

        let processor = DocumentProcessor::new(&config.validator);

        let orchestrator = Orchestrator::with_config(
            processor,
            dedup.clone(),
            archive.clone(),
            config.orchestrator.clone(),
        );

        Ok(Self {
            orchestrator,
            dedup,
            archive,
        })
    }
}
