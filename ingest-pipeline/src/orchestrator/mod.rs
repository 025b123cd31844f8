//! Orchestrator module for the ingest pipeline.
//!
//! Runs a pool of workers that pull documents from the queue and drive each
//! one through fingerprinting, dedup, validation and the sink commit.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use crate::loader::{CommitOutcome, RetryConfig, SinkLoader};
use crate::outcomes::{OutcomeLog, OutcomeStats};
use crate::processor::DocumentProcessor;
use crate::queue::QueueConsumer;
use ingest_repository::{DedupStore, SinkAdapter};
use ingest_shared::{
    Fingerprint, IngestionRecord, RawDocument, Reason, RecordState, ValidationOutcome,
};

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Retry policy for sink commits.
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Shutdown level. Only ever escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownMode {
    Running,
    /// Stop dequeuing; in-flight records finish.
    Drain,
    /// Abort in-flight records.
    HardStop,
}

/// Cloneable handle for stopping a running orchestrator.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<ShutdownMode>>,
}

impl ShutdownHandle {
    /// Stop taking new documents and let in-flight records finish.
    pub fn drain(&self) {
        self.escalate(ShutdownMode::Drain);
    }

    /// Abort in-flight records. They are reported as retryable failures and
    /// their reservations are released.
    pub fn hard_stop(&self) {
        self.escalate(ShutdownMode::HardStop);
    }

    pub fn mode(&self) -> ShutdownMode {
        *self.tx.borrow()
    }

    fn escalate(&self, mode: ShutdownMode) {
        let changed = self.tx.send_if_modified(|current| {
            if mode > *current {
                *current = mode;
                true
            } else {
                false
            }
        });
        if changed {
            info!(mode = ?mode, "Shutdown requested");
        }
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunSummary {
    /// Outcome counters when the run ended.
    pub stats: OutcomeStats,
    pub duration_ms: u64,
}

/// Orchestrator that coordinates the pipeline components.
///
/// The orchestrator:
/// - Spawns the worker pool and waits for it to finish
/// - Owns the shutdown signal shared with the workers
/// - Reports every terminal record to the outcome log
pub struct Orchestrator {
    processor: DocumentProcessor,
    dedup: Arc<dyn DedupStore>,
    loader: SinkLoader,
    outcomes: Arc<OutcomeLog>,
    config: OrchestratorConfig,
    shutdown_tx: Arc<watch::Sender<ShutdownMode>>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given components.
    pub fn new(
        processor: DocumentProcessor,
        dedup: Arc<dyn DedupStore>,
        sink: Arc<dyn SinkAdapter>,
    ) -> Self {
        Self::with_config(processor, dedup, sink, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        processor: DocumentProcessor,
        dedup: Arc<dyn DedupStore>,
        sink: Arc<dyn SinkAdapter>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(ShutdownMode::Running);

        Self {
            processor,
            dedup,
            loader: SinkLoader::with_config(sink, config.retry.clone()),
            outcomes: Arc::new(OutcomeLog::new()),
            config,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// The outcome log, for triage and resubmission.
    pub fn outcomes(&self) -> Arc<OutcomeLog> {
        self.outcomes.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown_handle().drain();
    }

    /// Run the worker pool until the queue is closed and drained, or until
    /// shutdown is requested.
    ///
    /// The queue is closed on return. Documents still buffered at that point
    /// are reported as retryable `drained` failures.
    #[instrument(skip(self, consumer), fields(workers = self.config.workers))]
    pub async fn run(&self, consumer: QueueConsumer) -> Result<RunSummary, PipelineError> {
        if self.config.workers == 0 {
            return Err(PipelineError::config("at least one worker is required"));
        }

        info!("Starting ingestion orchestrator");
        let started = Instant::now();

        let handles: Vec<_> = (0..self.config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    processor: self.processor.clone(),
                    dedup: self.dedup.clone(),
                    loader: self.loader.clone(),
                    outcomes: self.outcomes.clone(),
                };
                tokio::spawn(worker.run(consumer.clone(), self.shutdown_tx.subscribe()))
            })
            .collect();

        let mut failure = None;
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
                failure.get_or_insert_with(|| PipelineError::worker(e.to_string()));
            }
        }

        self.report_unprocessed(consumer.close().await);

        let summary = RunSummary {
            stats: self.outcomes.stats(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            committed = summary.stats.committed,
            rejected = summary.stats.rejected,
            duplicates = summary.stats.duplicates,
            quarantined = summary.stats.quarantined,
            failed = summary.stats.failed,
            duration_ms = summary.duration_ms,
            "Orchestrator shutdown complete"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Fail documents that were still queued when the workers stopped, so
    /// they show up in triage and can be resubmitted.
    fn report_unprocessed(&self, documents: Vec<Arc<RawDocument>>) {
        if documents.is_empty() {
            return;
        }
        warn!(count = documents.len(), "Workers stopped with documents still queued");

        for document in documents {
            let mut record = IngestionRecord::received(document);
            match record.failed(Reason::new("drained", "still queued at shutdown"), true, false) {
                Ok(()) => self.outcomes.record(&record),
                Err(e) => error!(error = %e, "Could not fail queued record"),
            }
        }
    }
}

/// Non-terminal states in which the record holds a dedup reservation.
fn holds_reservation(state: RecordState) -> bool {
    matches!(
        state,
        RecordState::DedupChecked | RecordState::Validated | RecordState::RetryPending
    )
}

struct Worker {
    id: usize,
    processor: DocumentProcessor,
    dedup: Arc<dyn DedupStore>,
    loader: SinkLoader,
    outcomes: Arc<OutcomeLog>,
}

impl Worker {
    async fn run(self, consumer: QueueConsumer, mut shutdown: watch::Receiver<ShutdownMode>) {
        debug!(worker = self.id, "Worker started");

        loop {
            let document = tokio::select! {
                biased;
                _ = shutdown.wait_for(|mode| *mode >= ShutdownMode::Drain) => break,
                document = consumer.dequeue() => match document {
                    Some(document) => document,
                    None => break,
                },
            };
            self.handle(document, &mut shutdown).await;
        }

        debug!(worker = self.id, "Worker stopped");
    }

    async fn handle(&self, document: Arc<RawDocument>, shutdown: &mut watch::Receiver<ShutdownMode>) {
        let mut record = IngestionRecord::received(document);

        // `None` when a hard stop interrupted processing.
        let result = {
            let processing = self.process(&mut record);
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|mode| *mode == ShutdownMode::HardStop) => None,
                result = processing => Some(result),
            }
        };

        let aborted = result.is_none();
        if let Some(Err(e)) = result {
            error!(
                worker = self.id,
                document_id = %record.document().document_id,
                error = %e,
                "Record processing failed"
            );
        }

        if !record.state().is_terminal() {
            let (reason, retryable) = if aborted {
                (Reason::new("hard_stop", "aborted by hard stop"), true)
            } else {
                (Reason::new("internal", "processing ended without an outcome"), false)
            };
            self.settle_unfinished(&mut record, reason, retryable);
        }

        self.outcomes.record(&record);
    }

    /// Drive one record to a terminal state.
    async fn process(&self, record: &mut IngestionRecord) -> Result<(), PipelineError> {
        let document = record.document().clone();

        let fingerprint = match self.processor.fingerprint(&document) {
            Ok(fingerprint) => fingerprint,
            Err(PipelineError::MalformedDocument(detail)) => {
                record.rejected(Reason::malformed(detail))?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        record.fingerprinted(fingerprint.clone())?;

        if !self.dedup.reserve(&fingerprint) {
            record.rejected(Reason::duplicate(fingerprint.as_str()))?;
            return Ok(());
        }
        record.dedup_checked()?;

        let outcome = self.processor.validate(document.clone()).await;
        record.validated(outcome.clone())?;

        match outcome {
            ValidationOutcome::Rejected(reason) => {
                self.dedup.mark_rejected(&fingerprint);
                record.rejected(reason)?;
            }
            ValidationOutcome::Quarantined(reason) => {
                if let Err(e) = self
                    .loader
                    .quarantine(&document, Some(&fingerprint), &reason)
                    .await
                {
                    error!(
                        document_id = %document.document_id,
                        fingerprint = %fingerprint.short(),
                        error = %e,
                        "Failed to write quarantined document"
                    );
                }
                self.dedup.mark_quarantined(&fingerprint);
                record.quarantined(reason)?;
            }
            ValidationOutcome::Accepted => self.commit(record, &fingerprint).await?,
        }

        Ok(())
    }

    async fn commit(
        &self,
        record: &mut IngestionRecord,
        fingerprint: &Fingerprint,
    ) -> Result<(), PipelineError> {
        match self.loader.commit(record, fingerprint).await? {
            CommitOutcome::Committed(receipt) => {
                if receipt.already_present {
                    debug!(
                        fingerprint = %fingerprint.short(),
                        commit_id = %receipt.commit_id,
                        "Sink already held the document"
                    );
                }
                self.dedup.mark_committed(fingerprint, &receipt.commit_id);
                record.committed(receipt.commit_id)?;
            }
            CommitOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                record.failed(
                    Reason::new(
                        "retry_exhausted",
                        format!("{} attempts, last error: {}", attempts, last_error),
                    ),
                    true,
                    true,
                )?;
                self.release(fingerprint);
            }
            CommitOutcome::Permanent { error } => {
                record.failed(Reason::new("sink", error), false, true)?;
                self.release(fingerprint);
            }
        }
        Ok(())
    }

    /// Fail a record that was interrupted, giving back its reservation.
    fn settle_unfinished(&self, record: &mut IngestionRecord, reason: Reason, retryable: bool) {
        let reserved = holds_reservation(record.state());

        if let Err(e) = record.failed(reason, retryable, false) {
            error!(error = %e, "Could not fail interrupted record");
            return;
        }
        if reserved {
            if let Some(fingerprint) = record.fingerprint() {
                self.release(fingerprint);
            }
        }
    }

    fn release(&self, fingerprint: &Fingerprint) {
        if let Err(e) = self.dedup.release(fingerprint) {
            warn!(fingerprint = %fingerprint.short(), error = %e, "Failed to release reservation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcomes::TriageFilter;
    use crate::processor::ValidatorConfig;
    use crate::queue::{bounded, EnqueueMode};
    use async_trait::async_trait;
    use ingest_repository::{CommitReceipt, DedupStatus, InMemoryDedupStore, SinkError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Permanent,
        Hang,
        /// Wait for `release` before succeeding.
        Gated,
    }

    struct MockSink {
        behavior: Behavior,
        commits: AtomicUsize,
        quarantines: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    impl MockSink {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                commits: AtomicUsize::new(0),
                quarantines: AtomicUsize::new(0),
                entered: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl SinkAdapter for MockSink {
        async fn commit(
            &self,
            _document: &RawDocument,
            fingerprint: &Fingerprint,
        ) -> Result<CommitReceipt, SinkError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(CommitReceipt::new(fingerprint.as_str())),
                Behavior::Permanent => Err(SinkError::permanent("index rejected document")),
                Behavior::Hang => {
                    self.entered.notify_one();
                    std::future::pending().await
                }
                Behavior::Gated => {
                    self.entered.notify_one();
                    self.release.notified().await;
                    Ok(CommitReceipt::new(fingerprint.as_str()))
                }
            }
        }

        async fn commit_quarantine(
            &self,
            _document: &RawDocument,
            _fingerprint: Option<&Fingerprint>,
            _reason: &Reason,
        ) -> Result<(), SinkError> {
            self.quarantines.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn health_check(&self) -> Result<bool, SinkError> {
            Ok(true)
        }
    }

    fn article(n: usize) -> RawDocument {
        RawDocument::keyed("argos", format!("http://x/{}", n), "2024-01-01", "body")
    }

    fn orchestrator(
        sink: Arc<MockSink>,
        dedup: Arc<InMemoryDedupStore>,
        validator: &ValidatorConfig,
    ) -> Orchestrator {
        Orchestrator::with_config(
            DocumentProcessor::new(validator),
            dedup,
            sink,
            OrchestratorConfig::default().with_workers(2),
        )
    }

    #[tokio::test]
    async fn test_commits_and_marks_fingerprint() {
        let sink = MockSink::new(Behavior::Succeed);
        let dedup = Arc::new(InMemoryDedupStore::new());
        let orch = orchestrator(sink.clone(), dedup.clone(), &ValidatorConfig::default());

        let (producer, consumer) = bounded(8).unwrap();
        let doc = article(1);
        producer.enqueue(doc.clone()).await.unwrap();
        drop(producer);

        let summary = orch.run(consumer).await.unwrap();

        assert_eq!(summary.stats.committed, 1);
        assert_eq!(sink.commits.load(Ordering::SeqCst), 1);
        let fp = crate::Fingerprinter::new().fingerprint(&doc).unwrap();
        assert!(dedup.entry(&fp).unwrap().is_committed());
    }

    #[tokio::test]
    async fn test_malformed_document_rejected() {
        let sink = MockSink::new(Behavior::Succeed);
        let orch = orchestrator(sink.clone(), Arc::new(InMemoryDedupStore::new()), &ValidatorConfig::default());

        let (producer, consumer) = bounded(8).unwrap();
        producer
            .enqueue(RawDocument::new("argos", None, Vec::new()))
            .await
            .unwrap();
        drop(producer);

        let summary = orch.run(consumer).await.unwrap();
        assert_eq!(summary.stats.rejected, 1);
        assert_eq!(summary.stats.duplicates, 0);
        assert_eq!(sink.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_quarantine_keeps_reservation() {
        let sink = MockSink::new(Behavior::Succeed);
        let dedup = Arc::new(InMemoryDedupStore::new());
        let validator = ValidatorConfig::default().with_allowed_sources(["trusted"]);
        let orch = orchestrator(sink.clone(), dedup.clone(), &validator);

        let (producer, consumer) = bounded(8).unwrap();
        let doc = article(1);
        producer.enqueue(doc.clone()).await.unwrap();
        drop(producer);

        let summary = orch.run(consumer).await.unwrap();

        assert_eq!(summary.stats.quarantined, 1);
        assert_eq!(sink.quarantines.load(Ordering::SeqCst), 1);
        assert_eq!(sink.commits.load(Ordering::SeqCst), 0);

        let fp = crate::Fingerprinter::new().fingerprint(&doc).unwrap();
        assert_eq!(dedup.entry(&fp).unwrap().status, DedupStatus::Quarantined);
        assert_eq!(orch.outcomes().triage(TriageFilter::Quarantined).len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_releases_immediately() {
        let sink = MockSink::new(Behavior::Permanent);
        let dedup = Arc::new(InMemoryDedupStore::new());
        let orch = orchestrator(sink.clone(), dedup.clone(), &ValidatorConfig::default());

        let (producer, consumer) = bounded(8).unwrap();
        producer.enqueue(article(1)).await.unwrap();
        drop(producer);

        let summary = orch.run(consumer).await.unwrap();

        assert_eq!(summary.stats.failed, 1);
        assert_eq!(sink.commits.load(Ordering::SeqCst), 1);
        assert!(dedup.is_empty());

        let failed = orch.outcomes().triage(TriageFilter::Failed);
        assert_eq!(failed.len(), 1);
        assert!(!failed[0].retryable);
        assert_eq!(failed[0].attempts, 1);
        assert!(failed[0].reason.as_ref().unwrap().is("sink"));
    }

    #[tokio::test]
    async fn test_hard_stop_fails_in_flight_records() {
        let sink = MockSink::new(Behavior::Hang);
        let dedup = Arc::new(InMemoryDedupStore::new());
        let orch = Arc::new(Orchestrator::with_config(
            DocumentProcessor::default(),
            dedup.clone(),
            sink.clone(),
            OrchestratorConfig::default().with_workers(1),
        ));
        let handle = orch.shutdown_handle();

        let (producer, consumer) = bounded(8).unwrap();
        producer.enqueue(article(1)).await.unwrap();

        let running = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run(consumer).await })
        };

        sink.entered.notified().await;
        handle.hard_stop();
        let summary = running.await.unwrap().unwrap();

        assert_eq!(summary.stats.failed, 1);
        assert!(dedup.is_empty());
        let failed = orch.outcomes().triage(TriageFilter::Failed);
        assert!(failed[0].retryable);
        assert!(failed[0].reason.as_ref().unwrap().is("hard_stop"));
        assert_eq!(handle.mode(), ShutdownMode::HardStop);
        drop(producer);
    }

    #[tokio::test]
    async fn test_drain_stops_idle_workers() {
        let orch = Arc::new(orchestrator(
            MockSink::new(Behavior::Succeed),
            Arc::new(InMemoryDedupStore::new()),
            &ValidatorConfig::default(),
        ));
        let (producer, consumer) = bounded(8).unwrap();

        let running = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run(consumer).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        orch.shutdown();

        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.stats.total(), 0);

        // Shutdown never de-escalates.
        orch.shutdown_handle().hard_stop();
        orch.shutdown_handle().drain();
        assert_eq!(orch.shutdown_handle().mode(), ShutdownMode::HardStop);
        drop(producer);
    }

    #[tokio::test]
    async fn test_drain_finishes_in_flight_record() {
        let sink = MockSink::new(Behavior::Gated);
        let dedup = Arc::new(InMemoryDedupStore::new());
        let orch = Arc::new(Orchestrator::with_config(
            DocumentProcessor::default(),
            dedup.clone(),
            sink.clone(),
            OrchestratorConfig::default().with_workers(1),
        ));

        let (producer, consumer) = bounded(8).unwrap();
        let in_flight = article(1);
        let queued = article(2);
        producer.enqueue(in_flight.clone()).await.unwrap();
        producer.enqueue(queued.clone()).await.unwrap();

        let running = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run(consumer).await })
        };

        sink.entered.notified().await;
        orch.shutdown();
        sink.release.notify_one();
        let summary = running.await.unwrap().unwrap();

        assert_eq!(summary.stats.committed, 1);
        assert_eq!(summary.stats.failed, 1);
        assert_eq!(sink.commits.load(Ordering::SeqCst), 1);
        let fp = crate::Fingerprinter::new().fingerprint(&in_flight).unwrap();
        assert!(dedup.entry(&fp).unwrap().is_committed());

        // The document that never left the queue is reported, not lost.
        let failed = orch.outcomes().triage(TriageFilter::Failed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].document.document_id, queued.document_id);
        assert!(failed[0].retryable);
        assert!(failed[0].reason.as_ref().unwrap().is("drained"));
        assert!(matches!(
            producer.enqueue(article(3)).await,
            Err(crate::QueueError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_queued_documents_reported_on_shutdown() {
        let sink = MockSink::new(Behavior::Succeed);
        let dedup = Arc::new(InMemoryDedupStore::new());
        let orch = orchestrator(sink.clone(), dedup.clone(), &ValidatorConfig::default());

        let (producer, consumer) = bounded(8).unwrap();
        for n in 0..3 {
            producer.enqueue(article(n)).await.unwrap();
        }
        orch.shutdown();

        let summary = orch.run(consumer).await.unwrap();

        assert_eq!(summary.stats.failed, 3);
        assert_eq!(summary.stats.committed, 0);
        assert_eq!(sink.commits.load(Ordering::SeqCst), 0);
        assert!(dedup.is_empty());

        let failed = orch.outcomes().triage(TriageFilter::Failed);
        assert_eq!(failed.len(), 3);
        assert!(failed.iter().all(|e| e.retryable && e.attempts == 0));

        let (retry_queue, _retry_consumer) = bounded(8).unwrap();
        for entry in failed {
            orch.outcomes()
                .resubmit(entry.document.document_id, &retry_queue, EnqueueMode::NonBlocking)
                .await
                .unwrap();
        }
        assert_eq!(retry_queue.len(), 3);
        assert!(orch.outcomes().triage(TriageFilter::Failed).is_empty());
        drop(producer);
    }

    #[tokio::test]
    async fn test_zero_workers_is_config_error() {
        let orch = Orchestrator::with_config(
            DocumentProcessor::default(),
            Arc::new(InMemoryDedupStore::new()),
            MockSink::new(Behavior::Succeed),
            OrchestratorConfig::default().with_workers(0),
        );
        let (_producer, consumer) = bounded(1).unwrap();
        assert!(matches!(orch.run(consumer).await, Err(PipelineError::ConfigError(_))));
    }
}
