//! Directory producer.
//!
//! Reads article files laid out as `<source_dir>/<date>/<id>.json` and feeds
//! them to the ingestion queue. Files whose fingerprint the dedup store
//! already knows are skipped before they are enqueued.

use serde_json::Value;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::{ServiceConfig, ServiceError};
use ingest_pipeline::{
    EnqueueMode, Fingerprinter, QueueError, QueueProducer, ShutdownHandle, ShutdownMode,
};
use ingest_repository::DedupStore;
use ingest_shared::{DeclaredKey, Fingerprint, RawDocument};

/// Files checked against the dedup store per batch.
const CHECK_BATCH_SIZE: usize = 500;

/// What one producer run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Article files found under the source directory.
    pub found: usize,
    /// Skipped because the fingerprint was already known.
    pub already_present: usize,
    /// Files that could not be read.
    pub unreadable: usize,
    pub enqueued: usize,
}

/// Producer that scans a directory of dated article files.
#[derive(Debug, Clone)]
pub struct DirectoryProducer {
    source_dir: PathBuf,
    default_origin: String,
    limit: Option<usize>,
    fingerprinter: Fingerprinter,
}

impl DirectoryProducer {
    pub fn new(source_dir: impl Into<PathBuf>, default_origin: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            default_origin: default_origin.into(),
            limit: None,
            fingerprinter: Fingerprinter::new(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.source_dir, &config.default_origin).with_limit(config.limit)
    }

    /// Cap the number of documents enqueued per run.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Every `*.json` file one level below a date directory, in path order.
    pub async fn scan(&self) -> Result<Vec<PathBuf>, ServiceError> {
        let mut date_dirs = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&self.source_dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(source_dir = %self.source_dir.display(), "Source directory not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                date_dirs.push(entry.path());
            }
        }
        date_dirs.sort();

        let mut files = Vec::new();
        for dir in date_dirs {
            let mut entries = Vec::new();
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                    entries.push(path);
                }
            }
            entries.sort();
            files.extend(entries);
        }
        Ok(files)
    }

    /// Build a document from the raw bytes of an article file.
    ///
    /// The payload is kept as-is. When it is a JSON object, `url` plus
    /// `published_at` (or `pubDate`) form the declared key and `source`
    /// names the origin.
    pub fn parse(&self, bytes: Vec<u8>) -> RawDocument {
        let object = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(object)) => Some(object),
            _ => None,
        };

        let text = |field: &str| {
            object
                .as_ref()
                .and_then(|o| o.get(field))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let origin = text("source").unwrap_or_else(|| self.default_origin.clone());
        let key = text("url").map(|url| {
            DeclaredKey::new(url, text("published_at").or_else(|| text("pubDate")))
        });

        RawDocument::new(origin, key, bytes)
    }

    pub async fn load(&self, path: &Path) -> Result<RawDocument, ServiceError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(self.parse(bytes))
    }

    /// Scan the source directory and enqueue every document the dedup store
    /// has not seen, waiting for queue space as needed.
    ///
    /// Stops early once shutdown is requested or the queue closes.
    #[instrument(skip_all, fields(source_dir = %self.source_dir.display()))]
    pub async fn run(
        &self,
        producer: &QueueProducer,
        dedup: &dyn DedupStore,
        shutdown: &ShutdownHandle,
    ) -> Result<ProducerReport, ServiceError> {
        let files = self.scan().await?;
        let mut report = ProducerReport {
            found: files.len(),
            ..ProducerReport::default()
        };
        info!(found = report.found, "Scanned source directory");

        'batches: for batch in files.chunks(CHECK_BATCH_SIZE) {
            let mut documents = Vec::with_capacity(batch.len());
            for path in batch {
                match self.load(path).await {
                    Ok(document) => {
                        let fingerprint = self.fingerprinter.fingerprint(&document).ok();
                        documents.push((document, fingerprint));
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read article file");
                        report.unreadable += 1;
                    }
                }
            }

            let known: Vec<Fingerprint> = documents.iter().filter_map(|(_, fp)| fp.clone()).collect();
            let missing: HashSet<Fingerprint> = dedup.missing(&known).into_iter().collect();

            for (document, fingerprint) in documents {
                if fingerprint.is_some_and(|fp| !missing.contains(&fp)) {
                    report.already_present += 1;
                    continue;
                }
                if self.limit.is_some_and(|limit| report.enqueued >= limit) {
                    info!(limit = ?self.limit, "Enqueue limit reached");
                    break 'batches;
                }
                if shutdown.mode() != ShutdownMode::Running {
                    info!("Shutdown requested, stopping producer");
                    break 'batches;
                }

                match producer.submit(document, EnqueueMode::Blocking).await {
                    Ok(ack) => {
                        debug!(document_id = %ack.document_id, "Enqueued article");
                        report.enqueued += 1;
                    }
                    Err(QueueError::Closed(_)) => {
                        warn!("Queue closed, stopping producer");
                        break 'batches;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        info!(
            found = report.found,
            already_present = report.already_present,
            unreadable = report.unreadable,
            enqueued = report.enqueued,
            "Producer finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_pipeline::{bounded, DocumentProcessor, Orchestrator};
    use ingest_repository::{ArchiveSink, InMemoryDedupStore};
    use std::sync::Arc;

    fn write(root: &Path, date: &str, name: &str, body: &str) {
        let dir = root.join(date);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn article(url: &str, date: &str) -> String {
        format!(r#"{{"title":"t","url":"{}","pubDate":"{}","source":"argos"}}"#, url, date)
    }

    #[test]
    fn test_parse_key_and_origin() {
        let producer = DirectoryProducer::new("unused", "raw_news");

        let doc = producer.parse(article("https://x/1", "2024-03-01").into_bytes());
        assert_eq!(doc.origin, "argos");
        let key = doc.key.unwrap();
        assert_eq!(key.url, "https://x/1");
        assert_eq!(key.published_at.as_deref(), Some("2024-03-01"));

        let doc = producer.parse(br#"{"url":"https://x/2","published_at":"2024-03-02"}"#.to_vec());
        assert_eq!(doc.origin, "raw_news");
        assert_eq!(doc.key.unwrap().published_at.as_deref(), Some("2024-03-02"));

        let doc = producer.parse(b"not json".to_vec());
        assert!(doc.key.is_none());
        assert_eq!(doc.payload, b"not json");
    }

    #[tokio::test]
    async fn test_scan_only_dated_json_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "2024-03-02", "b.json", "{}");
        write(dir.path(), "2024-03-01", "a.json", "{}");
        write(dir.path(), "2024-03-01", "notes.txt", "x");
        std::fs::write(dir.path().join("stray.json"), "{}").unwrap();

        let files = DirectoryProducer::new(dir.path(), "raw_news").scan().await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);

        let missing = DirectoryProducer::new(dir.path().join("absent"), "raw_news");
        assert!(missing.scan().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_skips_known_and_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "2024-03-01", "a.json", &article("https://x/a", "2024-03-01"));
        write(dir.path(), "2024-03-01", "b.json", &article("https://x/b", "2024-03-01"));
        write(dir.path(), "2024-03-02", "c.json", &article("https://x/c", "2024-03-02"));

        let producer = DirectoryProducer::new(dir.path(), "raw_news");
        let known = producer.parse(article("https://x/a", "2024-03-01").into_bytes());
        let fp = Fingerprinter::new().fingerprint(&known).unwrap();
        let dedup = InMemoryDedupStore::with_committed([(fp, "c-a".to_string())]);

        let archive = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(
            DocumentProcessor::default(),
            Arc::new(InMemoryDedupStore::new()),
            Arc::new(ArchiveSink::new(archive.path())),
        );
        let (queue, consumer) = bounded(8).unwrap();

        let report = producer
            .clone()
            .with_limit(Some(1))
            .run(&queue, &dedup, &orch.shutdown_handle())
            .await
            .unwrap();

        assert_eq!(report.found, 3);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.enqueued, 1);
        assert_eq!(queue.len(), 1);
        drop(consumer);
    }

    #[tokio::test]
    async fn test_run_stops_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "2024-03-01", "a.json", &article("https://x/a", "2024-03-01"));

        let archive = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(
            DocumentProcessor::default(),
            Arc::new(InMemoryDedupStore::new()),
            Arc::new(ArchiveSink::new(archive.path())),
        );
        orch.shutdown();

        let (queue, _consumer) = bounded(8).unwrap();
        let report = DirectoryProducer::new(dir.path(), "raw_news")
            .run(&queue, &InMemoryDedupStore::new(), &orch.shutdown_handle())
            .await
            .unwrap();

        assert_eq!(report.found, 1);
        assert_eq!(report.enqueued, 0);
    }
}
