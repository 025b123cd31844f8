//! File-backed archive sink.
//!
//! Committed documents are written to `<root>/committed/<YYYY-MM-DD>/<fingerprint>.json`
//! and quarantined documents to `<root>/quarantine/<YYYY-MM-DD>/<document_id>.json`.
//! Each file is a JSON envelope holding the document metadata and its payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::ArchiveConfig;
use crate::errors::SinkError;
use crate::interfaces::SinkAdapter;
use crate::types::CommitReceipt;
use ingest_shared::{DeclaredKey, Fingerprint, RawDocument, Reason};

const ENVELOPE_EXTENSION: &str = "json";

/// On-disk envelope for an archived document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedDocument {
    pub document_id: Uuid,
    pub fingerprint: Option<Fingerprint>,
    pub origin: String,
    pub retrieved_at: DateTime<Utc>,
    pub key: Option<DeclaredKey>,
    pub archived_at: DateTime<Utc>,
    /// Set for quarantined documents.
    pub reason: Option<Reason>,
    /// The payload as JSON when it parses, otherwise as (lossy) text.
    pub payload: serde_json::Value,
}

impl ArchivedDocument {
    fn from_document(
        document: &RawDocument,
        fingerprint: Option<&Fingerprint>,
        reason: Option<&Reason>,
    ) -> Self {
        let payload = serde_json::from_slice(&document.payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&document.payload).into_owned())
        });

        Self {
            document_id: document.document_id,
            fingerprint: fingerprint.cloned(),
            origin: document.origin.clone(),
            retrieved_at: document.retrieved_at,
            key: document.key.clone(),
            archived_at: Utc::now(),
            reason: reason.cloned(),
            payload,
        }
    }
}

/// Sink that archives documents as JSON files on the local filesystem.
pub struct ArchiveSink {
    config: ArchiveConfig,
}

impl ArchiveSink {
    /// Create an archive sink with default configuration.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(ArchiveConfig::with_root(root))
    }

    /// Create an archive sink with custom configuration.
    pub fn with_config(config: ArchiveConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    fn encode(&self, envelope: &ArchivedDocument) -> Result<Vec<u8>, SinkError> {
        let bytes = if self.config.pretty {
            serde_json::to_vec_pretty(envelope)?
        } else {
            serde_json::to_vec(envelope)?
        };
        Ok(bytes)
    }

    /// Write the file via a temporary sibling and a rename so readers never
    /// observe a partial envelope.
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Date directories under `dir`, newest first.
    async fn date_dirs(dir: &Path) -> Result<Vec<PathBuf>, SinkError> {
        let mut dirs = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(dirs),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }

        dirs.sort();
        dirs.reverse();
        Ok(dirs)
    }

    fn relative_id(&self, path: &Path) -> String {
        path.strip_prefix(&self.config.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Find an archived envelope for this fingerprint in any date directory.
    async fn find_committed(&self, fingerprint: &Fingerprint) -> Result<Option<PathBuf>, SinkError> {
        let file_name = format!("{}.{}", fingerprint, ENVELOPE_EXTENSION);
        for dir in Self::date_dirs(&self.config.committed_root()).await? {
            let candidate = dir.join(&file_name);
            if tokio::fs::try_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn envelope_files(dir: &Path) -> Result<Vec<PathBuf>, SinkError> {
        let mut files = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENVELOPE_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every committed fingerprint in the archive with its commit id, used to
    /// seed the dedup store at startup.
    #[instrument(skip(self), fields(root = %self.config.root.display()))]
    pub async fn committed_fingerprints(&self) -> Result<Vec<(Fingerprint, String)>, SinkError> {
        let mut committed = Vec::new();
        for dir in Self::date_dirs(&self.config.committed_root()).await? {
            for path in Self::envelope_files(&dir).await? {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    committed.push((Fingerprint::from_hex(stem), self.relative_id(&path)));
                }
            }
        }

        info!(count = committed.len(), "Loaded committed fingerprints from archive");
        Ok(committed)
    }
}

#[async_trait]
impl SinkAdapter for ArchiveSink {
    async fn commit(
        &self,
        document: &RawDocument,
        fingerprint: &Fingerprint,
    ) -> Result<CommitReceipt, SinkError> {
        if let Some(existing) = self.find_committed(fingerprint).await? {
            debug!(
                fingerprint = %fingerprint.short(),
                path = %existing.display(),
                "Document already archived"
            );
            return Ok(CommitReceipt::existing(self.relative_id(&existing)));
        }

        let envelope = ArchivedDocument::from_document(document, Some(fingerprint), None);
        let bytes = self.encode(&envelope)?;
        let path = self
            .config
            .committed_root()
            .join(Self::today())
            .join(format!("{}.{}", fingerprint, ENVELOPE_EXTENSION));

        Self::write_atomic(&path, &bytes).await?;
        debug!(
            document_id = %document.document_id,
            path = %path.display(),
            "Archived document"
        );

        Ok(CommitReceipt::new(self.relative_id(&path)))
    }

    async fn commit_quarantine(
        &self,
        document: &RawDocument,
        fingerprint: Option<&Fingerprint>,
        reason: &Reason,
    ) -> Result<(), SinkError> {
        let envelope = ArchivedDocument::from_document(document, fingerprint, Some(reason));
        let bytes = self.encode(&envelope)?;
        let path = self
            .config
            .quarantine_root()
            .join(Self::today())
            .join(format!("{}.{}", document.document_id, ENVELOPE_EXTENSION));

        Self::write_atomic(&path, &bytes).await?;
        debug!(
            document_id = %document.document_id,
            reason = %reason,
            "Quarantined document"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SinkError> {
        tokio::fs::create_dir_all(&self.config.root).await?;
        let metadata = tokio::fs::metadata(&self.config.root).await?;
        Ok(metadata.is_dir() && !metadata.permissions().readonly())
    }
}
