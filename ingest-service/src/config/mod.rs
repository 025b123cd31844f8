//! Service configuration.

mod dependencies;

pub use dependencies::Dependencies;

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::ServiceError;
use ingest_pipeline::{OrchestratorConfig, RetryConfig, ValidatorConfig};
use ingest_repository::ArchiveConfig;

/// Default directory scanned for article files.
const DEFAULT_SOURCE_DIR: &str = "data/raw_news";

/// Default archive root.
const DEFAULT_ARCHIVE_DIR: &str = "data/archive";

/// Default origin for files without a `source` field.
const DEFAULT_ORIGIN: &str = "raw_news";

/// Default queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Settings for one service run.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub source_dir: PathBuf,
    pub default_origin: String,
    /// Upper bound on documents enqueued per run.
    pub limit: Option<usize>,
    pub queue_capacity: usize,
    pub archive: ArchiveConfig,
    pub orchestrator: OrchestratorConfig,
    pub validator: ValidatorConfig,
}

impl ServiceConfig {
    /// Read the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `INGEST_SOURCE_DIR`: Directory of `<date>/*.json` files (default: data/raw_news)
    /// - `INGEST_ARCHIVE_DIR`: Archive root (default: data/archive)
    /// - `INGEST_QUEUE_CAPACITY`: Queue bound (default: 1000)
    /// - `INGEST_WORKERS`: Worker tasks (default: 4)
    /// - `INGEST_MAX_ATTEMPTS`: Commit attempts per document (default: 3)
    /// - `INGEST_RETRY_INITIAL_MS` / `INGEST_RETRY_MAX_MS`: Backoff (default: 100 / 5000)
    /// - `INGEST_MAX_PAYLOAD_BYTES`: Payload bound (default: 1048576)
    /// - `INGEST_REQUIRED_FIELDS`: Comma-separated JSON fields (default: none)
    /// - `INGEST_ALLOWED_SOURCES`: Comma-separated origins (default: all)
    /// - `INGEST_DEFAULT_ORIGIN`: Origin for files without `source` (default: raw_news)
    /// - `INGEST_LIMIT`: Maximum documents to enqueue (default: unlimited)
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig::default()
            .with_max_attempts(parse(&var, "INGEST_MAX_ATTEMPTS", retry_defaults.max_attempts)?)
            .with_delays(
                parse(&var, "INGEST_RETRY_INITIAL_MS", retry_defaults.initial_delay_ms)?,
                parse(&var, "INGEST_RETRY_MAX_MS", retry_defaults.max_delay_ms)?,
            );
        if retry.max_attempts == 0 {
            return Err(ServiceError::config("INGEST_MAX_ATTEMPTS must be at least 1"));
        }

        let orchestrator = OrchestratorConfig::default()
            .with_workers(parse(&var, "INGEST_WORKERS", OrchestratorConfig::default().workers)?)
            .with_retry(retry);
        if orchestrator.workers == 0 {
            return Err(ServiceError::config("INGEST_WORKERS must be at least 1"));
        }

        let validator = ValidatorConfig::default()
            .with_max_payload_bytes(parse(
                &var,
                "INGEST_MAX_PAYLOAD_BYTES",
                ValidatorConfig::default().max_payload_bytes,
            )?)
            .with_required_fields(list(&var, "INGEST_REQUIRED_FIELDS"))
            .with_allowed_sources(list(&var, "INGEST_ALLOWED_SOURCES"));

        let queue_capacity = parse(&var, "INGEST_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        if queue_capacity == 0 {
            return Err(ServiceError::config("INGEST_QUEUE_CAPACITY must be at least 1"));
        }

        let limit = match var("INGEST_LIMIT") {
            Some(_) => Some(parse(&var, "INGEST_LIMIT", 0usize)?),
            None => None,
        };

        Ok(Self {
            source_dir: var("INGEST_SOURCE_DIR")
                .unwrap_or_else(|| DEFAULT_SOURCE_DIR.to_string())
                .into(),
            default_origin: var("INGEST_DEFAULT_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string()),
            limit,
            queue_capacity,
            archive: ArchiveConfig::with_root(
                var("INGEST_ARCHIVE_DIR").unwrap_or_else(|| DEFAULT_ARCHIVE_DIR.to_string()),
            ),
            orchestrator,
            validator,
        })
    }
}

fn parse<T, F>(var: &F, name: &str, default: T) -> Result<T, ServiceError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ServiceError::config(format!("{} has invalid value '{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

fn list<F>(var: &F, name: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
