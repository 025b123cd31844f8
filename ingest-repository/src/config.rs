//! Configuration types for the archive sink.

use std::path::PathBuf;

/// Directory name for committed documents under the archive root.
pub const COMMITTED_DIR: &str = "committed";

/// Directory name for quarantined documents under the archive root.
pub const QUARANTINE_DIR: &str = "quarantine";

/// Configuration for the ArchiveSink.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Root directory of the archive.
    pub root: PathBuf,
    /// Pretty-print the archived JSON envelopes.
    pub pretty: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/archive"),
            pretty: true,
        }
    }
}

impl ArchiveConfig {
    /// Create a config rooted at the given directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn committed_root(&self) -> PathBuf {
        self.root.join(COMMITTED_DIR)
    }

    pub fn quarantine_root(&self) -> PathBuf {
        self.root.join(QUARANTINE_DIR)
    }
}
