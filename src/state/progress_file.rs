//! Human-readable snapshot of the crawl state
//!
//! The database row set is authoritative. This TOML file mirrors it at
//! startup and after every commit so operators can inspect progress without
//! opening SQLite.
//!
//! The snapshot is only read when the database holds no crawl state, such as
//! after the database file was lost or recreated. Hand edits made while the
//! database still has state are overwritten on the next start.

use crate::state::CrawlState;
use crate::storage::StorageError;
use std::path::{Path, PathBuf};

/// TOML snapshot of [`CrawlState`] on disk
#[derive(Debug, Clone)]
pub struct ProgressFile {
    path: PathBuf,
}

impl ProgressFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot, `Ok(None)` if it was never written
    pub fn load(&self) -> Result<Option<CrawlState>, StorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Serialization(format!("{}: {}", self.path.display(), e)))
    }

    /// Replaces the snapshot
    ///
    /// Written to a sibling temporary file and renamed over the old one, so
    /// a crash leaves either the previous or the new snapshot, never half.
    pub fn store(&self, state: &CrawlState) -> Result<(), StorageError> {
        let content =
            toml::to_string(state).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
