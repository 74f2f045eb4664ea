//! Storage module for persisting harvested articles
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Atomic article commits together with the crawl state
//! - Run tracking for interruption detection

mod schema;
mod sqlite;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use sqlite::{init_database, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// One harvested article, before it has a primary key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    /// Canonical URL, unique per article
    pub source_url: String,
    pub headline: String,
    /// Empty when the page names no author
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Paragraphs joined by a blank line
    pub body: String,
    pub links: Vec<String>,
    /// Stored file per embedded image, in document order; `None` marks a
    /// download that failed
    pub attachments: Vec<Option<String>>,
    pub tags: Vec<String>,
    /// ISO 3166-1 alpha-2 code, `None` if the country is unknown
    pub country_code: Option<String>,
}

/// An article as it sits in the store
#[derive(Debug, Clone)]
pub struct StoredArticle {
    pub key: i64,
    pub record: ArticleRecord,
    pub harvested_at: String,
}

/// Result of handing a record to the storage writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Stored under a freshly assigned key
    Committed(i64),
    /// The identifier was stored before; no key was consumed
    AlreadyStored(i64),
}

impl CommitOutcome {
    pub fn key(&self) -> i64 {
        match self {
            Self::Committed(key) | Self::AlreadyStored(key) => *key,
        }
    }
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_commit_outcome_key() {
        assert_eq!(CommitOutcome::Committed(4).key(), 4);
        assert_eq!(CommitOutcome::AlreadyStored(2).key(), 2);
    }
}
