//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::CrawlState;
use crate::storage::{ArticleRecord, RunRecord, RunStatus, StoredArticle};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Article not found: {0}")]
    ArticleNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage lock poisoned by a panicked writer")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The store is append-only for articles. Crawl state lives next to the
/// articles so both can change in one transaction.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new harvest run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with the given status and a finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Crawl State =====

    /// Loads the crawl state, `None` before the first commit
    fn load_crawl_state(&self) -> StorageResult<Option<CrawlState>>;

    /// Replaces the crawl state without touching articles
    fn save_crawl_state(&mut self, state: &CrawlState) -> StorageResult<()>;

    // ===== Articles =====

    /// Inserts `record` under `key` and replaces the crawl state with
    /// `state_after`, both in one transaction
    ///
    /// Either the row and the new state are both durable, or neither is.
    fn commit_article(
        &mut self,
        key: i64,
        record: &ArticleRecord,
        state_after: &CrawlState,
    ) -> StorageResult<()>;

    /// Looks up the key of an already stored identifier
    fn find_article_key(&self, source_url: &str) -> StorageResult<Option<i64>>;

    /// Gets an article by key
    fn get_article(&self, key: i64) -> StorageResult<StoredArticle>;

    /// All article keys in ascending order
    fn article_keys(&self) -> StorageResult<Vec<i64>>;

    /// Highest key in use
    fn max_article_key(&self) -> StorageResult<Option<i64>>;

    // ===== Statistics =====

    /// Total number of stored articles
    fn count_articles(&self) -> StorageResult<u64>;

    /// Number of articles with a resolved country code
    fn count_articles_with_country(&self) -> StorageResult<u64>;

    /// Attachment slots across all articles as (stored, missing)
    fn count_attachment_slots(&self) -> StorageResult<(u64, u64)>;
}
