//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::CrawlState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{ArticleRecord, RunRecord, RunStatus, StoredArticle};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

const SELECT_RUN: &str = "SELECT id, started_at, finished_at, config_hash, status FROM runs";

const SELECT_ARTICLE: &str = "SELECT id, source_url, headline, author, published_at, body,
     links, attachments, tags, country_code, harvested_at FROM articles";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Interrupted),
    })
}

/// Raw article columns; JSON lists are decoded outside the row closure
struct ArticleRow {
    key: i64,
    source_url: String,
    headline: String,
    author: String,
    published_at: Option<String>,
    body: String,
    links: String,
    attachments: String,
    tags: String,
    country_code: Option<String>,
    harvested_at: String,
}

impl ArticleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            source_url: row.get(1)?,
            headline: row.get(2)?,
            author: row.get(3)?,
            published_at: row.get(4)?,
            body: row.get(5)?,
            links: row.get(6)?,
            attachments: row.get(7)?,
            tags: row.get(8)?,
            country_code: row.get(9)?,
            harvested_at: row.get(10)?,
        })
    }

    fn into_stored(self) -> StorageResult<StoredArticle> {
        let published_at = match self.published_at {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(StoredArticle {
            key: self.key,
            record: ArticleRecord {
                source_url: self.source_url,
                headline: self.headline,
                author: self.author,
                published_at,
                body: self.body,
                links: from_json(&self.links)?,
                attachments: from_json(&self.attachments)?,
                tags: from_json(&self.tags)?,
                country_code: self.country_code,
            },
            harvested_at: self.harvested_at,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> StorageResult<T> {
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Writes every crawl state field inside an open transaction
fn write_crawl_state(tx: &Transaction<'_>, state: &CrawlState) -> StorageResult<()> {
    for (key, value) in state.to_pairs() {
        match value {
            Some(value) => {
                tx.execute(
                    "INSERT OR REPLACE INTO crawl_state (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            None => {
                tx.execute("DELETE FROM crawl_state WHERE key = ?1", params![key])?;
            }
        }
    }
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_RUN),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("{} ORDER BY id DESC LIMIT 1", SELECT_RUN),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Crawl State =====

    fn load_crawl_state(&self) -> StorageResult<Option<CrawlState>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM crawl_state")?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;

        CrawlState::from_pairs(&pairs).map_err(StorageError::Serialization)
    }

    fn save_crawl_state(&mut self, state: &CrawlState) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        write_crawl_state(&tx, state)?;
        tx.commit()?;
        Ok(())
    }

    // ===== Articles =====

    fn commit_article(
        &mut self,
        key: i64,
        record: &ArticleRecord,
        state_after: &CrawlState,
    ) -> StorageResult<()> {
        let links = to_json(&record.links)?;
        let attachments = to_json(&record.attachments)?;
        let tags = to_json(&record.tags)?;
        let published_at = record.published_at.map(|at| at.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO articles (id, source_url, headline, author, published_at, body,
             links, attachments, tags, country_code, harvested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                key,
                record.source_url,
                record.headline,
                record.author,
                published_at,
                record.body,
                links,
                attachments,
                tags,
                record.country_code,
                now,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::ConstraintViolation(format!(
                    "article key {} or source {} already stored",
                    key, record.source_url
                ))
            } else {
                StorageError::Sqlite(e)
            }
        })?;

        write_crawl_state(&tx, state_after)?;

        // Dropping an uncommitted transaction rolls both writes back
        tx.commit()?;
        Ok(())
    }

    fn find_article_key(&self, source_url: &str) -> StorageResult<Option<i64>> {
        let key = self
            .conn
            .query_row(
                "SELECT id FROM articles WHERE source_url = ?1",
                params![source_url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key)
    }

    fn get_article(&self, key: i64) -> StorageResult<StoredArticle> {
        self.conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_ARTICLE),
                params![key],
                ArticleRow::from_row,
            )
            .optional()?
            .ok_or(StorageError::ArticleNotFound(key))?
            .into_stored()
    }

    fn article_keys(&self) -> StorageResult<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM articles ORDER BY id")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(keys)
    }

    fn max_article_key(&self) -> StorageResult<Option<i64>> {
        let key = self
            .conn
            .query_row("SELECT MAX(id) FROM articles", [], |row| row.get(0))?;
        Ok(key)
    }

    // ===== Statistics =====

    fn count_articles(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_articles_with_country(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE country_code IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_attachment_slots(&self) -> StorageResult<(u64, u64)> {
        let mut stmt = self.conn.prepare("SELECT attachments FROM articles")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut stored = 0;
        let mut missing = 0;
        for row in rows {
            let slots: Vec<Option<String>> = from_json(&row?)?;
            for slot in slots {
                match slot {
                    Some(_) => stored += 1,
                    None => missing += 1,
                }
            }
        }

        Ok((stored, missing))
    }
}

/// Initializes or opens a database at the given path
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Successfully opened/created database
/// * `Err(rusqlite::Error)` - Failed to open database
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    // FULL sync: a committed article and its crawl state survive power loss
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = FULL;
        PRAGMA temp_store = MEMORY;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: &str) -> ArticleRecord {
        ArticleRecord {
            source_url: source.to_string(),
            headline: "Headline".to_string(),
            author: "A. Writer".to_string(),
            published_at: Some(
                DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            body: "First.\n\nSecond.".to_string(),
            links: vec!["https://example.com/other".to_string()],
            attachments: vec![Some("00000001.jpg".to_string()), None],
            tags: vec!["politics".to_string()],
            country_code: Some("FR".to_string()),
        }
    }

    fn state_after(next_key: i64) -> CrawlState {
        CrawlState {
            next_key,
            most_recent: Some("https://example.com/a".to_string()),
            ..CrawlState::default()
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_create_and_finish_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        let latest = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Running);
        assert!(latest.finished_at.is_none());

        storage.finish_run(run_id, RunStatus::Completed).unwrap();
        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_unknown_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(99),
            Err(StorageError::RunNotFound(99))
        ));
        assert!(storage.finish_run(99, RunStatus::Interrupted).is_err());
    }

    #[test]
    fn test_commit_article_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let original = record("https://example.com/a");

        storage.commit_article(1, &original, &state_after(2)).unwrap();

        let stored = storage.get_article(1).unwrap();
        assert_eq!(stored.key, 1);
        assert_eq!(stored.record, original);
        assert_eq!(
            storage.find_article_key("https://example.com/a").unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_commit_article_writes_state_in_same_transaction() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.load_crawl_state().unwrap().is_none());

        storage
            .commit_article(1, &record("https://example.com/a"), &state_after(2))
            .unwrap();

        let state = storage.load_crawl_state().unwrap().unwrap();
        assert_eq!(state.next_key, 2);
        assert_eq!(state.most_recent.as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn test_duplicate_source_rolls_back_state() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .commit_article(1, &record("https://example.com/a"), &state_after(2))
            .unwrap();

        let result = storage.commit_article(2, &record("https://example.com/a"), &state_after(3));
        assert!(matches!(result, Err(StorageError::ConstraintViolation(_))));

        // Neither the row nor the state change survived
        assert_eq!(storage.count_articles().unwrap(), 1);
        assert_eq!(storage.load_crawl_state().unwrap().unwrap().next_key, 2);
    }

    #[test]
    fn test_optional_state_fields_are_cleared() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut state = state_after(5);
        state.last_article = Some("https://example.com/x".to_string());
        storage.save_crawl_state(&state).unwrap();

        state.last_article = None;
        storage.save_crawl_state(&state).unwrap();

        let loaded = storage.load_crawl_state().unwrap().unwrap();
        assert_eq!(loaded.last_article, None);
        assert_eq!(loaded.next_key, 5);
    }

    #[test]
    fn test_missing_article() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_article(7),
            Err(StorageError::ArticleNotFound(7))
        ));
        assert_eq!(storage.max_article_key().unwrap(), None);
    }

    #[test]
    fn test_statistics_queries() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .commit_article(1, &record("https://example.com/a"), &state_after(2))
            .unwrap();

        let mut no_country = record("https://example.com/b");
        no_country.country_code = None;
        no_country.attachments = vec![Some("00000002.jpg".to_string())];
        storage.commit_article(2, &no_country, &state_after(3)).unwrap();

        assert_eq!(storage.count_articles().unwrap(), 2);
        assert_eq!(storage.count_articles_with_country().unwrap(), 1);
        assert_eq!(storage.count_attachment_slots().unwrap(), (2, 1));
        assert_eq!(storage.article_keys().unwrap(), vec![1, 2]);
        assert_eq!(storage.max_article_key().unwrap(), Some(2));
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage
                .commit_article(1, &record("https://example.com/a"), &state_after(2))
                .unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.count_articles().unwrap(), 1);
        assert_eq!(storage.load_crawl_state().unwrap().unwrap().next_key, 2);
    }
}
