//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the News Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Harvested articles; keys are assigned by the storage writer
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY,
    source_url TEXT NOT NULL UNIQUE,
    headline TEXT NOT NULL,
    author TEXT NOT NULL DEFAULT '',
    published_at TEXT,
    body TEXT NOT NULL,
    links TEXT NOT NULL DEFAULT '[]',
    attachments TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    country_code TEXT,
    harvested_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_country ON articles(country_code);

-- Crawl progress, one row per field
CREATE TABLE IF NOT EXISTS crawl_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
