//! Storage wrapper that fails on demand

use super::{ArticleRecord, RunRecord, RunStatus, SqliteStorage, StoredArticle};
use super::{Storage, StorageError, StorageResult};
use crate::state::CrawlState;

/// SQLite storage whose `fail_at`-th article commit fails
pub struct FailingStorage {
    inner: SqliteStorage,
    commits: usize,
    fail_at: usize,
}

impl FailingStorage {
    pub fn new(inner: SqliteStorage, fail_at: usize) -> Self {
        Self {
            inner,
            commits: 0,
            fail_at,
        }
    }
}

impl Storage for FailingStorage {
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        self.inner.create_run(config_hash)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.inner.get_run(run_id)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.inner.get_latest_run()
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.inner.finish_run(run_id, status)
    }

    fn load_crawl_state(&self) -> StorageResult<Option<CrawlState>> {
        self.inner.load_crawl_state()
    }

    fn save_crawl_state(&mut self, state: &CrawlState) -> StorageResult<()> {
        self.inner.save_crawl_state(state)
    }

    fn commit_article(
        &mut self,
        key: i64,
        record: &ArticleRecord,
        state_after: &CrawlState,
    ) -> StorageResult<()> {
        self.commits += 1;
        if self.commits == self.fail_at {
            return Err(StorageError::Database("disk I/O error".to_string()));
        }
        self.inner.commit_article(key, record, state_after)
    }

    fn find_article_key(&self, source_url: &str) -> StorageResult<Option<i64>> {
        self.inner.find_article_key(source_url)
    }

    fn get_article(&self, key: i64) -> StorageResult<StoredArticle> {
        self.inner.get_article(key)
    }

    fn article_keys(&self) -> StorageResult<Vec<i64>> {
        self.inner.article_keys()
    }

    fn max_article_key(&self) -> StorageResult<Option<i64>> {
        self.inner.max_article_key()
    }

    fn count_articles(&self) -> StorageResult<u64> {
        self.inner.count_articles()
    }

    fn count_articles_with_country(&self) -> StorageResult<u64> {
        self.inner.count_articles_with_country()
    }

    fn count_attachment_slots(&self) -> StorageResult<(u64, u64)> {
        self.inner.count_attachment_slots()
    }
}
