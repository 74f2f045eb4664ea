//! Storage writer
//!
//! The single, serialized path into the store. One mutex covers reading the
//! next key, inserting the row, advancing the crawl state and rewriting the
//! progress snapshot. The methods are synchronous; async callers go through
//! `spawn_blocking`.

use crate::state::{Batch, CrawlState, ProgressCursor, ProgressFile, SequenceCounter, Watermark};
use crate::storage::{ArticleRecord, CommitOutcome, Storage, StorageError, StorageResult};
use std::sync::{Arc, Mutex, MutexGuard};

struct WriterInner {
    storage: Box<dyn Storage + Send>,
    state: CrawlState,
    watermark: Option<Watermark>,
    snapshot: Option<ProgressFile>,
    attachments: Arc<SequenceCounter>,
}

impl WriterInner {
    /// State with the attachment counter folded in
    fn next_state(&self, cursor: Option<&ProgressCursor>) -> CrawlState {
        let mut next = self.state.clone();
        if let Some(cursor) = cursor {
            next.apply(cursor);
        }
        next.next_attachment = next.next_attachment.max(self.attachments.peek());
        next
    }

    /// Mirrors the committed state into the snapshot file
    ///
    /// The database stays authoritative, so a failed snapshot is only logged.
    fn write_snapshot(&self) {
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.store(&self.state) {
                tracing::warn!(
                    "Failed to write progress snapshot {}: {}",
                    snapshot.path().display(),
                    e
                );
            }
        }
    }

    /// Marks `slot` finished, persisting the markers if the prefix grew
    fn finish(&mut self, slot: usize) -> StorageResult<()> {
        let cursor = self
            .watermark
            .as_mut()
            .and_then(|watermark| watermark.complete(slot));

        match cursor {
            Some(cursor) => self.persist_cursor(cursor),
            None => Ok(()),
        }
    }

    /// Persists a watermark move that carries no article
    fn persist_cursor(&mut self, cursor: ProgressCursor) -> StorageResult<()> {
        let next = self.next_state(Some(&cursor));
        self.storage.save_crawl_state(&next)?;
        self.state = next;
        self.write_snapshot();
        Ok(())
    }
}

/// Cloneable handle to the serialized storage writer
#[derive(Clone)]
pub struct ArticleWriter {
    inner: Arc<Mutex<WriterInner>>,
}

impl ArticleWriter {
    /// Wraps `storage`, starting from `state`
    ///
    /// `next_key` is raised past the highest stored key so a stale state can
    /// never hand out a key twice.
    pub fn new(
        storage: Box<dyn Storage + Send>,
        mut state: CrawlState,
        snapshot: Option<ProgressFile>,
        attachments: Arc<SequenceCounter>,
    ) -> StorageResult<Self> {
        if let Some(max_key) = storage.max_article_key()? {
            if state.next_key <= max_key {
                tracing::warn!(
                    "Crawl state next key {} is behind stored key {}, raising it",
                    state.next_key,
                    max_key
                );
                state.next_key = max_key + 1;
            }
        }

        let inner = WriterInner {
            storage,
            state,
            watermark: None,
            snapshot,
            attachments,
        };
        inner.write_snapshot();

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, WriterInner>> {
        self.inner.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Current crawl state
    pub fn state(&self) -> StorageResult<CrawlState> {
        Ok(self.lock()?.state.clone())
    }

    /// Key of `identifier` if it is already stored
    pub fn stored_key(&self, identifier: &str) -> StorageResult<Option<i64>> {
        self.lock()?.storage.find_article_key(identifier)
    }

    /// Runs a read-only query against the underlying store
    pub fn with_storage<R>(
        &self,
        f: impl FnOnce(&mut dyn Storage) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut inner = self.lock()?;
        f(inner.storage.as_mut())
    }

    /// Starts tracking `batch`
    ///
    /// Already stored items at the front of the batch move the progress
    /// markers straight away. A batch holding its markers is not tracked at
    /// all; its commits only advance the key.
    pub fn begin_batch(&self, batch: &Batch) -> StorageResult<()> {
        let mut inner = self.lock()?;
        if !batch.moves_markers() {
            inner.watermark = None;
            return Ok(());
        }

        let mut watermark = Watermark::new(batch);
        let cursor = watermark.advance();
        inner.watermark = Some(watermark);

        if let Some(cursor) = cursor {
            inner.persist_cursor(cursor)?;
        }
        Ok(())
    }

    /// Stops tracking the current batch
    pub fn end_batch(&self) -> StorageResult<()> {
        self.lock()?.watermark = None;
        Ok(())
    }

    /// Commits the record produced for batch slot `slot`
    ///
    /// The row and the advanced crawl state are written in one transaction.
    /// An identifier stored before yields `AlreadyStored` and consumes no key.
    pub fn commit(&self, slot: usize, record: &ArticleRecord) -> StorageResult<CommitOutcome> {
        let mut inner = self.lock()?;

        if let Some(key) = inner.storage.find_article_key(&record.source_url)? {
            tracing::debug!("{} already stored under key {}", record.source_url, key);
            inner.finish(slot)?;
            return Ok(CommitOutcome::AlreadyStored(key));
        }

        let cursor = inner
            .watermark
            .as_ref()
            .and_then(|watermark| watermark.peek_complete(slot));

        let key = inner.state.next_key;
        let mut next = inner.next_state(cursor.as_ref());
        next.next_key = key + 1;

        inner.storage.commit_article(key, record, &next)?;

        // Only now is the slot allowed to count as finished
        inner.state = next;
        if let Some(watermark) = inner.watermark.as_mut() {
            watermark.complete(slot);
        }
        inner.write_snapshot();

        tracing::debug!("Committed {} as key {}", record.source_url, key);
        Ok(CommitOutcome::Committed(key))
    }

    /// Marks slot `slot` finished without storing anything
    ///
    /// Used for identifiers that were given up for good.
    pub fn finish(&self, slot: usize) -> StorageResult<()> {
        self.lock()?.finish(slot)
    }
}
