//! Bounded worker pool
//!
//! Runs extraction and commit for every identifier of a batch with at most
//! `concurrency` tasks in flight. A storage failure stops dispatching; tasks
//! already running are allowed to finish.

use crate::crawler::extractor::ArticleExtractor;
use crate::crawler::writer::ArticleWriter;
use crate::state::{ArticleState, Batch, BatchKind};
use crate::storage::CommitOutcome;
use crate::{ExtractionError, HarvestError};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Counts for one pool run
#[derive(Debug, Default)]
pub struct PoolReport {
    pub committed: usize,
    /// Found in the store, before dispatch or at commit time
    pub already_stored: usize,
    /// Given up for good
    pub skipped: usize,
    /// Left for a later run
    pub failed: usize,
    /// Never dispatched because the run was stopped
    pub not_dispatched: usize,
    /// The storage error that stopped the run
    pub fatal: Option<HarvestError>,
}

impl PoolReport {
    fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Committed => self.committed += 1,
            TaskOutcome::AlreadyStored => self.already_stored += 1,
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Failed => self.failed += 1,
            TaskOutcome::Fatal(e) => {
                self.failed += 1;
                // Keep the first error; later ones are usually consequences
                if self.fatal.is_none() {
                    self.fatal = Some(e);
                }
            }
        }
    }

    /// Merges the counts of another run into this one
    pub fn absorb(&mut self, other: PoolReport) {
        self.committed += other.committed;
        self.already_stored += other.already_stored;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.not_dispatched += other.not_dispatched;
        if self.fatal.is_none() {
            self.fatal = other.fatal;
        }
    }
}

#[derive(Debug)]
enum TaskOutcome {
    Committed,
    AlreadyStored,
    Skipped,
    Failed,
    Fatal(HarvestError),
}

/// Extraction and commit workers sharing one writer
pub struct WorkerPool {
    extractor: Arc<ArticleExtractor>,
    writer: ArticleWriter,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(extractor: Arc<ArticleExtractor>, writer: ArticleWriter, concurrency: usize) -> Self {
        Self {
            extractor,
            writer,
            concurrency: concurrency.max(1),
        }
    }

    pub fn writer(&self) -> &ArticleWriter {
        &self.writer
    }

    /// Processes every identifier of `batch`
    ///
    /// Returns once all dispatched tasks have finished. `cancel` stops
    /// dispatching new identifiers; so does the first storage error, which is
    /// handed back in [`PoolReport::fatal`].
    pub async fn run(&self, batch: Batch, cancel: &CancellationToken) -> PoolReport {
        let mut report = PoolReport::default();

        let writer = self.writer.clone();
        let begin = {
            let batch = batch.clone();
            tokio::task::spawn_blocking(move || writer.begin_batch(&batch)).await
        };
        match begin {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                report.fatal = Some(e.into());
                report.not_dispatched = batch.len();
                return report;
            }
            Err(e) => {
                report.fatal = Some(HarvestError::Task(e.to_string()));
                report.not_dispatched = batch.len();
                return report;
            }
        }

        let kind = batch.kind();
        tracing::info!(
            "Processing {} batch of {} identifiers with {} workers",
            match kind {
                BatchKind::CatchUp => "catch-up",
                BatchKind::Backlog => "backlog",
            },
            batch.len(),
            self.concurrency
        );

        // Child token: a fatal error stops this run without cancelling the caller
        let stop = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        let items = batch.items();
        for (slot, item) in items.iter().enumerate() {
            if item.already_stored {
                report.already_stored += 1;
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.not_dispatched = items[slot..]
                    .iter()
                    .filter(|item| !item.already_stored)
                    .count();
                tracing::info!(
                    "Dispatch stopped, {} identifiers left for a later run",
                    report.not_dispatched
                );
                break;
            };

            let extractor = Arc::clone(&self.extractor);
            let writer = self.writer.clone();
            let identifier = item.identifier.clone();
            let stop = stop.clone();

            tasks.spawn(async move {
                let outcome = process_one(slot, &identifier, &extractor, writer).await;
                if matches!(outcome, TaskOutcome::Fatal(_)) {
                    stop.cancel();
                }
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::error!("Worker task panicked: {}", e);
                    report.record(TaskOutcome::Fatal(HarvestError::Task(e.to_string())));
                }
            }
        }

        let writer = self.writer.clone();
        if let Ok(Err(e)) = tokio::task::spawn_blocking(move || writer.end_batch()).await {
            tracing::warn!("Failed to close batch: {}", e);
        }

        tracing::info!(
            "Batch done: {} committed, {} already stored, {} skipped, {} failed",
            report.committed,
            report.already_stored,
            report.skipped,
            report.failed
        );

        report
    }
}

/// Extracts and commits one identifier
async fn process_one(
    slot: usize,
    identifier: &str,
    extractor: &ArticleExtractor,
    writer: ArticleWriter,
) -> TaskOutcome {
    match try_process_one(slot, identifier, extractor, writer).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Fatal error while storing {}: {}", identifier, e);
            TaskOutcome::Fatal(e)
        }
    }
}

async fn try_process_one(
    slot: usize,
    identifier: &str,
    extractor: &ArticleExtractor,
    writer: ArticleWriter,
) -> Result<TaskOutcome, HarvestError> {
    let mut state = ArticleState::Pending.advance(ArticleState::Extracting)?;
    tracing::trace!("{} -> {}", identifier, state);

    match extractor.extract(identifier).await {
        Ok(record) => {
            state = state.advance(ArticleState::Extracted)?;
            state = state.advance(ArticleState::Committing)?;
            tracing::trace!("{} -> {}", identifier, state);

            let committed = tokio::task::spawn_blocking(move || writer.commit(slot, &record))
                .await
                .map_err(|e| HarvestError::Task(e.to_string()))?;

            match committed {
                Ok(CommitOutcome::Committed(key)) => {
                    state = state.advance(ArticleState::Committed)?;
                    tracing::info!("Stored {} as article {}", identifier, key);
                    tracing::trace!("{} -> {}", identifier, state);
                    Ok(TaskOutcome::Committed)
                }
                Ok(CommitOutcome::AlreadyStored(key)) => {
                    state = state.advance(ArticleState::Committed)?;
                    tracing::debug!("{} was already stored as article {}", identifier, key);
                    tracing::trace!("{} -> {}", identifier, state);
                    Ok(TaskOutcome::AlreadyStored)
                }
                Err(e) => {
                    state = state.advance(ArticleState::Failed)?;
                    tracing::trace!("{} -> {}", identifier, state);
                    Err(e.into())
                }
            }
        }

        Err(e) if e.is_retryable() => {
            state = state.advance(ArticleState::Failed)?;
            tracing::warn!("{} failed, will be offered again next run: {}", identifier, e);
            tracing::trace!("{} -> {}", identifier, state);
            Ok(TaskOutcome::Failed)
        }

        Err(e) => {
            state = state
                .advance(ArticleState::Failed)?
                .advance(ArticleState::Skipped)?;
            match &e {
                ExtractionError::MissingField { field, .. } => {
                    tracing::warn!("Skipping {}: missing {}", identifier, field)
                }
                ExtractionError::Fetch { source, .. } => {
                    tracing::warn!("Skipping {}: {}", identifier, source)
                }
            }
            tracing::trace!("{} -> {}", identifier, state);

            tokio::task::spawn_blocking(move || writer.finish(slot))
                .await
                .map_err(|e| HarvestError::Task(e.to_string()))??;
            Ok(TaskOutcome::Skipped)
        }
    }
}
