//! Harvest coordinator - one complete harvest run
//!
//! This module ties the components together:
//! - Loading the crawl state (database first, snapshot as fallback)
//! - Recording the run and recovering from an interrupted one
//! - Catch-up of new articles, then draining the backlog page by page
//! - Handing every batch to the worker pool and stopping on fatal errors

use crate::config::{load_proxy_list, Config};
use crate::crawler::attachments::{AttachmentFetcher, AttachmentStore};
use crate::crawler::extractor::ArticleExtractor;
use crate::crawler::frontier::{FrontierReconciler, Reconciliation, ReconciliationAnomaly};
use crate::crawler::http::HttpSource;
use crate::crawler::pool::{PoolReport, WorkerPool};
use crate::crawler::proxy::ProxyPool;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::source::{AttachmentSink, DetailSource, ListingSource};
use crate::crawler::writer::ArticleWriter;
use crate::state::{Batch, CrawlState, ProgressFile, SequenceCounter};
use crate::storage::{open_storage, RunStatus, Storage, StorageResult};
use crate::HarvestError;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Where listings, detail pages and attachments come from
pub struct Sources {
    pub listing: Arc<dyn ListingSource>,
    pub details: Arc<dyn DetailSource>,
    pub attachments: Arc<dyn AttachmentSink>,
    /// Counter the attachment sink allocates file numbers from
    pub counter: Arc<SequenceCounter>,
}

/// Summary of one harvest run
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub run_id: i64,
    /// Identifiers found by the catch-up walk
    pub new_identifiers: usize,
    /// Backlog pages handed to the pool
    pub backlog_pages: usize,
    pub pool: PoolReport,
    pub anomalies: Vec<ReconciliationAnomaly>,
    pub cancelled: bool,
    /// Crawl state after the run
    pub state: CrawlState,
    pub elapsed: Duration,
}

/// Reads the crawl state to resume from
///
/// The database is authoritative. The snapshot file is only consulted when
/// the database holds no state, e.g. after the database was recreated.
pub fn load_state(
    storage: &dyn Storage,
    snapshot: Option<&ProgressFile>,
) -> Result<CrawlState, HarvestError> {
    if let Some(state) = storage.load_crawl_state()? {
        tracing::info!(
            "Resuming: next key {}, backlog at page {}, most recent {}",
            state.next_key,
            state.last_page,
            state.most_recent.as_deref().unwrap_or("-")
        );
        return Ok(state);
    }

    let Some(snapshot) = snapshot else {
        tracing::info!("First run, starting from an empty crawl state");
        return Ok(CrawlState::default());
    };

    match snapshot.load() {
        Ok(Some(state)) => {
            tracing::warn!(
                "No crawl state in the database, resuming from snapshot {}",
                snapshot.path().display()
            );
            Ok(state)
        }
        Ok(None) => {
            tracing::info!("First run, starting from an empty crawl state");
            Ok(CrawlState::default())
        }
        Err(e) => {
            tracing::warn!("Ignoring unreadable snapshot: {}; starting from defaults", e);
            Ok(CrawlState::default())
        }
    }
}

/// Builds the HTTP-backed sources described by `config`
fn http_sources(config: &Config, state: &CrawlState) -> Result<Sources, HarvestError> {
    let proxies = load_proxy_list(config.output.proxy_file.as_deref().map(Path::new))?;
    if !proxies.is_empty() {
        tracing::info!("Loaded {} proxies", proxies.len());
    }
    let pool = Arc::new(ProxyPool::new(&proxies, &config.user_agent, &config.crawler)?);

    let http = Arc::new(HttpSource::new(
        Arc::clone(&pool),
        config.listing.clone(),
        &config.selectors,
    )?);

    let counter = Arc::new(SequenceCounter::new(state.next_attachment));
    let store = AttachmentStore::open(
        &config.output.attachments_dir,
        config.output.attachment_format,
        Arc::clone(&counter),
    )?;
    let fetcher = AttachmentFetcher::new(pool, RetryPolicy::from_config(&config.crawler), store);

    Ok(Sources {
        listing: http.clone(),
        details: http,
        attachments: Arc::new(fetcher),
        counter,
    })
}

/// Runs one harvest
pub struct Coordinator {
    writer: ArticleWriter,
    reconciler: FrontierReconciler,
    pool: WorkerPool,
    run_id: i64,
}

impl Coordinator {
    /// Creates a coordinator harvesting over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `config_hash` - Hash of the configuration file, stored with the run
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Storage opened and the run recorded
    /// * `Err(HarvestError)` - Failed to initialize
    pub fn new(config: &Config, config_hash: &str) -> Result<Self, HarvestError> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let snapshot = ProgressFile::new(&config.output.progress_path);

        let state = load_state(&storage, Some(&snapshot))?;
        let sources = http_sources(config, &state)?;

        Self::with_sources(
            config,
            config_hash,
            Box::new(storage),
            Some(snapshot),
            state,
            sources,
        )
    }

    /// Creates a coordinator over explicit sources and storage
    pub fn with_sources(
        config: &Config,
        config_hash: &str,
        mut storage: Box<dyn Storage + Send>,
        snapshot: Option<ProgressFile>,
        state: CrawlState,
        sources: Sources,
    ) -> Result<Self, HarvestError> {
        if let Some(latest) = storage.get_latest_run()? {
            if latest.status == RunStatus::Running {
                tracing::warn!(
                    "Run {} did not finish, marking it interrupted",
                    latest.id
                );
                storage.finish_run(latest.id, RunStatus::Interrupted)?;
            }
        }
        let run_id = storage.create_run(config_hash)?;

        // Any file numbers already handed out are never reused
        sources.counter.raise_to(state.next_attachment);

        let writer = ArticleWriter::new(storage, state, snapshot, sources.counter)?;
        let extractor = Arc::new(ArticleExtractor::new(
            sources.details,
            sources.attachments,
            config.crawler.boilerplate_marker.clone(),
        ));
        let pool = WorkerPool::new(
            extractor,
            writer.clone(),
            config.crawler.concurrency as usize,
        );
        let reconciler = FrontierReconciler::new(sources.listing, config.listing.clone());

        Ok(Self {
            writer,
            reconciler,
            pool,
            run_id,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Runs catch-up and backlog until both are drained, `cancel` fires or a
    /// fatal error occurs
    ///
    /// The run record is closed in every case. A fatal error is returned
    /// after in-flight articles were committed.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<HarvestReport, HarvestError> {
        tracing::info!("Starting harvest run {}", self.run_id);
        let started = Instant::now();

        let mut report = HarvestReport {
            run_id: self.run_id,
            ..HarvestReport::default()
        };
        let result = self.drive(cancel, &mut report).await;

        report.cancelled = cancel.is_cancelled();
        let status = match &result {
            Err(_) => RunStatus::Failed,
            Ok(()) if report.cancelled => RunStatus::Interrupted,
            Ok(()) => RunStatus::Completed,
        };

        let run_id = self.run_id;
        self.writer
            .with_storage(|storage| storage.finish_run(run_id, status))?;

        report.state = self.writer.state()?;
        report.elapsed = started.elapsed();

        match result {
            Ok(()) => {
                tracing::info!(
                    "Harvest run {} {}: {} committed, {} already stored, {} skipped, {} failed in {:?}",
                    self.run_id,
                    status.to_db_string(),
                    report.pool.committed,
                    report.pool.already_stored,
                    report.pool.skipped,
                    report.pool.failed,
                    report.elapsed
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Harvest run {} failed: {}", self.run_id, e);
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        cancel: &CancellationToken,
        report: &mut HarvestReport,
    ) -> Result<(), HarvestError> {
        let state = self.writer.state()?;

        let caught_up = self
            .reconciler
            .catch_up(state.most_recent.as_deref())
            .await?;
        report.new_identifiers = caught_up.new_identifiers.len();
        report.anomalies.extend(caught_up.anomaly.clone());
        tracing::info!("Catch-up found {} new articles", caught_up.new_identifiers.len());

        let exclude: HashSet<String> = caught_up.new_identifiers.iter().cloned().collect();
        if !caught_up.new_identifiers.is_empty() {
            let batch = self.mark_stored(Batch::catch_up(caught_up.new_identifiers)).await?;
            self.run_batch(batch, cancel, report).await?;
        }

        let mut walk = self
            .reconciler
            .backlog(state.last_page, state.last_article.clone(), exclude);
        let mut markers_held = false;

        while !cancel.is_cancelled() {
            let Some(page) = self.reconciler.next_backlog_page(&mut walk).await? else {
                break;
            };
            report.backlog_pages += 1;
            tracing::info!(
                "Backlog page {}: {} articles",
                page.page,
                page.identifiers.len()
            );

            let mut batch = Batch::backlog(page.identifiers.into_iter().map(|id| (page.page, id)));
            if markers_held {
                batch = batch.holding_markers();
            }
            let batch = self.mark_stored(batch).await?;

            let failed = self.run_batch(batch, cancel, report).await?;
            if failed > 0 && !markers_held {
                tracing::warn!(
                    "{} articles on page {} failed; backlog markers stay behind them until a later run",
                    failed,
                    page.page
                );
                markers_held = true;
            }
        }

        report.anomalies.extend(walk.anomalies().iter().cloned());
        Ok(())
    }

    /// Flags the batch items the store already holds
    async fn mark_stored(&self, mut batch: Batch) -> Result<Batch, HarvestError> {
        let writer = self.writer.clone();
        let ids: Vec<String> = batch
            .items()
            .iter()
            .map(|item| item.identifier.clone())
            .collect();

        let stored = tokio::task::spawn_blocking(move || -> StorageResult<HashSet<String>> {
            let mut stored = HashSet::new();
            for id in ids {
                if writer.stored_key(&id)?.is_some() {
                    stored.insert(id);
                }
            }
            Ok(stored)
        })
        .await
        .map_err(|e| HarvestError::Task(e.to_string()))??;

        let count = batch.mark_stored(|id| stored.contains(id));
        if count > 0 {
            tracing::debug!("{} of {} articles already stored", count, batch.len());
        }
        Ok(batch)
    }

    /// Runs one batch, returning how many identifiers were left for a later run
    async fn run_batch(
        &self,
        batch: Batch,
        cancel: &CancellationToken,
        report: &mut HarvestReport,
    ) -> Result<usize, HarvestError> {
        let mut outcome = self.pool.run(batch, cancel).await;
        let failed = outcome.failed;
        let fatal = outcome.fatal.take();
        report.pool.absorb(outcome);

        match fatal {
            Some(e) => Err(e),
            None => Ok(failed),
        }
    }
}

/// What a harvest would do right now
#[derive(Debug)]
pub struct DryRunReport {
    pub state: CrawlState,
    pub reconciliation: Reconciliation,
    /// Offered identifiers the store already holds
    pub already_stored: usize,
    pub pages_fetched: u32,
}

/// Reconciles the frontier without extracting or storing anything
pub async fn dry_run(config: &Config) -> Result<DryRunReport, HarvestError> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let snapshot = ProgressFile::new(&config.output.progress_path);
    let state = load_state(&storage, Some(&snapshot))?;

    let proxies = load_proxy_list(config.output.proxy_file.as_deref().map(Path::new))?;
    let pool = Arc::new(ProxyPool::new(&proxies, &config.user_agent, &config.crawler)?);
    let listing = Arc::new(HttpSource::new(pool, config.listing.clone(), &config.selectors)?);

    let mut reconciler = FrontierReconciler::new(listing, config.listing.clone());
    let reconciliation = reconciler.reconcile(&state).await?;

    let mut already_stored = 0;
    let offered = reconciliation
        .new_identifiers
        .iter()
        .chain(reconciliation.backlog.iter().map(|(_, id)| id));
    for id in offered {
        if storage.find_article_key(id)?.is_some() {
            already_stored += 1;
        }
    }

    Ok(DryRunReport {
        state,
        reconciliation,
        already_stored,
        pages_fetched: reconciler.pages_fetched(),
    })
}

/// Runs a complete harvest over HTTP
pub async fn run_harvest(
    config: &Config,
    config_hash: &str,
    cancel: &CancellationToken,
) -> Result<HarvestReport, HarvestError> {
    let mut coordinator = Coordinator::new(config, config_hash)?;
    coordinator.run(cancel).await
}
