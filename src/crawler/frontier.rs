//! Frontier reconciliation
//!
//! Compares the live listing against recorded progress. Two walks exist:
//!
//! - **Catch-up**: pages 1, 2, ... until the most recently seen article
//!   shows up. Everything before it is new.
//! - **Backlog**: from the last fully processed page, find the last
//!   processed article, then everything after it (and every later page) is
//!   backlog.
//!
//! Both walks are bounded. When the marker they look for has vanished from
//! the listing a `ReconciliationAnomaly` is recorded and the walk falls back
//! to a best-effort answer instead of paginating forever.

use crate::config::ListingConfig;
use crate::crawler::source::ListingSource;
use crate::state::CrawlState;
use crate::FetchError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Which marker went missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    /// The most recent known article was not found during catch-up
    MostRecentNotFound,
    /// The last processed backlog article was not found near its page
    LastArticleNotFound,
    /// Consecutive backlog pages repeated identifiers already offered
    ListingStalled,
}

/// An expected marker identifier never appeared while paginating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationAnomaly {
    pub kind: AnomalyKind,
    pub marker: String,
    /// Pages scanned before giving up
    pub pages_scanned: u32,
    /// True if the listing ended before the search bound
    pub listing_ended: bool,
}

impl fmt::Display for ReconciliationAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            AnomalyKind::MostRecentNotFound => "most recent article",
            AnomalyKind::LastArticleNotFound => "last backlog article",
            AnomalyKind::ListingStalled => {
                return write!(
                    f,
                    "listing stopped offering new identifiers after page {} ({} repeated pages)",
                    self.marker, self.pages_scanned
                );
            }
        };
        let why = if self.listing_ended {
            "before the listing ended"
        } else {
            "within the search bound"
        };
        write!(
            f,
            "{} {} not found {} ({} pages scanned)",
            what, self.marker, why, self.pages_scanned
        )
    }
}

/// Listing pages fetched during one reconciliation
pub struct ListingCache {
    source: Arc<dyn ListingSource>,
    pages: HashMap<u32, Vec<String>>,
    fetches: u32,
}

impl ListingCache {
    pub fn new(source: Arc<dyn ListingSource>) -> Self {
        Self {
            source,
            pages: HashMap::new(),
            fetches: 0,
        }
    }

    /// Identifiers on `page`, fetched at most once
    pub async fn page(&mut self, page: u32) -> Result<Vec<String>, FetchError> {
        if let Some(ids) = self.pages.get(&page) {
            return Ok(ids.clone());
        }

        let ids = self.source.fetch_listing(page).await?;
        self.fetches += 1;
        tracing::debug!("Listing page {} has {} identifiers", page, ids.len());
        self.pages.insert(page, ids.clone());
        Ok(ids)
    }

    /// Drops cached pages that can no longer be revisited
    pub fn evict_below(&mut self, page: u32) {
        self.pages.retain(|&p, _| p >= page);
    }

    /// Number of network fetches so far
    pub fn fetches(&self) -> u32 {
        self.fetches
    }
}

/// Result of the catch-up walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUp {
    /// New identifiers, newest first, without repeats
    pub new_identifiers: Vec<String>,
    /// Newest identifier on page 1, or the previous marker if page 1 is empty
    pub most_recent: Option<String>,
    pub anomaly: Option<ReconciliationAnomaly>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatchUpState {
    CatchingUp { page: u32 },
    Done,
}

/// Walks the listing from page 1 collecting articles newer than
/// `most_recent`
///
/// With no marker (first run) the walk takes `first_run_pages` pages. With a
/// marker it stops on the page holding it and never fetches past that page.
/// If the marker is not found within `max_catch_up_pages` pages, or before
/// the listing ends, everything collected so far counts as new and an
/// anomaly is reported.
pub async fn catch_up(
    listing: &mut ListingCache,
    most_recent: Option<&str>,
    config: &ListingConfig,
) -> Result<CatchUp, FetchError> {
    let limit = match most_recent {
        Some(_) => config.max_catch_up_pages,
        None => config.first_run_pages,
    };

    let mut result = CatchUp {
        most_recent: most_recent.map(str::to_string),
        ..CatchUp::default()
    };
    let mut seen = HashSet::new();
    let mut state = CatchUpState::CatchingUp { page: 1 };

    while let CatchUpState::CatchingUp { page } = state {
        if page > limit {
            if let Some(marker) = most_recent {
                result.anomaly = Some(ReconciliationAnomaly {
                    kind: AnomalyKind::MostRecentNotFound,
                    marker: marker.to_string(),
                    pages_scanned: page - 1,
                    listing_ended: false,
                });
            }
            state = CatchUpState::Done;
            continue;
        }

        let ids = listing.page(page).await?;

        if ids.is_empty() {
            if let Some(marker) = most_recent {
                result.anomaly = Some(ReconciliationAnomaly {
                    kind: AnomalyKind::MostRecentNotFound,
                    marker: marker.to_string(),
                    pages_scanned: page - 1,
                    listing_ended: true,
                });
            }
            state = CatchUpState::Done;
            continue;
        }

        if page == 1 {
            result.most_recent = ids.first().cloned();
        }

        let marker_at = most_recent.and_then(|marker| ids.iter().position(|id| id == marker));
        let take = marker_at.unwrap_or(ids.len());

        for id in &ids[..take] {
            if seen.insert(id.clone()) {
                result.new_identifiers.push(id.clone());
            }
        }

        state = match marker_at {
            Some(_) => CatchUpState::Done,
            None => CatchUpState::CatchingUp { page: page + 1 },
        };
    }

    Ok(result)
}

/// One page worth of backlog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogPage {
    pub page: u32,
    /// Identifiers in listing order
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BacklogState {
    /// Looking for the last processed article
    Seeking { page: u32, scanned: u32 },
    /// Every identifier from here on is backlog
    Backlog { page: u32 },
    Done,
}

/// Page-by-page backlog walk
///
/// Created by [`BacklogWalk::new`] and driven with [`BacklogWalk::next_page`].
#[derive(Debug)]
pub struct BacklogWalk {
    state: BacklogState,
    start_page: u32,
    last_article: Option<String>,
    marker_search_pages: u32,
    max_pages: u32,
    emitted_pages: u32,
    /// Backlog pages in a row made only of identifiers this walk already read
    stale_pages: u32,
    /// Identifiers read from the listing by this walk
    walked: HashSet<String>,
    seen: HashSet<String>,
    anomalies: Vec<ReconciliationAnomaly>,
}

impl BacklogWalk {
    /// Starts a walk at `last_page`
    ///
    /// `exclude` holds identifiers already offered in this run; they are
    /// never offered again.
    pub fn new(
        last_page: u32,
        last_article: Option<String>,
        exclude: HashSet<String>,
        config: &ListingConfig,
    ) -> Self {
        let start_page = last_page.max(1);
        let state = match last_article {
            Some(_) => BacklogState::Seeking {
                page: start_page,
                scanned: 0,
            },
            None => BacklogState::Backlog { page: start_page },
        };

        Self {
            state,
            start_page,
            last_article,
            marker_search_pages: config.marker_search_pages,
            max_pages: config.max_backlog_pages,
            emitted_pages: 0,
            stale_pages: 0,
            walked: HashSet::new(),
            seen: exclude,
            anomalies: Vec::new(),
        }
    }

    /// Anomalies raised by this walk, in the order they occurred
    pub fn anomalies(&self) -> &[ReconciliationAnomaly] {
        &self.anomalies
    }

    pub fn is_done(&self) -> bool {
        self.state == BacklogState::Done
    }

    fn fall_back(&mut self, scanned: u32, listing_ended: bool) {
        let anomaly = ReconciliationAnomaly {
            kind: AnomalyKind::LastArticleNotFound,
            marker: self.last_article.clone().unwrap_or_default(),
            pages_scanned: scanned,
            listing_ended,
        };
        tracing::warn!(
            "Reconciliation anomaly: {}; treating page {} onward as backlog",
            anomaly,
            self.start_page
        );
        self.anomalies.push(anomaly);
        self.state = BacklogState::Backlog {
            page: self.start_page,
        };
    }

    /// Ends the walk on a listing that keeps repeating itself
    fn stall(&mut self, page: u32) {
        let anomaly = ReconciliationAnomaly {
            kind: AnomalyKind::ListingStalled,
            marker: page.to_string(),
            pages_scanned: self.stale_pages,
            listing_ended: false,
        };
        tracing::warn!("Reconciliation anomaly: {}; ending backlog walk", anomaly);
        self.anomalies.push(anomaly);
        self.state = BacklogState::Done;
    }

    /// Keeps identifiers not offered before, in order
    fn fresh(&mut self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter(|id| self.seen.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Next page holding backlog, or `None` when the walk is over
    ///
    /// Pages whose identifiers were all offered before are passed over. A
    /// page made only of identifiers this walk already read means the
    /// listing is repeating itself (some sites answer every page past the
    /// end with the last one); after `marker-search-pages` such pages in a
    /// row the walk ends with a `ListingStalled` anomaly.
    pub async fn next_page(
        &mut self,
        listing: &mut ListingCache,
    ) -> Result<Option<BacklogPage>, FetchError> {
        loop {
            match self.state {
                BacklogState::Done => return Ok(None),

                BacklogState::Seeking { page, scanned } => {
                    if scanned >= self.marker_search_pages {
                        self.fall_back(scanned, false);
                        continue;
                    }

                    let ids = listing.page(page).await?;
                    if ids.is_empty() {
                        self.fall_back(scanned, true);
                        continue;
                    }

                    let marker = self.last_article.as_deref().unwrap_or_default();
                    match ids.iter().position(|id| id == marker) {
                        Some(at) => {
                            tracing::debug!("Backlog marker found on page {}", page);
                            self.walked.extend(ids.iter().cloned());
                            self.state = BacklogState::Backlog { page: page + 1 };
                            let suffix = self.fresh(&ids[at + 1..]);
                            if !suffix.is_empty() {
                                self.emitted_pages += 1;
                                return Ok(Some(BacklogPage {
                                    page,
                                    identifiers: suffix,
                                }));
                            }
                        }
                        None => {
                            self.state = BacklogState::Seeking {
                                page: page + 1,
                                scanned: scanned + 1,
                            };
                        }
                    }
                }

                BacklogState::Backlog { page } => {
                    if self.max_pages > 0 && self.emitted_pages >= self.max_pages {
                        tracing::info!(
                            "Backlog page limit ({}) reached, resuming next run",
                            self.max_pages
                        );
                        self.state = BacklogState::Done;
                        continue;
                    }

                    listing.evict_below(page);
                    let ids = listing.page(page).await?;
                    if ids.is_empty() {
                        self.state = BacklogState::Done;
                        continue;
                    }

                    let repeated = ids.iter().all(|id| self.walked.contains(id));
                    if repeated {
                        self.stale_pages += 1;
                        if self.stale_pages >= self.marker_search_pages.max(1) {
                            self.stall(page);
                            continue;
                        }
                    } else {
                        self.stale_pages = 0;
                        self.walked.extend(ids.iter().cloned());
                    }

                    self.state = BacklogState::Backlog { page: page + 1 };
                    let identifiers = self.fresh(&ids);
                    if !identifiers.is_empty() {
                        self.emitted_pages += 1;
                        return Ok(Some(BacklogPage { page, identifiers }));
                    }
                }
            }
        }
    }
}

/// Full answer of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// New identifiers, newest first
    pub new_identifiers: Vec<String>,
    /// Backlog identifiers with their listing page, in listing order
    pub backlog: Vec<(u32, String)>,
    pub most_recent: Option<String>,
    pub last_page: u32,
    pub anomalies: Vec<ReconciliationAnomaly>,
}

/// Runs both walks against one listing source
pub struct FrontierReconciler {
    listing: ListingCache,
    config: ListingConfig,
}

impl FrontierReconciler {
    pub fn new(source: Arc<dyn ListingSource>, config: ListingConfig) -> Self {
        Self {
            listing: ListingCache::new(source),
            config,
        }
    }

    /// Catch-up walk against `most_recent`
    pub async fn catch_up(&mut self, most_recent: Option<&str>) -> Result<CatchUp, FetchError> {
        let result = catch_up(&mut self.listing, most_recent, &self.config).await?;
        if let Some(anomaly) = &result.anomaly {
            tracing::warn!(
                "Reconciliation anomaly: {}; treating {} scanned identifiers as new",
                anomaly,
                result.new_identifiers.len()
            );
        }
        Ok(result)
    }

    /// Starts a backlog walk that never repeats identifiers in `exclude`
    pub fn backlog(
        &self,
        last_page: u32,
        last_article: Option<String>,
        exclude: HashSet<String>,
    ) -> BacklogWalk {
        BacklogWalk::new(last_page, last_article, exclude, &self.config)
    }

    /// Advances `walk` by one backlog page
    pub async fn next_backlog_page(
        &mut self,
        walk: &mut BacklogWalk,
    ) -> Result<Option<BacklogPage>, FetchError> {
        walk.next_page(&mut self.listing).await
    }

    /// Computes new and backlog identifiers for `state` in one go
    pub async fn reconcile(&mut self, state: &CrawlState) -> Result<Reconciliation, FetchError> {
        let caught_up = self.catch_up(state.most_recent.as_deref()).await?;

        let exclude: HashSet<String> = caught_up.new_identifiers.iter().cloned().collect();
        let mut walk = self.backlog(state.last_page, state.last_article.clone(), exclude);

        let mut backlog = Vec::new();
        let mut last_page = state.last_page;
        while let Some(page) = self.next_backlog_page(&mut walk).await? {
            last_page = page.page;
            backlog.extend(page.identifiers.into_iter().map(|id| (page.page, id)));
        }

        let anomalies = caught_up
            .anomaly
            .into_iter()
            .chain(walk.anomalies().iter().cloned())
            .collect();

        Ok(Reconciliation {
            new_identifiers: caught_up.new_identifiers,
            backlog,
            most_recent: caught_up.most_recent,
            last_page,
            anomalies,
        })
    }

    /// Listing fetches performed so far
    pub fn pages_fetched(&self) -> u32 {
        self.listing.fetches()
    }
}
