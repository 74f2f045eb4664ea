//! Crawler module for harvesting articles
//!
//! This module contains the core harvesting logic, including:
//! - Listing and detail page fetching through a proxy pool
//! - HTML parsing with configurable selectors
//! - Frontier reconciliation against recorded progress
//! - Attachment download with retry and normalization
//! - The serialized storage writer and the bounded worker pool
//! - Overall run coordination

mod attachments;
mod coordinator;
mod extractor;
mod frontier;
mod http;
mod parser;
mod pool;
mod proxy;
mod retry;
mod source;
mod writer;

pub use attachments::{
    attachment_file_name, highest_sequence_on_disk, normalize_image, AttachmentFetcher,
    AttachmentStore,
};
pub use coordinator::{
    dry_run, load_state, run_harvest, Coordinator, DryRunReport, HarvestReport, Sources,
};
pub use extractor::{filter_paragraphs, parse_timestamp, ArticleExtractor};
pub use frontier::{
    catch_up, AnomalyKind, BacklogPage, BacklogWalk, CatchUp, FrontierReconciler, ListingCache,
    Reconciliation, ReconciliationAnomaly,
};
pub use http::{fetch_bytes, FetchedBody, HttpSource};
pub use parser::{parse_detail, parse_listing, PageSelectors};
pub use pool::{PoolReport, WorkerPool};
pub use proxy::{build_http_client, user_agent_string, ProxyPool};
pub use retry::{RetryDecision, RetryPolicy};
pub use source::{AttachmentSink, DetailDocument, DetailSource, ListingSource};
pub use writer::ArticleWriter;

use crate::config::Config;
use crate::HarvestError;
use tokio_util::sync::CancellationToken;

/// Runs a complete harvest
///
/// This is the main entry point for harvesting. It will:
/// 1. Open the store and load the crawl state
/// 2. Record a new run, marking an unfinished one interrupted
/// 3. Catch up with articles published since the last run
/// 4. Drain the backlog page by page
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `config_hash` - Hash of the configuration file
/// * `cancel` - Stops dispatching new articles when cancelled
///
/// # Returns
///
/// * `Ok(HarvestReport)` - The run finished or was cancelled cleanly
/// * `Err(HarvestError)` - The run stopped on a fatal error
pub async fn harvest(
    config: &Config,
    config_hash: &str,
    cancel: &CancellationToken,
) -> Result<HarvestReport, HarvestError> {
    run_harvest(config, config_hash, cancel).await
}
