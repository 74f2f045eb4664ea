//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::state::CrawlState;
use crate::storage::{RunRecord, Storage};
use crate::HarvestError;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored articles
    pub total_articles: u64,

    /// Articles whose country resolved to a code
    pub articles_with_country: u64,

    /// Attachment slots holding a stored file
    pub attachments_stored: u64,

    /// Attachment slots whose download failed
    pub attachments_missing: u64,

    /// Crawl state recorded in the database, if any run committed
    pub crawl_state: Option<CrawlState>,

    /// Most recent harvest run
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    let total_articles = storage.count_articles()?;
    let articles_with_country = storage.count_articles_with_country()?;
    let (attachments_stored, attachments_missing) = storage.count_attachment_slots()?;

    Ok(HarvestStatistics {
        total_articles,
        articles_with_country,
        attachments_stored,
        attachments_missing,
        crawl_state: storage.load_crawl_state()?,
        latest_run: storage.get_latest_run()?,
    })
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Articles:");
    println!("  Total stored: {}", stats.total_articles);
    println!(
        "  With country code: {} ({:.1}%)",
        stats.articles_with_country,
        percentage(stats.articles_with_country, stats.total_articles)
    );
    println!();

    let slots = stats.attachments_stored + stats.attachments_missing;
    println!("Attachments:");
    println!(
        "  Stored: {} ({:.1}% of {} slots)",
        stats.attachments_stored,
        percentage(stats.attachments_stored, slots),
        slots
    );
    println!("  Missing: {}", stats.attachments_missing);
    println!();

    match &stats.crawl_state {
        Some(state) => {
            println!("Crawl State:");
            println!("  Next key: {}", state.next_key);
            println!(
                "  Most recent article: {}",
                state.most_recent.as_deref().unwrap_or("-")
            );
            println!("  Backlog page: {}", state.last_page);
            println!(
                "  Last backlog article: {}",
                state.last_article.as_deref().unwrap_or("-")
            );
            println!("  Next attachment: {}", state.next_attachment);
        }
        None => println!("Crawl State: none recorded yet"),
    }
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  Id: {}", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Config hash: {}", run.config_hash);
    }
}
