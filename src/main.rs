//! News Harvest main entry point
//!
//! This is the command-line interface for the News Harvest article harvester.

use anyhow::Context;
use clap::Parser;
use news_harvest::config::{load_config_with_hash, Config};
use news_harvest::crawler::{dry_run, harvest};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// News Harvest: a resumable news article harvester
///
/// News Harvest catches up with articles published since its last run,
/// then works through the older backlog. Progress is committed together
/// with every article, so an interrupted harvest resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "news-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable news article harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without harvesting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config).await
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_harvest(&config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("news_harvest=info,warn"),
            1 => EnvFilter::new("news_harvest=debug,info"),
            2 => EnvFilter::new("news_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels `cancel` on the first SIGINT or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C"),
                }
            }
            Err(e) => {
                tracing::warn!("Could not register SIGTERM handler: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                tracing::info!("Received Ctrl+C");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Received Ctrl+C");
    }

    tracing::info!("Stopping: no new articles are dispatched, in-flight ones finish");
    cancel.cancel();
}

/// Handles the --dry-run mode: reconciles the frontier without extracting
async fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== News Harvest Dry Run ===\n");

    println!("Listing: {}", config.listing.listing_url);
    println!("  First-run pages: {}", config.listing.first_run_pages);
    println!("  Max catch-up pages: {}", config.listing.max_catch_up_pages);
    println!("  Marker search pages: {}", config.listing.marker_search_pages);
    println!("Workers: {}", config.crawler.concurrency);
    println!("Database: {}", config.output.database_path);
    println!("Attachments: {}\n", config.output.attachments_dir);

    let report = dry_run(config).await.context("dry run failed")?;

    println!("Crawl state:");
    println!("  Next key: {}", report.state.next_key);
    println!(
        "  Most recent article: {}",
        report.state.most_recent.as_deref().unwrap_or("-")
    );
    println!(
        "  Backlog position: page {}, after {}",
        report.state.last_page,
        report.state.last_article.as_deref().unwrap_or("-")
    );
    println!();

    let reconciliation = &report.reconciliation;
    println!("Listing pages fetched: {}", report.pages_fetched);
    println!("New articles: {}", reconciliation.new_identifiers.len());
    println!("Backlog articles: {}", reconciliation.backlog.len());
    println!("Already stored: {}", report.already_stored);
    for anomaly in &reconciliation.anomalies {
        println!("Anomaly: {}", anomaly);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use news_harvest::output::{load_statistics, print_statistics};
    use news_harvest::storage::open_storage;
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = harvest(config, config_hash, &cancel).await;
    signals.abort();

    let report = result.context("harvest stopped on a fatal error")?;

    if report.cancelled {
        tracing::info!("Harvest interrupted; the next run resumes from the recorded state");
    }
    for anomaly in &report.anomalies {
        tracing::warn!("Anomaly during run {}: {}", report.run_id, anomaly);
    }
    tracing::info!(
        "Stored {} new articles; next key {}",
        report.pool.committed,
        report.state.next_key
    );

    Ok(())
}
