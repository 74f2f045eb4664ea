//! Configuration module for News Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and loading the optional proxy list they point to.
//!
//! # Example
//!
//! ```no_run
//! use news_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting with {} workers", config.crawler.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AttachmentFormat, Config, CrawlerConfig, ListingConfig, OutputConfig, ProxySelection,
    SelectorConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, load_proxy_list};
