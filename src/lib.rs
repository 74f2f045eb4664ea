//! News Harvest: a resumable news article harvester
//!
//! This crate walks a paginated news listing, extracts structured article
//! records and their images, and stores them in SQLite. Progress is recorded
//! atomically with every committed article so an interrupted harvest resumes
//! exactly where it stopped, without duplicating or losing articles.

pub mod config;
pub mod country;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for News Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::ArticleState,
        to: state::ArticleState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Network fetch errors, split by whether a retry can help
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Timeouts, connection failures and 5xx responses
    #[error("Transient failure fetching {url}: {reason}")]
    Transient {
        url: String,
        reason: String,
        status: Option<u16>,
    },

    /// 4xx responses and malformed payloads
    #[error("Permanent failure fetching {url}: {reason}")]
    Permanent {
        url: String,
        reason: String,
        status: Option<u16>,
    },
}

impl FetchError {
    /// Returns true if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The URL whose fetch failed
    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. } | Self::Permanent { url, .. } => url,
        }
    }

    /// The HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
        }
    }

    /// Classifies a reqwest transport error
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Transient {
                url: url.to_string(),
                reason: "Request timeout".to_string(),
                status: None,
            }
        } else if error.is_connect() {
            Self::Transient {
                url: url.to_string(),
                reason: format!("Connection failed: {}", error),
                status: None,
            }
        } else if let Some(status) = error.status() {
            Self::from_status(url, status.as_u16())
        } else {
            Self::Permanent {
                url: url.to_string(),
                reason: error.to_string(),
                status: None,
            }
        }
    }

    /// Classifies a non-success HTTP status code
    pub fn from_status(url: &str, status: u16) -> Self {
        if (500..600).contains(&status) {
            Self::Transient {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
                status: Some(status),
            }
        } else {
            Self::Permanent {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
                status: Some(status),
            }
        }
    }
}

/// Errors raised while turning a detail page into an article record
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Missing required field '{field}' in {identifier}")]
    MissingField {
        identifier: String,
        field: &'static str,
    },

    #[error("Failed to load {identifier}: {source}")]
    Fetch {
        identifier: String,
        #[source]
        source: FetchError,
    },
}

impl ExtractionError {
    /// Returns true if the failure may go away on a later run
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { source, .. } if source.is_transient())
    }
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for News Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use country::country_code;
pub use state::{ArticleState, CrawlState};
pub use url::normalize_url;
