use serde::Deserialize;

/// Main configuration structure for News Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub listing: ListingConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Where the listing lives and how far the reconciler may walk it
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Listing page URL template, `{page}` is replaced by the page number
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Pages treated as new on a first run, when no article is known yet
    #[serde(rename = "first-run-pages", default = "default_first_run_pages")]
    pub first_run_pages: u32,

    /// Catch-up stops here if the most recent known article never shows up
    #[serde(rename = "max-catch-up-pages", default = "default_max_catch_up_pages")]
    pub max_catch_up_pages: u32,

    /// Pages searched for the last backlog article before falling back
    #[serde(rename = "marker-search-pages", default = "default_marker_search_pages")]
    pub marker_search_pages: u32,

    /// Backlog pages drained per run (0 = unlimited)
    #[serde(rename = "max-backlog-pages", default)]
    pub max_backlog_pages: u32,
}

impl ListingConfig {
    /// Renders the listing URL for a page number
    pub fn page_url(&self, page: u32) -> String {
        self.listing_url.replace("{page}", &page.to_string())
    }
}

/// CSS selectors used to read listing and detail pages
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    #[serde(rename = "listing-link")]
    pub listing_link: String,
    pub headline: String,
    pub author: String,
    pub published: String,
    pub tags: String,
    pub country: String,
    pub paragraphs: String,
    pub images: String,
    pub links: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing_link: "article a[href]".to_string(),
            headline: "h1".to_string(),
            author: ".author".to_string(),
            published: "time[datetime]".to_string(),
            tags: ".tags a".to_string(),
            country: ".country".to_string(),
            paragraphs: "article p".to_string(),
            images: "article img[src]".to_string(),
            links: "article a[href]".to_string(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of articles extracted and committed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Attempts per attachment download, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds), doubled per attempt
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single retry delay (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Paragraphs starting with this text are dropped from the body
    #[serde(rename = "boilerplate-marker", default = "default_boilerplate_marker")]
    pub boilerplate_marker: String,

    /// How the proxy for each request is chosen
    #[serde(rename = "proxy-selection", default)]
    pub proxy_selection: ProxySelection,

    /// Seed for random proxy selection
    #[serde(rename = "proxy-seed", default)]
    pub proxy_seed: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            boilerplate_marker: default_boilerplate_marker(),
            proxy_selection: ProxySelection::default(),
            proxy_seed: 0,
        }
    }
}

/// Proxy rotation policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxySelection {
    #[default]
    RoundRobin,
    Random,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the human-readable progress snapshot
    #[serde(rename = "progress-path")]
    pub progress_path: String,

    /// Directory holding stored attachments
    #[serde(rename = "attachments-dir")]
    pub attachments_dir: String,

    /// Canonical format every attachment is re-encoded to
    #[serde(rename = "attachment-format", default)]
    pub attachment_format: AttachmentFormat,

    /// Optional proxy list, one proxy URL per line
    #[serde(rename = "proxy-file", default)]
    pub proxy_file: Option<String>,
}

/// Raster formats attachments can be stored in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentFormat {
    #[default]
    Jpeg,
    Png,
}

impl AttachmentFormat {
    /// File extension used for stored files
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Parses a stored file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

fn default_first_run_pages() -> u32 {
    3
}

fn default_max_catch_up_pages() -> u32 {
    100
}

fn default_marker_search_pages() -> u32 {
    5
}

fn default_concurrency() -> u32 {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_boilerplate_marker() -> String {
    "Read more:".to_string()
}
