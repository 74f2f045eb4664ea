//! Seams between the pipeline and the outside world
//!
//! The reconciler, extractor and worker pool only see these traits. The
//! HTTP implementations live in `http.rs` and `attachments.rs`; tests plug in
//! in-memory fakes.

use crate::FetchError;
use async_trait::async_trait;

/// Paginated listing of article identifiers
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Identifiers on listing page `page` (1-based), newest first
    ///
    /// An empty vector means the listing has ended.
    async fn fetch_listing(&self, page: u32) -> Result<Vec<String>, FetchError>;
}

/// Raw fields of one article detail page, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailDocument {
    pub headline: Option<String>,
    pub author: Option<String>,
    /// Timestamp text as found on the page
    pub published: Option<String>,
    pub tags: Vec<String>,
    /// Country name as found on the page
    pub country: Option<String>,
    /// Body paragraphs in document order
    pub paragraphs: Vec<String>,
    /// Absolute image URLs in document order
    pub images: Vec<String>,
    /// Absolute outbound links in document order
    pub links: Vec<String>,
}

/// Loads article detail documents
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_detail(&self, identifier: &str) -> Result<DetailDocument, FetchError>;
}

/// Downloads and stores one attachment, returning the stored file name
#[async_trait]
pub trait AttachmentSink: Send + Sync {
    async fn store(&self, url: &str) -> Result<String, FetchError>;
}
