//! Article extraction
//!
//! Turns an identifier into an `ArticleRecord`: loads the detail document,
//! validates required fields, filters boilerplate paragraphs, resolves the
//! country and stores every embedded image.

use crate::country::country_code;
use crate::crawler::source::{AttachmentSink, DetailSource};
use crate::storage::ArticleRecord;
use crate::ExtractionError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;

/// Keeps paragraphs that do not start with `marker` and joins them with a
/// blank line
///
/// Leading whitespace is ignored when testing for the marker; a marker
/// anywhere else in the paragraph does not drop it. Blank paragraphs are
/// removed.
///
/// # Example
///
/// ```
/// use news_harvest::crawler::filter_paragraphs;
///
/// let paragraphs = vec![
///     "The council met on Monday.".to_string(),
///     "  Read more: the full agenda".to_string(),
///     "Critics said \"Read more: nothing\" was the message.".to_string(),
/// ];
/// let body = filter_paragraphs(&paragraphs, "Read more:");
/// assert_eq!(
///     body,
///     "The council met on Monday.\n\nCritics said \"Read more: nothing\" was the message."
/// );
/// ```
pub fn filter_paragraphs(paragraphs: &[String], marker: &str) -> String {
    paragraphs
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && !p.starts_with(marker))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parses a publication timestamp in the formats news sites commonly use
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and a bare `YYYY-MM-DD`; naive
/// values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Builds article records from detail pages
pub struct ArticleExtractor {
    details: Arc<dyn DetailSource>,
    attachments: Arc<dyn AttachmentSink>,
    marker: String,
}

impl ArticleExtractor {
    pub fn new(
        details: Arc<dyn DetailSource>,
        attachments: Arc<dyn AttachmentSink>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            details,
            attachments,
            marker: marker.into(),
        }
    }

    /// Extracts the article behind `identifier`
    ///
    /// # Errors
    ///
    /// * `ExtractionError::Fetch` - the detail page could not be loaded
    /// * `ExtractionError::MissingField` - no headline, or no body paragraphs
    ///
    /// A failed image never fails the article; its slot is recorded as
    /// `None`.
    pub async fn extract(&self, identifier: &str) -> Result<ArticleRecord, ExtractionError> {
        let document = self
            .details
            .fetch_detail(identifier)
            .await
            .map_err(|source| ExtractionError::Fetch {
                identifier: identifier.to_string(),
                source,
            })?;

        let headline = document
            .headline
            .ok_or_else(|| ExtractionError::MissingField {
                identifier: identifier.to_string(),
                field: "headline",
            })?;

        if document.paragraphs.iter().all(|p| p.trim().is_empty()) {
            return Err(ExtractionError::MissingField {
                identifier: identifier.to_string(),
                field: "body",
            });
        }

        let body = filter_paragraphs(&document.paragraphs, &self.marker);

        let published_at = document.published.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                tracing::debug!("Unparseable timestamp '{}' in {}", raw, identifier);
            }
            parsed
        });

        let country = document.country.as_deref().and_then(|name| {
            let code = country_code(name);
            if code.is_none() {
                tracing::debug!("No country code for '{}' in {}", name, identifier);
            }
            code.map(str::to_string)
        });

        // Sequential so stored numbering follows document order
        let mut attachments = Vec::with_capacity(document.images.len());
        for image_url in &document.images {
            match self.attachments.store(image_url).await {
                Ok(name) => attachments.push(Some(name)),
                Err(e) => {
                    tracing::warn!(
                        "Attachment {} of {} missing: {}",
                        image_url,
                        identifier,
                        e
                    );
                    attachments.push(None);
                }
            }
        }

        Ok(ArticleRecord {
            source_url: identifier.to_string(),
            headline,
            author: document.author.unwrap_or_default(),
            published_at,
            body,
            links: document.links,
            attachments,
            tags: document.tags,
            country_code: country,
        })
    }
}
