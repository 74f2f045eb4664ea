//! HTML parser for listing and detail pages
//!
//! This module turns raw HTML into:
//! - The ordered list of article identifiers on a listing page
//! - The raw fields of an article detail page
//!
//! Selectors come from configuration and are compiled once per run.

use crate::config::SelectorConfig;
use crate::crawler::source::DetailDocument;
use crate::url::resolve_identifier;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Compiled CSS selectors for both page shapes
#[derive(Debug, Clone)]
pub struct PageSelectors {
    listing_link: Selector,
    headline: Selector,
    author: Selector,
    published: Selector,
    tags: Selector,
    country: Selector,
    paragraphs: Selector,
    images: Selector,
    links: Selector,
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

impl PageSelectors {
    /// Compiles every configured selector
    pub fn compile(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            listing_link: compile(&config.listing_link)?,
            headline: compile(&config.headline)?,
            author: compile(&config.author)?,
            published: compile(&config.published)?,
            tags: compile(&config.tags)?,
            country: compile(&config.country)?,
            paragraphs: compile(&config.paragraphs)?,
            images: compile(&config.images)?,
            links: compile(&config.links)?,
        })
    }
}

/// Extracts article identifiers from a listing page
///
/// Links are resolved against `base_url` and canonicalized. Order is kept
/// (newest first, as the listing shows them); repeats of the same article
/// on one page are dropped.
///
/// # Example
///
/// ```
/// use news_harvest::config::SelectorConfig;
/// use news_harvest::crawler::{parse_listing, PageSelectors};
/// use url::Url;
///
/// let selectors = PageSelectors::compile(&SelectorConfig::default()).unwrap();
/// let html = r#"<article><a href="/world/b">B</a></article><article><a href="/world/a">A</a></article>"#;
/// let base = Url::parse("https://news.example.com/archive?page=1").unwrap();
///
/// let ids = parse_listing(html, &base, &selectors);
/// assert_eq!(ids, vec!["https://news.example.com/world/b", "https://news.example.com/world/a"]);
/// ```
pub fn parse_listing(html: &str, base_url: &Url, selectors: &PageSelectors) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();

    document
        .select(&selectors.listing_link)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_identifier(href, base_url))
        .filter(|identifier| seen.insert(identifier.clone()))
        .collect()
}

/// Reads the raw fields of an article detail page
///
/// Nothing is validated here; a page without a headline simply yields
/// `headline: None` and the extractor decides what that means.
pub fn parse_detail(html: &str, base_url: &Url, selectors: &PageSelectors) -> DetailDocument {
    let document = Html::parse_document(html);

    let published = document.select(&selectors.published).next().and_then(|el| {
        el.value()
            .attr("datetime")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| text_of(el))
    });

    DetailDocument {
        headline: first_text(&document, &selectors.headline),
        author: first_text(&document, &selectors.author),
        published,
        tags: document
            .select(&selectors.tags)
            .filter_map(text_of)
            .collect(),
        country: first_text(&document, &selectors.country),
        paragraphs: document
            .select(&selectors.paragraphs)
            .map(|el| el.text().collect::<String>())
            .collect(),
        images: document
            .select(&selectors.images)
            .filter_map(|el| el.value().attr("src"))
            .filter_map(|src| resolve_link(src, base_url))
            .collect(),
        links: document
            .select(&selectors.links)
            .filter(|el| el.value().attr("download").is_none())
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| resolve_link(href, base_url))
            .collect(),
    }
}

/// Trimmed text of an element, `None` when blank
fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).find_map(text_of)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}
