//! HTTP implementations of the listing and detail sources
//!
//! Requests go through the proxy pool; errors are classified into
//! transient and permanent `FetchError`s at this boundary.

use crate::config::{ListingConfig, SelectorConfig};
use crate::crawler::parser::{parse_detail, parse_listing, PageSelectors};
use crate::crawler::proxy::ProxyPool;
use crate::crawler::source::{DetailDocument, DetailSource, ListingSource};
use crate::{ConfigError, FetchError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use url::Url;

/// A successful response body
#[derive(Debug)]
pub struct FetchedBody {
    /// Final URL after redirects
    pub final_url: String,
    pub bytes: Vec<u8>,
}

/// Performs one GET through the next client of the pool
///
/// Non-success statuses become `FetchError`s: 5xx is transient, anything
/// else permanent.
pub async fn fetch_bytes(pool: &ProxyPool, url: &str) -> Result<FetchedBody, FetchError> {
    let client = pool.next_client().ok_or_else(|| FetchError::Permanent {
        url: url.to_string(),
        reason: "No HTTP client available".to_string(),
        status: None,
    })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, &e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::from_status(url, status.as_u16()));
    }

    let final_url = response.url().to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::from_reqwest(url, &e))?;

    Ok(FetchedBody {
        final_url,
        bytes: bytes.to_vec(),
    })
}

async fn fetch_html(pool: &ProxyPool, url: &str) -> Result<(Url, String), FetchError> {
    let body = fetch_bytes(pool, url).await?;

    let base = Url::parse(&body.final_url).map_err(|e| FetchError::Permanent {
        url: url.to_string(),
        reason: format!("Unparseable final URL: {}", e),
        status: None,
    })?;

    Ok((base, String::from_utf8_lossy(&body.bytes).into_owned()))
}

/// Listing and detail pages served over HTTP
pub struct HttpSource {
    pool: Arc<ProxyPool>,
    listing: ListingConfig,
    selectors: PageSelectors,
}

impl HttpSource {
    pub fn new(
        pool: Arc<ProxyPool>,
        listing: ListingConfig,
        selectors: &SelectorConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            pool,
            listing,
            selectors: PageSelectors::compile(selectors)?,
        })
    }
}

#[async_trait]
impl ListingSource for HttpSource {
    async fn fetch_listing(&self, page: u32) -> Result<Vec<String>, FetchError> {
        let url = self.listing.page_url(page);
        tracing::debug!("Fetching listing page {}: {}", page, url);

        match fetch_html(&self.pool, &url).await {
            Ok((base, html)) => Ok(parse_listing(&html, &base, &self.selectors)),
            // Past the last page many sites answer 404 instead of an empty list
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                tracing::debug!("Listing page {} not found, treating as end of listing", page);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl DetailSource for HttpSource {
    async fn fetch_detail(&self, identifier: &str) -> Result<DetailDocument, FetchError> {
        tracing::debug!("Fetching detail page: {}", identifier);
        let (base, html) = fetch_html(&self.pool, identifier).await?;
        Ok(parse_detail(&html, &base, &self.selectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxySelection;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pool() -> Arc<ProxyPool> {
        Arc::new(ProxyPool::from_clients(
            vec![reqwest::Client::new()],
            ProxySelection::RoundRobin,
            0,
        ))
    }

    fn source(server: &MockServer) -> HttpSource {
        let listing = ListingConfig {
            listing_url: format!("{}/archive?page={{page}}", server.uri()),
            first_run_pages: 3,
            max_catch_up_pages: 10,
            marker_search_pages: 5,
            max_backlog_pages: 0,
        };
        HttpSource::new(pool(), listing, &SelectorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_listing_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/archive"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<article><a href="/news/b">B</a></article><article><a href="/news/a">A</a></article>"#,
            ))
            .mount(&server)
            .await;

        let ids = source(&server).fetch_listing(2).await.unwrap();
        assert_eq!(
            ids,
            vec![
                format!("{}/news/b", server.uri()),
                format!("{}/news/a", server.uri())
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_listing_page_is_end_of_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/archive"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ids = source(&server).fetch_listing(7).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news/a"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source(&server)
            .fetch_detail(&format!("{}/news/a", server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_fetch_detail_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<h1>Headline</h1><article><p>Body</p><img src="/img/1.png"></article>"#,
            ))
            .mount(&server)
            .await;

        let doc = source(&server)
            .fetch_detail(&format!("{}/news/a", server.uri()))
            .await
            .unwrap();
        assert_eq!(doc.headline.as_deref(), Some("Headline"));
        assert_eq!(doc.images, vec![format!("{}/img/1.png", server.uri())]);
    }
}
