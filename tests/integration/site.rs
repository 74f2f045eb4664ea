//! Mock news site and configuration shared by the integration tests

use news_harvest::config::{
    AttachmentFormat, Config, CrawlerConfig, ListingConfig, OutputConfig, SelectorConfig,
    UserAgentConfig,
};
use std::io::Cursor;
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration against `server`, storing under `dir`
pub fn create_test_config(server: &MockServer, dir: &Path) -> Config {
    Config {
        listing: ListingConfig {
            listing_url: format!("{}/archive?page={{page}}", server.uri()),
            first_run_pages: 3,
            max_catch_up_pages: 20,
            marker_search_pages: 5,
            max_backlog_pages: 0,
        },
        selectors: SelectorConfig::default(),
        crawler: CrawlerConfig {
            concurrency: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            request_timeout_secs: 5,
            ..CrawlerConfig::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestHarvest".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: dir.join("harvest.db").display().to_string(),
            progress_path: dir.join("progress.toml").display().to_string(),
            attachments_dir: dir.join("attachments").display().to_string(),
            attachment_format: AttachmentFormat::Jpeg,
            proxy_file: None,
        },
    }
}

/// Canonical identifier of article `slug` on `server`
pub fn article_url(server: &MockServer, slug: &str) -> String {
    format!("{}/news/{}", server.uri(), slug)
}

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([20, 120, 220, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Serves listing page `page` holding `slugs`, newest first
pub async fn mount_listing(server: &MockServer, page: u32, slugs: &[&str]) {
    let body: String = slugs
        .iter()
        .map(|slug| format!(r#"<article><a href="/news/{}">{}</a></article>"#, slug, slug))
        .collect();

    Mock::given(method("GET"))
        .and(path("/archive"))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body>{}</body></html>", body))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Serves a detail page for `slug` with one working image
pub async fn mount_article(server: &MockServer, slug: &str) {
    mount_detail(
        server,
        slug,
        &format!(
            r#"<h1>Story {slug}</h1>
            <span class="author">Staff</span>
            <time datetime="2024-04-01T09:00:00Z">1 April</time>
            <span class="country">Germany</span>
            <article>
              <p>First paragraph of {slug}.</p>
              <p>Read more: other stories</p>
              <p>Second paragraph of {slug}.</p>
              <img src="/img/{slug}.png">
            </article>"#
        ),
    )
    .await;
    mount_image(server, slug).await;
}

pub async fn mount_detail(server: &MockServer, slug: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/news/{}", slug)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body>{}</body></html>", body))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

pub async fn mount_image(server: &MockServer, slug: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/img/{}.png", slug)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes())
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
}

/// Paths of detail pages the server has been asked for
pub async fn detail_requests(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|request| request.url.path().to_string())
        .filter(|path| path.starts_with("/news/"))
        .collect()
}
