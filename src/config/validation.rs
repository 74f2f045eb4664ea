use crate::config::types::{
    Config, CrawlerConfig, ListingConfig, OutputConfig, SelectorConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_listing_config(&config.listing)?;
    validate_selectors(&config.selectors)?;
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the listing location and walk bounds
fn validate_listing_config(config: &ListingConfig) -> Result<(), ConfigError> {
    if !config.listing_url.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "listing-url must contain a {{page}} placeholder, got '{}'",
            config.listing_url
        )));
    }

    let url = Url::parse(&config.page_url(1))
        .map_err(|e| ConfigError::InvalidUrl(format!("listing-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "listing-url must use HTTP or HTTPS, got '{}'",
            url.scheme()
        )));
    }

    if config.first_run_pages < 1 {
        return Err(ConfigError::Validation(
            "first-run-pages must be >= 1".to_string(),
        ));
    }

    if config.max_catch_up_pages < 1 {
        return Err(ConfigError::Validation(
            "max-catch-up-pages must be >= 1".to_string(),
        ));
    }

    if config.marker_search_pages < 1 {
        return Err(ConfigError::Validation(
            "marker-search-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Checks that every selector parses
fn validate_selectors(config: &SelectorConfig) -> Result<(), ConfigError> {
    for selector in [
        &config.listing_link,
        &config.headline,
        &config.author,
        &config.published,
        &config.tags,
        &config.country,
        &config.paragraphs,
        &config.images,
        &config.links,
    ] {
        Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
            selector: selector.clone(),
            message: format!("{:?}", e),
        })?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-max-ms ({}) must be >= backoff-base-ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.boilerplate_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "boilerplate-marker cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Rejects a blank value for the config key `key`
fn require(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", key)));
    }
    Ok(())
}

/// The identity sent with every request
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    require("crawler-name", &config.crawler_name)?;
    // The name becomes the product token of the User-Agent header
    if let Some(bad) = config
        .crawler_name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name '{}' contains '{}'; use letters, digits and hyphens",
            config.crawler_name, bad
        )));
    }
    require("crawler-version", &config.crawler_version)?;

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("contact-url: {}", e)))?;

    validate_email(&config.contact_email)
}

/// Output locations; the snapshot must not overwrite the database
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    require("database-path", &config.database_path)?;
    require("progress-path", &config.progress_path)?;
    require("attachments-dir", &config.attachments_dir)?;

    if config.progress_path == config.database_path {
        return Err(ConfigError::Validation(format!(
            "progress-path and database-path both point at '{}'",
            config.database_path
        )));
    }

    if let Some(proxy_file) = &config.proxy_file {
        require("proxy-file", proxy_file)?;
    }

    Ok(())
}

/// Basic shape check for the contact address
fn validate_email(email: &str) -> Result<(), ConfigError> {
    require("contact-email", email)?;

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };

    if !valid {
        return Err(ConfigError::Validation(format!(
            "contact-email '{}' is not an email address",
            email
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(url: &str) -> ListingConfig {
        ListingConfig {
            listing_url: url.to_string(),
            first_run_pages: 3,
            max_catch_up_pages: 100,
            marker_search_pages: 5,
            max_backlog_pages: 0,
        }
    }

    #[test]
    fn test_validate_listing_url() {
        assert!(validate_listing_config(&listing("https://example.com/news?page={page}")).is_ok());
        assert!(validate_listing_config(&listing("https://example.com/news/{page}/")).is_ok());

        assert!(validate_listing_config(&listing("https://example.com/news")).is_err());
        assert!(validate_listing_config(&listing("ftp://example.com/{page}")).is_err());
        assert!(validate_listing_config(&listing("not a url {page}")).is_err());
    }

    #[test]
    fn test_validate_selectors() {
        assert!(validate_selectors(&SelectorConfig::default()).is_ok());

        let broken = SelectorConfig {
            headline: "h1[[".to_string(),
            ..SelectorConfig::default()
        };
        assert!(matches!(
            validate_selectors(&broken),
            Err(ConfigError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_validate_crawler_bounds() {
        assert!(validate_crawler_config(&CrawlerConfig::default()).is_ok());

        let too_wide = CrawlerConfig {
            concurrency: 65,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&too_wide).is_err());

        let inverted_backoff = CrawlerConfig {
            backoff_base_ms: 1000,
            backoff_max_ms: 10,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&inverted_backoff).is_err());

        let blank_marker = CrawlerConfig {
            boilerplate_marker: "  ".to_string(),
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&blank_marker).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
        assert!(validate_email("a@b@example.com").is_err());
    }

    #[test]
    fn test_progress_path_must_differ_from_database() {
        let output = OutputConfig {
            database_path: "./harvest.db".to_string(),
            progress_path: "./harvest.db".to_string(),
            attachments_dir: "./attachments".to_string(),
            attachment_format: Default::default(),
            proxy_file: None,
        };
        assert!(validate_output_config(&output).is_err());
    }
}
