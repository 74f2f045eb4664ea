use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with every harvest run so a change of configuration between
/// runs can be spotted in the run history.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Loads the proxy list referenced by the configuration
///
/// One proxy URL per line. Blank lines and lines starting with `#` are
/// ignored. A missing path yields an empty list, meaning direct connections.
pub fn load_proxy_list(path: Option<&Path>) -> Result<Vec<String>, ConfigError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let content = std::fs::read_to_string(path)?;
    let mut proxies = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        url::Url::parse(line)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", line, e)))?;
        proxies.push(line.to_string());
    }

    Ok(proxies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttachmentFormat, ProxySelection};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[listing]
listing-url = "https://news.example.com/archive?page={page}"
first-run-pages = 2

[crawler]
concurrency = 6
proxy-selection = "random"

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"
progress-path = "./progress.toml"
attachments-dir = "./attachments"
attachment-format = "png"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.listing.first_run_pages, 2);
        assert_eq!(config.listing.max_catch_up_pages, 100);
        assert_eq!(config.crawler.concurrency, 6);
        assert_eq!(config.crawler.max_attempts, 3);
        assert_eq!(config.crawler.proxy_selection, ProxySelection::Random);
        assert_eq!(config.output.attachment_format, AttachmentFormat::Png);
        assert_eq!(config.user_agent.crawler_name, "TestHarvester");
        assert_eq!(config.selectors.headline, "h1");
    }

    #[test]
    fn test_page_url_rendering() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.listing.page_url(7),
            "https://news.example.com/archive?page=7"
        );
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("concurrency = 6", "concurrency = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_load_proxy_list() {
        let file = create_temp_config(
            "# office proxies\nhttp://10.0.0.1:8080\n\n  http://10.0.0.2:8080  \n",
        );
        let proxies = load_proxy_list(Some(file.path())).unwrap();
        assert_eq!(proxies, vec!["http://10.0.0.1:8080", "http://10.0.0.2:8080"]);
    }

    #[test]
    fn test_load_proxy_list_without_file_is_empty() {
        assert!(load_proxy_list(None).unwrap().is_empty());
    }

    #[test]
    fn test_load_proxy_list_rejects_garbage() {
        let file = create_temp_config("not a proxy\n");
        assert!(matches!(
            load_proxy_list(Some(file.path())),
            Err(ConfigError::InvalidUrl(_))
        ));
    }
}
