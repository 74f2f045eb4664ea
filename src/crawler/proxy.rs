//! HTTP clients and proxy rotation
//!
//! Every proxy gets its own `reqwest::Client` so connection pools are never
//! shared across exits. With no proxies configured the pool holds a single
//! direct client.

use crate::config::{CrawlerConfig, ProxySelection, UserAgentConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Formats the crawler's user agent string
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `timeout` - Total per-request timeout
/// * `proxy` - Optional proxy URL all traffic is routed through
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy URL or TLS setup failure
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
    proxy: Option<&str>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(user_agent_string(user_agent))
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    builder.build()
}

/// Read-only set of clients, one per proxy
pub struct ProxyPool {
    clients: Vec<Client>,
    selection: ProxySelection,
    cursor: AtomicUsize,
    rng: Mutex<StdRng>,
}

impl ProxyPool {
    /// Builds one client per proxy URL, or a single direct client when
    /// `proxies` is empty
    pub fn new(
        proxies: &[String],
        user_agent: &UserAgentConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(crawler.request_timeout_secs);

        let clients = if proxies.is_empty() {
            vec![build_http_client(user_agent, timeout, None)?]
        } else {
            proxies
                .iter()
                .map(|proxy| build_http_client(user_agent, timeout, Some(proxy)))
                .collect::<Result<Vec<_>, _>>()?
        };

        tracing::debug!(
            "Proxy pool ready: {} client(s), {:?} selection",
            clients.len(),
            crawler.proxy_selection
        );

        Ok(Self::from_clients(
            clients,
            crawler.proxy_selection,
            crawler.proxy_seed,
        ))
    }

    /// Wraps prebuilt clients
    pub fn from_clients(clients: Vec<Client>, selection: ProxySelection, seed: u64) -> Self {
        Self {
            clients,
            selection,
            cursor: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Number of clients in the pool
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Index of the client the next request should use
    pub fn next_index(&self) -> usize {
        let len = self.clients.len().max(1);
        match self.selection {
            ProxySelection::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed) % len,
            ProxySelection::Random => {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                rng.gen_range(0..len)
            }
        }
    }

    /// The client for the next request
    pub fn next_client(&self) -> Option<&Client> {
        self.clients.get(self.next_index())
    }
}
