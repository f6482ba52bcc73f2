//! HTTP client utilities.

use reqwest::{Client, Proxy, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;

use crate::config::HttpConfig;

/// Browser-like user agent used for scraped sources and mirrors
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Shared HTTP client with sensible defaults
///
/// Cloning is cheap; every component receives a clone of the one client
/// built at startup so connection pools are shared.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::from_config(&HttpConfig {
            proxy: None,
            timeout_seconds: 30,
        })
    }

    /// Create a client honoring the proxy and timeout settings
    pub fn from_config(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90));

        // Environment proxies are already folded into the config
        builder = match &config.proxy {
            Some(proxy) => {
                tracing::info!("Using proxy: {}", proxy);
                builder.proxy(Proxy::all(proxy)?)
            }
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: Arc::new(builder.build()?),
        })
    }

    /// Create from an existing reqwest Client
    pub fn from_client(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn head(&self, url: &str) -> RequestBuilder {
        self.client.head(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }
}
