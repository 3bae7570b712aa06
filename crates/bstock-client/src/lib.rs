pub mod extract;
pub mod identifier;
pub mod store;
pub mod types;

pub use extract::{FactsExtractor, PageFacts, RegexExtractor};
pub use store::{ItemStore, StoreError};

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use directories::ProjectDirs;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const DEFAULT_SITE_BASE_URL: &str = "https://www.thomann.de";
const DEFAULT_USER_AGENT: &str = concat!("BStockBeacon/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("unexpected status code: {0}")]
    Status(StatusCode),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub data_dir: PathBuf,
    pub site_base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(ItemStore::FILE_NAME)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("de", "BStockBeacon", "bstock-beacon").map_or_else(
            || PathBuf::from(".bstock-beacon"),
            |dirs| dirs.data_dir().to_path_buf(),
        );

        Self {
            data_dir,
            site_base_url: DEFAULT_SITE_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Source of page markup. The HTTP client is the production implementation;
/// tests serve fixtures instead.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String, ClientError>;
}

#[derive(Debug)]
pub struct BeaconClient {
    http: Client,
    config: ClientConfig,
}

impl BeaconClient {
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .context("failed to build reqwest client")?;

        if let Err(error) = std::fs::create_dir_all(&config.data_dir) {
            warn!(
                target: "bstock_client",
                error = %error,
                data_dir = %config.data_dir.display(),
                "failed to create data directory; store writes may fail"
            );
        }

        Ok(Self { http, config })
    }

    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }

    pub async fn open_store(&self) -> Result<ItemStore> {
        let path = self.config.store_path();
        ItemStore::open(&path)
            .await
            .with_context(|| format!("failed to open item store at {}", path.display()))
    }
}

#[async_trait]
impl PageFetcher for BeaconClient {
    #[instrument(name = "bstock_client.fetch_html", skip(self))]
    async fn fetch_html(&self, url: &str) -> Result<String, ClientError> {
        let parsed = Url::parse(url).map_err(|err| ClientError::InvalidUrl(format!("{url}: {err}")))?;

        let response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        if !response.status().is_success() {
            warn!(target: "bstock_client", status = %response.status(), url, "page request failed");
            return Err(ClientError::Status(response.status()));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        debug!(target: "bstock_client", url, bytes = body.len(), "page fetched");
        Ok(body)
    }
}
