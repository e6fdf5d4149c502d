//! HTTP fetcher implementation
//!
//! This module is the fetch collaborator of the crawl: given an article
//! identifier it downloads the article page and returns the identifiers of
//! the articles it links to.

use crate::config::FetchConfig;
use crate::crawler::parser::{extract_article_links, is_dot_segment};
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// Errors produced while fetching a single article
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid article identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Request for {identifier} failed: {source}")]
    Http {
        identifier: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{identifier} returned HTTP {status}")]
    Status { identifier: String, status: u16 },
}

/// Source of outgoing article links
///
/// Implementations must return a deduplicated list that excludes
/// self-references and non-article targets.
#[async_trait]
pub trait LinkFetcher: Send + Sync {
    async fn fetch_links(&self, identifier: &str) -> Result<Vec<String>, FetchError>;
}

/// Fetches article pages over HTTP and extracts their article links
#[derive(Debug, Clone)]
pub struct WikiFetcher {
    client: Client,
    base_url: Url,
}

impl WikiFetcher {
    /// Builds a fetcher from the fetch configuration
    ///
    /// # Returns
    ///
    /// * `Ok(WikiFetcher)` - Successfully built HTTP client
    /// * `Err(crate::RippleError)` - Invalid base URL or client construction failure
    pub fn new(config: &FetchConfig) -> crate::Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            crate::ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", config.base_url, e))
        })?;
        let client = build_http_client(config)?;
        Ok(Self { client, base_url })
    }

    /// Resolves the page URL of an article
    pub fn article_url(&self, identifier: &str) -> Result<Url, FetchError> {
        if identifier.is_empty()
            || is_dot_segment(identifier)
            || identifier.contains(':')
            || identifier.contains('/')
        {
            return Err(FetchError::InvalidIdentifier(identifier.to_string()));
        }

        self.base_url
            .join(identifier)
            .map_err(|_| FetchError::InvalidIdentifier(identifier.to_string()))
    }
}

#[async_trait]
impl LinkFetcher for WikiFetcher {
    async fn fetch_links(&self, identifier: &str) -> Result<Vec<String>, FetchError> {
        let url = self.article_url(identifier)?;
        tracing::trace!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                identifier: identifier.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                identifier: identifier.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Http {
            identifier: identifier.to_string(),
            source,
        })?;

        Ok(extract_article_links(&body, identifier))
    }
}

/// Builds an HTTP client with the configured user agent and timeout
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(config.timeout().min(std::time::Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}
