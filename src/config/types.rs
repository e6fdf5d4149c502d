use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Wiki-Ripple
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
}

/// Crawl scheduling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Article identifier the crawl starts from
    pub seed: String,

    /// Maximum number of fetch workers running at once
    #[serde(rename = "max-concurrent-workers")]
    pub max_concurrent_workers: usize,

    /// Total number of batches this run may start (unbounded when absent)
    #[serde(rename = "max-batches", default)]
    pub max_batches: Option<u64>,

    /// Number of articles handed to one worker
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// How fetch workers are isolated from the orchestrator
    #[serde(default)]
    pub isolation: Isolation,
}

/// Worker isolation strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Each batch runs in a child process of the current executable
    #[default]
    Process,
    /// Each batch runs as a task inside the orchestrator process
    Task,
}

/// Fetch collaborator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Base URL article identifiers are appended to
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Pause between two fetches of the same worker (milliseconds)
    #[serde(rename = "request-delay", default = "default_request_delay")]
    pub request_delay: u64,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Durable store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,
}

impl FetchConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn default_request_delay() -> u64 {
    50
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("wiki-ripple/{}", env!("CARGO_PKG_VERSION"))
}
