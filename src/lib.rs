//! Wiki-Ripple: a crash-recoverable encyclopedia link-graph crawler
//!
//! Starting from a seed article, the crawler discovers outgoing links,
//! persists them as graph edges in SQLite and recursively enqueues newly
//! discovered articles. Fetching happens in isolated worker processes that
//! are scheduled under a concurrency cap and an optional total-batch budget.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Wiki-Ripple operations
#[derive(Debug, Error)]
pub enum RippleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Worker protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid article identifier: {0}")]
    InvalidIdentifier(String),
}

/// Result type alias for Wiki-Ripple operations
pub type Result<T> = std::result::Result<T, RippleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{ArticleState, RunStatus};
pub use storage::{Graph, SqliteStorage, Storage, StorageError, WorkQueue};
