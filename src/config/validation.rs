use crate::config::types::{Config, CrawlerConfig, FetchConfig, StorageConfig};
use crate::crawler::is_dot_segment;
use crate::ConfigError;
use url::Url;

const MAX_CONCURRENT_WORKERS: usize = 256;
const MAX_BATCH_SIZE: usize = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_identifier(&config.seed)?;

    if config.max_concurrent_workers < 1 || config.max_concurrent_workers > MAX_CONCURRENT_WORKERS
    {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_workers must be between 1 and {}, got {}",
            MAX_CONCURRENT_WORKERS, config.max_concurrent_workers
        )));
    }

    if config.batch_size < 1 || config.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, config.batch_size
        )));
    }

    if config.max_batches == Some(0) {
        return Err(ConfigError::Validation(
            "max_batches must be >= 1 when set (omit it for an unbounded crawl)".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    // Identifiers are joined onto the base, which only appends for a trailing slash
    if !url.path().ends_with('/') {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must end with '/'",
            config.base_url
        )));
    }

    if config.timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout must be >= 1s, got {}s",
            config.timeout
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates an article identifier
///
/// Identifiers are path segments under the fetch base URL, so they must be
/// non-empty and free of whitespace, `/`, `#` and `:` (namespaced pages).
pub fn validate_identifier(identifier: &str) -> Result<(), ConfigError> {
    if identifier.is_empty() {
        return Err(ConfigError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    if is_dot_segment(identifier) {
        return Err(ConfigError::InvalidIdentifier(format!(
            "'{}' is a path segment, not an article",
            identifier
        )));
    }

    if let Some(c) = identifier
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '/' | '#' | ':'))
    {
        return Err(ConfigError::InvalidIdentifier(format!(
            "'{}' contains invalid character {:?}",
            identifier, c
        )));
    }

    Ok(())
}
