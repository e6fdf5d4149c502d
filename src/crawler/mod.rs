//! Crawler module for article fetching and crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and article link extraction
//! - Fetch workers and their line-based result protocol
//! - Batch scheduling under a concurrency cap and batch budget
//! - Startup sequencing of a crawl run

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod worker;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{build_http_client, FetchError, LinkFetcher, WikiFetcher};
pub use parser::extract_article_links;
pub(crate) use parser::is_dot_segment;
pub use scheduler::{CrawlScheduler, CrawlSummary, SchedulerConfig, StopReason};
pub use worker::{
    run_batch, write_message, BatchReport, ProcessLauncher, TaskLauncher, Verbosity, WorkerEvent,
    WorkerId, WorkerLauncher, WorkerMessage, PANIC_EXIT_CODE,
};

use crate::config::Config;
use crate::RippleError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the store and recover articles left working
/// 2. Record a new run and enqueue the seed article
/// 3. Start fetch workers for claimed batches
/// 4. Apply their results until no more work can start
/// 5. Record how the run ended
///
/// # Arguments
///
/// * `config` - The validated crawler configuration
/// * `config_hash` - Hash of the config file, stored with the run
/// * `verbosity` - Logging flags handed to worker processes
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Counters and stop reason of the run
/// * `Err(RippleError)` - Startup or run bookkeeping failed
pub async fn crawl(
    config: Config,
    config_hash: &str,
    verbosity: Verbosity,
) -> Result<CrawlSummary, RippleError> {
    run_crawl(config, config_hash, verbosity).await
}
