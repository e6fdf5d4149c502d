//! Crawl coordinator - startup sequencing and wiring
//!
//! The coordinator owns no crawl logic of its own. It:
//! - Opens the store and starts the work queue
//! - Recovers articles left working by an unclean shutdown
//! - Records the run and enqueues the seed article
//! - Picks the worker launcher and hands control to the scheduler
//! - Records how the run ended

use crate::config::{Config, Isolation};
use crate::crawler::fetcher::WikiFetcher;
use crate::crawler::scheduler::{CrawlScheduler, CrawlSummary, SchedulerConfig, StopReason};
use crate::crawler::worker::{ProcessLauncher, TaskLauncher, Verbosity, WorkerLauncher};
use crate::state::RunStatus;
use crate::storage::{SqliteStorage, WorkQueue};
use crate::RippleError;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    queue: WorkQueue,
    queue_task: JoinHandle<()>,
    launcher: Arc<dyn WorkerLauncher>,
    run_id: i64,
    recovered: usize,
}

impl Coordinator {
    /// Creates a coordinator using the launcher selected by `crawler.isolation`
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `config_hash` - Hash of the config file, recorded with the run
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Store opened, stale work recovered and seed enqueued
    /// * `Err(RippleError)` - Failed to initialize
    pub async fn new(config: Config, config_hash: &str) -> Result<Self, RippleError> {
        let launcher = build_launcher(&config, Verbosity::default())?;
        Self::with_launcher(config, config_hash, launcher).await
    }

    /// Creates a coordinator with an explicit worker launcher
    pub async fn with_launcher(
        config: Config,
        config_hash: &str,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Self, RippleError> {
        let storage = SqliteStorage::new(&config.storage.database_path)?;
        let (queue, queue_task) = WorkQueue::spawn(storage);

        // Must precede every other queue operation of this process
        let recovered = queue.recover_stale_work().await?;
        if recovered > 0 {
            tracing::warn!(
                "Recovered {} article(s) left working by a previous run",
                recovered
            );
        }

        let run_id = queue
            .begin_run(config_hash.to_string(), recovered as u64)
            .await?;

        let seed = config.crawler.seed.clone();
        if queue.enqueue(vec![seed.clone()]).await? > 0 {
            tracing::info!("Seeded queue with {}", seed);
        } else {
            tracing::info!("Seed {} is already known, resuming", seed);
        }

        Ok(Self {
            config: Arc::new(config),
            queue,
            queue_task,
            launcher,
            run_id,
            recovered,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Number of articles moved back to queued at startup
    pub fn recovered_articles(&self) -> usize {
        self.recovered
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Runs the scheduler to completion and records the outcome of the run
    ///
    /// Returns once the work queue has shut down, so clones of
    /// [`Coordinator::queue`] must not outlive this call.
    pub async fn run(self) -> Result<CrawlSummary, RippleError> {
        tracing::info!("Starting crawl run {}", self.run_id);
        let start_time = std::time::Instant::now();

        let scheduler = CrawlScheduler::new(
            self.queue.clone(),
            Arc::clone(&self.launcher),
            SchedulerConfig::from(&self.config.crawler),
        );
        let summary = scheduler.run().await;

        let status = run_status(summary.stop_reason);
        self.queue
            .finish_run(self.run_id, status, summary.started_batches)
            .await?;

        let counts = self.queue.counts().await?;
        tracing::info!(
            "Crawl run {} finished as {} in {:?}: {} ready, {} queued, {} working, {} edges",
            self.run_id,
            status,
            start_time.elapsed(),
            counts.ready,
            counts.queued,
            counts.working,
            counts.mappings
        );

        // Dropping the last handle stops the queue task and closes the database
        drop(self.queue);
        if let Err(e) = self.queue_task.await {
            tracing::error!("Work queue task ended abnormally: {}", e);
        }

        Ok(summary)
    }
}

fn run_status(reason: StopReason) -> RunStatus {
    match reason {
        StopReason::QueueDrained => RunStatus::Completed,
        StopReason::BatchBudgetExhausted => RunStatus::BudgetExhausted,
        StopReason::StorageUnavailable | StopReason::LaunchFailed => RunStatus::Failed,
    }
}

/// Builds the launcher matching the configured isolation
fn build_launcher(
    config: &Config,
    verbosity: Verbosity,
) -> Result<Arc<dyn WorkerLauncher>, RippleError> {
    let launcher: Arc<dyn WorkerLauncher> = match config.crawler.isolation {
        Isolation::Process => Arc::new(
            ProcessLauncher::current_exe(config.fetch.clone())?.with_verbosity(verbosity),
        ),
        Isolation::Task => {
            let fetcher = WikiFetcher::new(&config.fetch)?;
            Arc::new(TaskLauncher::new(
                Arc::new(fetcher),
                config.fetch.request_delay(),
            ))
        }
    };

    tracing::debug!("Using {:?} worker isolation", config.crawler.isolation);
    Ok(launcher)
}

/// Runs a complete crawl
///
/// Opens the store, recovers stale work, seeds the queue and schedules
/// workers until the queue is drained or the batch budget is spent. Worker
/// processes log at `verbosity`.
///
/// # Example
///
/// ```no_run
/// use wiki_ripple::config::load_config_with_hash;
/// use wiki_ripple::crawler::{run_crawl, Verbosity};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let summary = run_crawl(config, &hash, Verbosity::default()).await?;
/// println!("{} batches started", summary.started_batches);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    verbosity: Verbosity,
) -> Result<CrawlSummary, RippleError> {
    let launcher = build_launcher(&config, verbosity)?;
    let coordinator = Coordinator::with_launcher(config, config_hash, launcher).await?;
    coordinator.run().await
}
