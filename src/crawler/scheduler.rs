//! Crawl scheduler keeping the worker pool full
//!
//! This module handles:
//! - Claiming batches from the work queue and handing them to workers
//! - Bounding the number of running workers and the total batch budget
//! - Applying worker results to the queue as they stream in
//! - Reclaiming pool slots when workers exit, cleanly or not
//!
//! The scheduler is a single control loop driven by [`WorkerEvent`]s read
//! from one channel. Each event is handled to completion before the next is
//! read, so a fill pass never overlaps with another one.

use crate::config::CrawlerConfig;
use crate::crawler::worker::{WorkerEvent, WorkerId, WorkerLauncher, WorkerMessage};
use crate::storage::WorkQueue;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Completed articles between two progress log lines
const PROGRESS_INTERVAL: u64 = 25;

/// Limits applied by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_concurrent_workers: usize,
    /// Total batches this run may start; `None` is unbounded
    pub max_batches: Option<u64>,
    pub batch_size: usize,
}

impl From<&CrawlerConfig> for SchedulerConfig {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_concurrent_workers: config.max_concurrent_workers,
            max_batches: config.max_batches,
            batch_size: config.batch_size,
        }
    }
}

/// Why the scheduler stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No queued article was left once every worker had exited
    QueueDrained,
    /// The batch budget was used up
    BatchBudgetExhausted,
    /// The work queue rejected a claim
    StorageUnavailable,
    /// A claimed batch could not be handed to a worker
    LaunchFailed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::QueueDrained => "queue drained",
            Self::BatchBudgetExhausted => "batch budget exhausted",
            Self::StorageUnavailable => "storage unavailable",
            Self::LaunchFailed => "worker launch failed",
        };
        f.write_str(text)
    }
}

/// Counters of a finished scheduler run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub started_batches: u64,
    pub completed_articles: u64,
    pub failed_fetches: u64,
    pub crashed_workers: u64,
    pub stop_reason: StopReason,
}

/// Result of one fill pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillOutcome {
    /// Every worker slot is taken
    Saturated,
    /// A claim came back empty
    Drained,
    BudgetExhausted,
    StorageFailed,
    LaunchFailed,
}

impl FillOutcome {
    fn stop_reason(self) -> StopReason {
        match self {
            Self::Saturated | Self::Drained => StopReason::QueueDrained,
            Self::BudgetExhausted => StopReason::BatchBudgetExhausted,
            Self::StorageFailed => StopReason::StorageUnavailable,
            Self::LaunchFailed => StopReason::LaunchFailed,
        }
    }
}

/// Event-driven crawl scheduler
pub struct CrawlScheduler {
    queue: WorkQueue,
    launcher: Arc<dyn WorkerLauncher>,
    config: SchedulerConfig,

    /// Running workers and the identifiers of their batch still awaiting a result
    pool: HashMap<WorkerId, HashSet<String>>,

    next_worker: u64,
    started_batches: u64,
    completed_articles: u64,
    failed_fetches: u64,
    crashed_workers: u64,

    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl CrawlScheduler {
    /// Creates a scheduler with an empty pool
    ///
    /// # Arguments
    ///
    /// * `queue` - Handle onto the work queue
    /// * `launcher` - Starts one worker per claimed batch
    /// * `config` - Concurrency cap, batch budget and batch size
    pub fn new(queue: WorkQueue, launcher: Arc<dyn WorkerLauncher>, config: SchedulerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            queue,
            launcher,
            config,
            pool: HashMap::new(),
            next_worker: 0,
            started_batches: 0,
            completed_articles: 0,
            failed_fetches: 0,
            crashed_workers: 0,
            events_tx,
            events_rx,
        }
    }

    /// Runs the control loop until the pool is empty and no more work can start
    pub async fn run(mut self) -> CrawlSummary {
        tracing::info!(
            "Scheduler starting: {} worker(s), batch size {}, batch budget {}",
            self.config.max_concurrent_workers,
            self.config.batch_size,
            self.config
                .max_batches
                .map(|limit| limit.to_string())
                .unwrap_or_else(|| "unbounded".to_string())
        );

        let mut outcome = self.fill_pool().await;

        while !self.pool.is_empty() {
            // The scheduler owns a sender, so the channel never closes here
            let Some(event) = self.events_rx.recv().await else {
                break;
            };

            if let Some(next) = self.handle_event(event).await {
                outcome = next;
            }
        }

        let summary = CrawlSummary {
            started_batches: self.started_batches,
            completed_articles: self.completed_articles,
            failed_fetches: self.failed_fetches,
            crashed_workers: self.crashed_workers,
            stop_reason: outcome.stop_reason(),
        };

        tracing::info!(
            "Scheduler stopped ({}): {} batches started, {} articles completed, {} fetch errors, {} crashed workers",
            summary.stop_reason,
            summary.started_batches,
            summary.completed_articles,
            summary.failed_fetches,
            summary.crashed_workers
        );

        summary
    }

    /// Starts workers until the pool is full, the budget is spent or no work is left
    async fn fill_pool(&mut self) -> FillOutcome {
        while self.pool.len() < self.config.max_concurrent_workers {
            if self.budget_exhausted() {
                tracing::debug!("Batch budget of {} reached", self.started_batches);
                return FillOutcome::BudgetExhausted;
            }

            let batch = match self.queue.claim(self.config.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!("Failed to claim a batch: {}", e);
                    return FillOutcome::StorageFailed;
                }
            };

            if batch.is_empty() {
                return FillOutcome::Drained;
            }

            let worker = WorkerId(self.next_worker);
            self.next_worker += 1;
            self.started_batches += 1;

            let identifiers: Vec<String> = batch.into_iter().map(|article| article.identifier).collect();
            tracing::debug!("Starting {} for {} article(s)", worker, identifiers.len());

            let pending: HashSet<String> = identifiers.iter().cloned().collect();
            if let Err(e) = self.launcher.launch(worker, identifiers, self.events_tx.clone()) {
                self.crashed_workers += 1;
                tracing::error!(
                    "Failed to launch {}: {}; {} article(s) stay working until the next restart",
                    worker,
                    e,
                    pending.len()
                );
                return FillOutcome::LaunchFailed;
            }

            self.pool.insert(worker, pending);
        }

        FillOutcome::Saturated
    }

    fn budget_exhausted(&self) -> bool {
        self.config
            .max_batches
            .is_some_and(|limit| self.started_batches >= limit)
    }

    /// Applies one event; returns the outcome of a fill pass if one ran
    async fn handle_event(&mut self, event: WorkerEvent) -> Option<FillOutcome> {
        match event {
            WorkerEvent::Message { worker, message } => {
                let claimed = self
                    .pool
                    .get_mut(&worker)
                    .is_some_and(|pending| pending.remove(message.identifier()));
                if !claimed {
                    tracing::warn!(
                        "Ignoring result for {} from {}: not part of its batch",
                        message.identifier(),
                        worker
                    );
                    return None;
                }

                self.handle_message(message).await
            }
            WorkerEvent::Exited { worker, code } => {
                let stalled = self.pool.remove(&worker).map_or(0, |pending| pending.len());

                match code {
                    Some(0) if stalled == 0 => tracing::debug!("{} finished", worker),
                    Some(0) => tracing::warn!(
                        "{} exited without reporting {} article(s); they stay working",
                        worker,
                        stalled
                    ),
                    _ => {
                        self.crashed_workers += 1;
                        tracing::error!(
                            "{} failed with exit code {:?}; {} article(s) stay working until the next restart",
                            worker,
                            code,
                            stalled
                        );
                    }
                }

                Some(self.fill_pool().await)
            }
        }
    }

    async fn handle_message(&mut self, message: WorkerMessage) -> Option<FillOutcome> {
        match message {
            WorkerMessage::Update { identifier, links } => {
                let discovered = !links.is_empty();
                let link_count = links.len();

                if let Err(e) = self.queue.complete(identifier.clone(), links).await {
                    tracing::error!("Failed to complete {}: {}", identifier, e);
                    return None;
                }

                self.completed_articles += 1;
                tracing::debug!("Completed {} with {} link(s)", identifier, link_count);
                if self.completed_articles % PROGRESS_INTERVAL == 0 {
                    tracing::info!(
                        "Progress: {} articles completed, {} workers running, {} batches started",
                        self.completed_articles,
                        self.pool.len(),
                        self.started_batches
                    );
                }

                if discovered {
                    Some(self.fill_pool().await)
                } else {
                    None
                }
            }
            WorkerMessage::Error { identifier, cause } => {
                self.failed_fetches += 1;
                tracing::warn!("Fetch failed for {}: {}", identifier, cause);
                None
            }
        }
    }
}
