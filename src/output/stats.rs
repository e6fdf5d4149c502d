//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::ArticleState;
use crate::storage::{QueueCounts, RunRecord, WorkQueue};
use crate::RippleError;
use chrono::{DateTime, Utc};

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Article counts by state and number of edges
    pub counts: QueueCounts,

    /// Most recent run, if any run was ever started
    pub latest_run: Option<RunRecord>,

    /// Wall-clock duration of the latest run once it has finished
    pub duration_seconds: Option<i64>,
}

impl CrawlStatistics {
    /// Share of known articles that reached ready, in percent
    pub fn ready_percentage(&self) -> f64 {
        let total = self.counts.total_articles();
        if total == 0 {
            0.0
        } else {
            (self.counts.ready as f64 / total as f64) * 100.0
        }
    }

    /// Average number of outgoing edges per ready article
    pub fn average_out_degree(&self) -> f64 {
        if self.counts.ready == 0 {
            0.0
        } else {
            self.counts.mappings as f64 / self.counts.ready as f64
        }
    }
}

/// Loads statistics through the work queue
///
/// # Arguments
///
/// * `queue` - Handle onto the work queue to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(RippleError)` - Failed to query statistics
pub async fn load_statistics(queue: &WorkQueue) -> Result<CrawlStatistics, RippleError> {
    let (counts, latest_run) = queue.statistics().await?;
    let duration_seconds = latest_run.as_ref().and_then(run_duration);

    Ok(CrawlStatistics {
        counts,
        latest_run,
        duration_seconds,
    })
}

fn run_duration(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<DateTime<Utc>>().ok()?;
    let finished = run.finished_at.as_ref()?.parse::<DateTime<Utc>>().ok()?;
    Some((finished - started).num_seconds())
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total articles known: {}", stats.counts.total_articles());
    println!("  Total edges recorded: {}", stats.counts.mappings);
    println!("  Average out-degree: {:.2}", stats.average_out_degree());
    println!();

    println!("Articles by State:");
    for state in ArticleState::all_states() {
        let count = stats.counts.for_state(state);
        let percentage = if stats.counts.total_articles() > 0 {
            (count as f64 / stats.counts.total_articles() as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  Id: {}", run.id);
            println!("  Status: {}", run.status);
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            if let Some(seconds) = stats.duration_seconds {
                println!("  Duration: {}s", seconds);
            }
            println!("  Batches started: {}", run.started_batches);
            println!("  Articles recovered at startup: {}", run.recovered_articles);
            println!("  Config hash: {}", run.config_hash);
        }
        None => println!("No crawl runs recorded yet"),
    }
    println!();

    if stats.counts.working > 0 {
        println!(
            "Note: {} article(s) are still working; they are requeued on the next crawl start",
            stats.counts.working
        );
    }

    println!(
        "Completion: {:.1}% ({} / {} articles ready)",
        stats.ready_percentage(),
        stats.counts.ready,
        stats.counts.total_articles()
    );
}
