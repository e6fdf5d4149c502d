//! Wiki-Ripple main entry point
//!
//! This is the command-line interface for the Wiki-Ripple link-graph crawler.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use wiki_ripple::config::{load_config_with_hash, validate_identifier, Config, FetchConfig};
use wiki_ripple::crawler::{crawl, run_batch, write_message, StopReason, Verbosity, WikiFetcher};
use wiki_ripple::output::{export_graph, load_statistics, print_statistics, write_graph_json};
use wiki_ripple::storage::{SqliteStorage, WorkQueue};

/// Wiki-Ripple: a crash-recoverable encyclopedia link-graph crawler
///
/// Wiki-Ripple starts from a seed article, records every article link it
/// finds as a graph edge in SQLite and keeps following newly discovered
/// articles. Interrupted crawls pick up where they left off.
#[derive(Parser, Debug)]
#[command(name = "wiki-ripple")]
#[command(version)]
#[command(about = "A crash-recoverable encyclopedia link-graph crawler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run or resume a crawl
    Crawl {
        /// Path to TOML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Start from this article instead of the configured seed
        #[arg(long, value_name = "ID")]
        seed: Option<String>,
    },

    /// Validate the configuration and show what would be crawled
    Check {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Show statistics from the database
    Stats {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Write the link graph as JSON
    ExportGraph {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Destination JSON file
        #[arg(value_name = "OUT")]
        output: PathBuf,
    },

    /// Fetch one batch and stream results to stdout (started by the crawler)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        base_url: String,

        /// Milliseconds between two fetches
        #[arg(long, default_value_t = 50)]
        request_delay: u64,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        #[arg(long)]
        user_agent: String,

        /// Article identifiers of the batch
        #[arg(last = true, required = true)]
        identifiers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; a worker's stdout carries its results
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Crawl { config, seed } => {
            let verbosity = Verbosity {
                verbose: cli.verbose,
                quiet: cli.quiet,
            };
            handle_crawl(&config, seed, verbosity).await
        }
        Command::Check { config } => handle_check(&config),
        Command::Stats { config } => handle_stats(&config).await,
        Command::ExportGraph { config, output } => handle_export_graph(&config, &output).await,
        Command::Worker {
            base_url,
            request_delay,
            timeout,
            user_agent,
            identifiers,
        } => {
            let fetch = FetchConfig {
                base_url,
                request_delay,
                timeout,
                user_agent,
            };
            handle_worker(&fetch, &identifiers).await
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wiki_ripple=info,warn"),
            1 => EnvFilter::new("wiki_ripple=debug,info"),
            2 => EnvFilter::new("wiki_ripple=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(path: &Path) -> anyhow::Result<(Config, String)> {
    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok((config, hash))
}

/// Handles `check`: validates config and shows what would be crawled
fn handle_check(path: &Path) -> anyhow::Result<()> {
    let (config, hash) = load(path)?;

    println!("=== Wiki-Ripple Configuration Check ===\n");

    println!("Crawler:");
    println!("  Seed article: {}", config.crawler.seed);
    println!(
        "  Max concurrent workers: {}",
        config.crawler.max_concurrent_workers
    );
    match config.crawler.max_batches {
        Some(limit) => println!("  Max batches: {}", limit),
        None => println!("  Max batches: unbounded"),
    }
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Isolation: {:?}", config.crawler.isolation);

    println!("\nFetch:");
    println!("  Base URL: {}", config.fetch.base_url);
    println!("  Request delay: {}ms", config.fetch.request_delay);
    println!("  Timeout: {}s", config.fetch.timeout);
    println!("  User agent: {}", config.fetch.user_agent);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path.display());

    println!("\n✓ Configuration is valid (hash: {})", hash);
    println!(
        "✓ Would start crawling from {}{}",
        config.fetch.base_url, config.crawler.seed
    );

    Ok(())
}

/// Starts a work queue over a database a previous crawl created
fn open_queue(database: &Path) -> anyhow::Result<(WorkQueue, JoinHandle<()>)> {
    let storage = SqliteStorage::open_existing(database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;
    Ok(WorkQueue::spawn(storage))
}

/// Handles `stats`: shows statistics from the database
async fn handle_stats(path: &Path) -> anyhow::Result<()> {
    let (config, _) = load(path)?;
    let database = &config.storage.database_path;

    let (queue, queue_task) = open_queue(database)?;
    let stats = load_statistics(&queue).await;
    drop(queue);
    queue_task.await?;
    let stats = stats?;

    println!("Database: {}\n", database.display());
    print_statistics(&stats);

    Ok(())
}

/// Handles `export-graph`: writes the recorded edges as JSON
async fn handle_export_graph(path: &Path, output: &Path) -> anyhow::Result<()> {
    let (config, _) = load(path)?;

    let (queue, queue_task) = open_queue(&config.storage.database_path)?;
    let export = export_graph(&queue).await;
    drop(queue);
    queue_task.await?;
    let export = export?;

    write_graph_json(&export, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "✓ Exported {} edges from {} articles to: {}",
        export.edge_count,
        export.graph.len(),
        output.display()
    );

    Ok(())
}

/// Handles `crawl`: runs the orchestrator until no more work can start
async fn handle_crawl(path: &Path, seed: Option<String>, verbosity: Verbosity) -> anyhow::Result<()> {
    let (mut config, hash) = load(path)?;

    if let Some(seed) = seed {
        validate_identifier(&seed)?;
        config.crawler.seed = seed;
    }

    tracing::info!(
        "Seed: {}, workers: {}, batch size: {}, database: {}",
        config.crawler.seed,
        config.crawler.max_concurrent_workers,
        config.crawler.batch_size,
        config.storage.database_path.display()
    );

    let summary = match crawl(config, &hash, verbosity).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    match summary.stop_reason {
        StopReason::QueueDrained | StopReason::BatchBudgetExhausted => {
            tracing::info!("Crawl finished: {}", summary.stop_reason);
            Ok(())
        }
        reason => anyhow::bail!("Crawl stopped early: {}", reason),
    }
}

/// Handles the hidden `worker` subcommand: one batch, one JSON line per article
async fn handle_worker(fetch: &FetchConfig, identifiers: &[String]) -> anyhow::Result<()> {
    let fetcher = WikiFetcher::new(fetch)?;
    let stdout = std::io::stdout();

    let report = run_batch(
        &fetcher,
        identifiers,
        fetch.request_delay(),
        |message| write_message(&mut stdout.lock(), &message),
    )
    .await
    .context("Failed to write worker results")?;

    tracing::debug!(
        "Batch done: {} updates, {} errors",
        report.updates,
        report.errors
    );
    Ok(())
}
