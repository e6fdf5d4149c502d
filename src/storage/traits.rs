//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{ArticleState, RunStatus};
use crate::storage::{Article, Graph, QueueCounts, RunRecord};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Article '{identifier}' is not working (state: {state:?})")]
    NotWorking {
        identifier: String,
        state: Option<ArticleState>,
    },

    #[error("Invalid article state value in database: {0}")]
    InvalidState(i64),

    #[error("Invalid run status in database: '{0}'")]
    InvalidRunStatus(String),

    #[error("Database not found: {}", .0.display())]
    DatabaseNotFound(PathBuf),

    #[error("Work queue is closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Implementations are not required to be thread-safe: the [`WorkQueue`]
/// actor owns exactly one backend and drives it from a single thread.
///
/// [`WorkQueue`]: crate::storage::WorkQueue
pub trait Storage: Send {
    // ===== Work Queue =====

    /// Registers every identifier not already known in the `Queued` state
    ///
    /// Known identifiers are left untouched whatever their state.
    ///
    /// # Returns
    ///
    /// The number of newly registered articles
    fn enqueue(&mut self, identifiers: &[String]) -> StorageResult<usize>;

    /// Moves up to `limit` queued articles to `Working` and returns them
    ///
    /// An empty result means no work is available right now.
    fn claim(&mut self, limit: usize) -> StorageResult<Vec<Article>>;

    /// Replaces the outgoing edges of a working article and marks it `Ready`
    ///
    /// Targets that are not yet known are registered as `Queued`. Fails with
    /// [`StorageError::NotWorking`] and changes nothing if `identifier` is not
    /// currently `Working`.
    fn complete(&mut self, identifier: &str, targets: &[String]) -> StorageResult<()>;

    /// Moves every `Working` article back to `Queued`
    ///
    /// # Returns
    ///
    /// The number of recovered articles
    fn recover_stale_work(&mut self) -> StorageResult<usize>;

    // ===== Graph Reads =====

    /// Aggregates all edges into a `source -> [targets]` map
    fn snapshot_graph(&self) -> StorageResult<Graph>;

    /// Gets an article by identifier
    fn get_article(&self, identifier: &str) -> StorageResult<Option<Article>>;

    /// Gets the identifiers of all `Ready` articles
    fn ready_articles(&self) -> StorageResult<Vec<String>>;

    /// Gets the outgoing edge targets of an article
    fn get_mappings(&self, identifier: &str) -> StorageResult<Vec<String>>;

    // ===== Statistics =====

    /// Counts articles by state along with the total number of edges
    fn count_articles(&self) -> StorageResult<QueueCounts>;

    // ===== Run Management =====

    /// Marks every run still recorded as running as interrupted
    fn interrupt_stale_runs(&mut self) -> StorageResult<usize>;

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    /// * `recovered_articles` - How many articles stale-work recovery reset
    fn create_run(&mut self, config_hash: &str, recovered_articles: u64) -> StorageResult<i64>;

    /// Records the final status of a run with a finish timestamp
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        started_batches: u64,
    ) -> StorageResult<()>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;
}
