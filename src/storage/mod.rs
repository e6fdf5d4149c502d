//! Storage module for persisting crawl data
//!
//! This module handles all durable state of the crawler:
//! - SQLite database initialization and schema management
//! - Article lifecycle (queued, working, ready) and link edges
//! - Serialized access through the [`WorkQueue`] actor
//! - Run tracking across restarts

mod queue;
mod schema;
mod sqlite;
mod traits;

pub use queue::WorkQueue;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{ArticleState, RunStatus};
use std::collections::BTreeMap;

/// Read-only projection of every recorded edge, keyed by source identifier
pub type Graph = BTreeMap<String, Vec<String>>;

/// Represents an article in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: i64,
    pub identifier: String,
    pub state: ArticleState,
    pub discovered_at: String,
    pub updated_at: String,
}

/// Article counts by state plus the number of recorded edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub queued: u64,
    pub working: u64,
    pub ready: u64,
    pub mappings: u64,
}

impl QueueCounts {
    pub fn total_articles(&self) -> u64 {
        self.queued + self.working + self.ready
    }

    pub fn for_state(&self, state: ArticleState) -> u64 {
        match state {
            ArticleState::Queued => self.queued,
            ArticleState::Working => self.working,
            ArticleState::Ready => self.ready,
        }
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub recovered_articles: u64,
    pub started_batches: u64,
}
