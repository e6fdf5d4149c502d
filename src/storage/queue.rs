//! Serialized work queue
//!
//! [`WorkQueue`] is a cloneable handle onto a single storage owner. Every
//! operation is sent as a job over one channel and executed by a dedicated
//! blocking task strictly in issue order, each job running to completion
//! before the next one starts. Two concurrent claims can therefore never see
//! the same queued article, and no claim can interleave with a completion.

use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{Article, Graph, QueueCounts, RunRecord};
use crate::state::RunStatus;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce(&mut dyn Storage) + Send>;

/// Handle onto the storage actor
#[derive(Clone)]
pub struct WorkQueue {
    jobs: mpsc::UnboundedSender<Job>,
}

impl WorkQueue {
    /// Moves `storage` onto a dedicated blocking task and returns a handle
    ///
    /// The task stops once every handle has been dropped; the returned
    /// `JoinHandle` resolves at that point.
    pub fn spawn<S>(storage: S) -> (Self, JoinHandle<()>)
    where
        S: Storage + 'static,
    {
        let (jobs, mut receiver) = mpsc::unbounded_channel::<Job>();

        let handle = tokio::task::spawn_blocking(move || {
            let mut storage = storage;
            while let Some(job) = receiver.blocking_recv() {
                job(&mut storage);
            }
            tracing::debug!("Work queue closed");
        });

        (Self { jobs }, handle)
    }

    /// Runs `operation` against the store once every earlier job has finished
    async fn execute<T, F>(&self, operation: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Storage) -> StorageResult<T> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();

        let job: Job = Box::new(move |storage: &mut dyn Storage| {
            let result = operation(storage);
            if let Err(e) = &result {
                tracing::error!("Work queue operation failed: {}", e);
            }
            // The caller may have stopped waiting; the result is dropped then
            let _ = reply.send(result);
        });

        self.jobs.send(job).map_err(|_| StorageError::QueueClosed)?;
        response.await.map_err(|_| StorageError::QueueClosed)?
    }

    /// Registers every identifier not already known as queued
    pub async fn enqueue(&self, identifiers: Vec<String>) -> StorageResult<usize> {
        self.execute(move |storage| storage.enqueue(&identifiers))
            .await
    }

    /// Atomically claims up to `limit` queued articles
    pub async fn claim(&self, limit: usize) -> StorageResult<Vec<Article>> {
        self.execute(move |storage| storage.claim(limit)).await
    }

    /// Replaces the edges of a working article and marks it ready
    pub async fn complete(&self, identifier: String, targets: Vec<String>) -> StorageResult<()> {
        self.execute(move |storage| storage.complete(&identifier, &targets))
            .await
    }

    /// Moves every working article back to queued
    pub async fn recover_stale_work(&self) -> StorageResult<usize> {
        self.execute(|storage| storage.recover_stale_work()).await
    }

    pub async fn snapshot_graph(&self) -> StorageResult<Graph> {
        self.execute(|storage| storage.snapshot_graph()).await
    }

    pub async fn article(&self, identifier: String) -> StorageResult<Option<Article>> {
        self.execute(move |storage| storage.get_article(&identifier))
            .await
    }

    pub async fn ready_articles(&self) -> StorageResult<Vec<String>> {
        self.execute(|storage| storage.ready_articles()).await
    }

    pub async fn mappings_for(&self, identifier: String) -> StorageResult<Vec<String>> {
        self.execute(move |storage| storage.get_mappings(&identifier))
            .await
    }

    pub async fn counts(&self) -> StorageResult<QueueCounts> {
        self.execute(|storage| storage.count_articles()).await
    }

    /// Marks leftover running runs as interrupted and opens a new run
    pub async fn begin_run(&self, config_hash: String, recovered_articles: u64) -> StorageResult<i64> {
        self.execute(move |storage| {
            let interrupted = storage.interrupt_stale_runs()?;
            if interrupted > 0 {
                tracing::warn!("Marked {} unfinished run(s) as interrupted", interrupted);
            }
            storage.create_run(&config_hash, recovered_articles)
        })
        .await
    }

    pub async fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        started_batches: u64,
    ) -> StorageResult<()> {
        self.execute(move |storage| storage.finish_run(run_id, status, started_batches))
            .await
    }

    pub async fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.execute(|storage| storage.get_latest_run()).await
    }

    /// Article counts and the latest run, read in a single job
    pub async fn statistics(&self) -> StorageResult<(QueueCounts, Option<RunRecord>)> {
        self.execute(|storage| Ok((storage.count_articles()?, storage.get_latest_run()?)))
            .await
    }
}
