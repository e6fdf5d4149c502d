//! Fetch workers and the worker-to-scheduler protocol
//!
//! A worker receives one batch of article identifiers, fetches them one
//! after another and reports a [`WorkerMessage`] per article as soon as it is
//! known. Its termination is reported separately as [`WorkerEvent::Exited`].
//!
//! Two launchers exist:
//! - [`ProcessLauncher`] re-executes the current binary as `worker` and reads
//!   JSON lines from its stdout, so a crash or hang inside fetching cannot
//!   touch orchestrator state
//! - [`TaskLauncher`] runs the batch as a tokio task in-process

use crate::config::FetchConfig;
use crate::crawler::fetcher::LinkFetcher;
use crate::RippleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Exit code reported for an in-process worker that panicked
pub const PANIC_EXIT_CODE: i32 = 101;

/// Identifies one worker (and therefore one batch) within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Per-article result reported by a worker
///
/// Serialized as one JSON object per line, e.g.
/// `{"type":"update","data":{"identifier":"A","links":["B"]}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// The article was fetched; `links` may be empty
    Update {
        identifier: String,
        links: Vec<String>,
    },
    /// The fetch failed; the article is left as it is
    Error { identifier: String, cause: String },
}

impl WorkerMessage {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Update { identifier, .. } | Self::Error { identifier, .. } => identifier,
        }
    }

    /// Encodes the message as a single protocol line (without the newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a single protocol line
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

/// Lifecycle events delivered to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Message {
        worker: WorkerId,
        message: WorkerMessage,
    },
    /// The worker terminated; `None` when no exit code is available
    Exited {
        worker: WorkerId,
        code: Option<i32>,
    },
}

/// Outcome counters of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub updates: usize,
    pub errors: usize,
}

/// Fetches every identifier of a batch in order and emits one message each
///
/// A failed fetch is reported as [`WorkerMessage::Error`] and processing
/// continues with the next identifier. `delay` is slept between two
/// successive fetches. Only a failure of `emit` aborts the batch.
pub async fn run_batch<F>(
    fetcher: &dyn LinkFetcher,
    identifiers: &[String],
    delay: Duration,
    mut emit: F,
) -> Result<BatchReport, RippleError>
where
    F: FnMut(WorkerMessage) -> Result<(), RippleError>,
{
    let mut report = BatchReport::default();

    for (index, identifier) in identifiers.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let message = match fetcher.fetch_links(identifier).await {
            Ok(links) => {
                report.updates += 1;
                WorkerMessage::Update {
                    identifier: identifier.clone(),
                    links,
                }
            }
            Err(e) => {
                report.errors += 1;
                WorkerMessage::Error {
                    identifier: identifier.clone(),
                    cause: e.to_string(),
                }
            }
        };

        emit(message)?;
    }

    Ok(report)
}

/// Writes one protocol line and flushes so the reader sees it immediately
pub fn write_message<W: Write>(out: &mut W, message: &WorkerMessage) -> Result<(), RippleError> {
    let line = message.to_line()?;
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

/// Starts workers for claimed batches
///
/// `launch` must return promptly; the batch itself runs in the background
/// and reports through `events`, ending with exactly one
/// [`WorkerEvent::Exited`] for `worker`.
pub trait WorkerLauncher: Send + Sync {
    fn launch(
        &self,
        worker: WorkerId,
        batch: Vec<String>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<(), RippleError>;
}

/// Logging verbosity selected on the command line
///
/// Worker processes get the same flags as the crawl that started them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity {
    pub verbose: u8,
    pub quiet: bool,
}

impl Verbosity {
    /// Flags reproducing this verbosity, empty for the default level
    pub fn to_args(self) -> Vec<String> {
        if self.quiet {
            vec!["-q".to_string()]
        } else if self.verbose > 0 {
            vec![format!("-{}", "v".repeat(self.verbose as usize))]
        } else {
            Vec::new()
        }
    }
}

/// Runs each batch in a child process of `program`
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    fetch: FetchConfig,
    verbosity: Verbosity,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf, fetch: FetchConfig) -> Self {
        Self {
            program,
            fetch,
            verbosity: Verbosity::default(),
        }
    }

    /// Passes `verbosity` on to every worker process
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Launcher that re-executes the running binary
    pub fn current_exe(fetch: FetchConfig) -> Result<Self, RippleError> {
        Ok(Self::new(std::env::current_exe()?, fetch))
    }

    /// Command line arguments of the `worker` subcommand for `batch`
    pub fn worker_args(&self, batch: &[String]) -> Vec<String> {
        let mut args = vec![
            "worker".to_string(),
            "--base-url".to_string(),
            self.fetch.base_url.clone(),
            "--request-delay".to_string(),
            self.fetch.request_delay.to_string(),
            "--timeout".to_string(),
            self.fetch.timeout.to_string(),
            "--user-agent".to_string(),
            self.fetch.user_agent.clone(),
        ];
        args.extend(self.verbosity.to_args());
        args.push("--".to_string());
        args.extend(batch.iter().cloned());
        args
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        worker: WorkerId,
        batch: Vec<String>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<(), RippleError> {
        let mut child = Command::new(&self.program)
            .args(self.worker_args(&batch))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RippleError::Worker(format!("{} has no stdout pipe", worker)))?;

        tracing::debug!("Spawned {} (pid {:?})", worker, child.id());

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match WorkerMessage::from_line(&line) {
                        Ok(message) => {
                            if events.send(WorkerEvent::Message { worker, message }).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("{} sent an unreadable line ({}): {}", worker, e, line);
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Failed to read output of {}: {}", worker, e);
                        break;
                    }
                }
            }

            // A child blocked on a full pipe only exits once the read end is gone
            drop(lines);

            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::error!("Failed to wait for {}: {}", worker, e);
                    None
                }
            };
            let _ = events.send(WorkerEvent::Exited { worker, code });
        });

        Ok(())
    }
}

/// Runs each batch as a tokio task inside the current process
#[derive(Clone)]
pub struct TaskLauncher {
    fetcher: Arc<dyn LinkFetcher>,
    delay: Duration,
}

impl TaskLauncher {
    pub fn new(fetcher: Arc<dyn LinkFetcher>, delay: Duration) -> Self {
        Self { fetcher, delay }
    }
}

impl WorkerLauncher for TaskLauncher {
    fn launch(
        &self,
        worker: WorkerId,
        batch: Vec<String>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<(), RippleError> {
        let fetcher = Arc::clone(&self.fetcher);
        let delay = self.delay;
        let messages = events.clone();

        let task = tokio::spawn(async move {
            run_batch(fetcher.as_ref(), &batch, delay, |message| {
                messages
                    .send(WorkerEvent::Message { worker, message })
                    .map_err(|_| RippleError::Worker("scheduler stopped listening".to_string()))
            })
            .await
        });

        tokio::spawn(async move {
            let code = match task.await {
                Ok(Ok(_)) => Some(0),
                Ok(Err(e)) => {
                    tracing::warn!("{} aborted: {}", worker, e);
                    Some(1)
                }
                Err(e) if e.is_panic() => Some(PANIC_EXIT_CODE),
                Err(_) => None,
            };
            let _ = events.send(WorkerEvent::Exited { worker, code });
        });

        Ok(())
    }
}
