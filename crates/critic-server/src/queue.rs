//! Bounded review queue drained by a fixed pool of worker tasks.
//!
//! Every job gets a `watch` cancellation flag. Cancelling a queued job makes
//! the worker skip it. A running job sees the flag at its next stage boundary
//! and stops before posting anything; once posting has started it finishes.
//! Only the most recent `retain` finished jobs stay queryable.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use critic_core::{CriticConfig, CriticError, PullRequestRef};
use critic_review::demo::DemoReviewer;
use critic_review::github::GitHubClient;
use critic_review::host::PullRequestHost;
use critic_review::llm::OllamaClient;
use critic_review::pipeline::{ReviewPipeline, ReviewStage};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::AppError;

/// One submitted review.
#[derive(Debug, Clone)]
pub struct ReviewJob {
    pub id: String,
    pub pr: PullRequestRef,
    pub token: String,
    pub use_demo: bool,
}

/// Lifecycle of a queued review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub error: Option<String>,
}

/// Executes one review job.
///
/// Implementations check `cancel` between steps and return
/// [`CriticError::Cancelled`] if they stopped because of it.
#[async_trait]
pub trait ReviewRunner: Send + Sync {
    async fn run(
        &self,
        job: &ReviewJob,
        cancel: watch::Receiver<bool>,
    ) -> Result<(), CriticError>;
}

/// Runs jobs against GitHub and the configured backend, with fresh clients
/// per job.
pub struct PipelineRunner {
    config: Arc<CriticConfig>,
}

impl PipelineRunner {
    pub fn new(config: Arc<CriticConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReviewRunner for PipelineRunner {
    async fn run(
        &self,
        job: &ReviewJob,
        cancel: watch::Receiver<bool>,
    ) -> Result<(), CriticError> {
        let host: Arc<dyn PullRequestHost> =
            Arc::new(GitHubClient::new(&job.token, &self.config.github.api_base)?);

        if job.use_demo {
            if *cancel.borrow() {
                return Err(CriticError::Cancelled);
            }
            DemoReviewer::new(host).run(&job.pr, false).await?;
            return Ok(());
        }

        let backend = Arc::new(OllamaClient::new(&self.config.backend)?);
        let outcome = ReviewPipeline::new(host, backend, self.config.limits)
            .with_cancellation(cancel)
            .run(&job.pr)
            .await;
        match outcome.stage {
            ReviewStage::Done => Ok(()),
            ReviewStage::Cancelled => Err(CriticError::Cancelled),
            _ => Err(CriticError::Review(outcome.error.unwrap_or_default())),
        }
    }
}

struct JobEntry {
    status: JobStatus,
    error: Option<String>,
    cancel: watch::Sender<bool>,
}

struct QueuedJob {
    job: ReviewJob,
    cancel: watch::Receiver<bool>,
}

struct JobTable {
    entries: HashMap<String, JobEntry>,
    /// Finished job ids, oldest first.
    finished: VecDeque<String>,
    retain: usize,
}

impl JobTable {
    fn new(retain: usize) -> Self {
        Self {
            entries: HashMap::new(),
            finished: VecDeque::new(),
            retain: retain.max(1),
        }
    }

    /// Record that `id` reached a terminal status and evict the oldest
    /// finished jobs beyond the retention limit.
    fn finish(&mut self, id: &str) {
        self.finished.push_back(id.to_string());
        while self.finished.len() > self.retain {
            if let Some(oldest) = self.finished.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

type Jobs = Arc<Mutex<JobTable>>;

fn lock(jobs: &Jobs) -> MutexGuard<'_, JobTable> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle for submitting, inspecting and cancelling review jobs.
#[derive(Clone)]
pub struct ReviewQueue {
    sender: mpsc::Sender<QueuedJob>,
    jobs: Jobs,
    seq: Arc<AtomicU64>,
}

impl ReviewQueue {
    /// Spawn `workers` worker tasks draining a queue of `capacity` jobs,
    /// keeping the status of the last `retain` finished jobs.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(
        runner: Arc<dyn ReviewRunner>,
        workers: usize,
        capacity: usize,
        retain: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let jobs: Jobs = Arc::new(Mutex::new(JobTable::new(retain)));

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(work(
                    worker,
                    receiver.clone(),
                    runner.clone(),
                    jobs.clone(),
                ))
            })
            .collect();

        let queue = Self {
            sender,
            jobs,
            seq: Arc::new(AtomicU64::new(0)),
        };
        (queue, handles)
    }

    /// Queue a review of `pr` and return its id,
    /// `review_{owner}_{repo}_{number}-{seq}`.
    ///
    /// # Errors
    ///
    /// [`AppError::QueueFull`] when no slot is free.
    pub fn submit(
        &self,
        pr: PullRequestRef,
        token: String,
        use_demo: bool,
    ) -> Result<String, AppError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("review_{}_{}_{}-{seq}", pr.owner, pr.repo, pr.number);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        lock(&self.jobs).entries.insert(
            id.clone(),
            JobEntry {
                status: JobStatus::Queued,
                error: None,
                cancel: cancel_tx,
            },
        );

        let queued = QueuedJob {
            job: ReviewJob {
                id: id.clone(),
                pr,
                token,
                use_demo,
            },
            cancel: cancel_rx,
        };
        match self.sender.try_send(queued) {
            Ok(()) => {
                info!(review_id = %id, "review queued");
                Ok(id)
            }
            Err(e) => {
                lock(&self.jobs).entries.remove(&id);
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => AppError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => AppError::QueueClosed,
                })
            }
        }
    }

    /// Current state of job `id`, if known.
    pub fn status(&self, id: &str) -> Option<JobSnapshot> {
        lock(&self.jobs).entries.get(id).map(|entry| JobSnapshot {
            status: entry.status,
            error: entry.error.clone(),
        })
    }

    /// Cancel job `id` unless it already finished; returns its resulting
    /// status, or `None` if the id is unknown.
    ///
    /// A running job reports `Cancelled` at once. If it was already posting
    /// when the flag arrived, it finishes and ends up `Completed`.
    pub fn cancel(&self, id: &str) -> Option<JobStatus> {
        let mut table = lock(&self.jobs);
        let entry = table.entries.get_mut(id)?;
        let previous = entry.status;
        if previous.is_terminal() {
            return Some(previous);
        }
        entry.status = JobStatus::Cancelled;
        entry.cancel.send_replace(true);
        info!(review_id = %id, "review cancelled");
        if previous == JobStatus::Queued {
            table.finish(id);
        }
        Some(JobStatus::Cancelled)
    }
}

async fn work(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
    runner: Arc<dyn ReviewRunner>,
    jobs: Jobs,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(QueuedJob { job, cancel }) = next else {
            break;
        };

        if !mark_running(&jobs, &job.id) {
            info!(worker, review_id = %job.id, "skipping cancelled review");
            continue;
        }
        info!(worker, review_id = %job.id, pr = %job.pr, demo = job.use_demo, "review started");

        let result = runner.run(&job, cancel).await;

        let mut table = lock(&jobs);
        let Some(entry) = table.entries.get_mut(&job.id) else {
            continue;
        };
        match result {
            Ok(()) => {
                entry.status = JobStatus::Completed;
                info!(worker, review_id = %job.id, "review completed");
            }
            Err(CriticError::Cancelled) => {
                entry.status = JobStatus::Cancelled;
                info!(worker, review_id = %job.id, "review stopped after cancellation");
            }
            Err(e) => {
                warn!(worker, review_id = %job.id, error = %e, "review failed");
                entry.status = JobStatus::Failed;
                entry.error = Some(e.to_string());
            }
        }
        table.finish(&job.id);
    }
}

/// Move a queued job to `Running`; false if it was cancelled meanwhile.
fn mark_running(jobs: &Jobs, id: &str) -> bool {
    match lock(jobs).entries.get_mut(id) {
        Some(entry) if entry.status == JobStatus::Queued => {
            entry.status = JobStatus::Running;
            true
        }
        _ => false,
    }
}
