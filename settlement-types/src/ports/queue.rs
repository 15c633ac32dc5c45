//! Job queue port trait.
//!
//! The queue is an external capability: at-least-once delivery, per-job
//! delay and priority, automatic retry with exponential backoff, and a
//! dead-letter view once attempts are exhausted. Any durable work-queue
//! meeting this contract satisfies the port.

use std::time::Duration;

use crate::domain::{Job, JobId, JobPayload, QueueStats, RetryDecision};
use crate::error::RepoError;

/// Per-enqueue scheduling options.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Earliest-run delay from now.
    pub delay: Duration,
    pub priority: crate::domain::JobPriority,
}

/// Work-queue port for settlement jobs.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Enqueues a job. The job id is deterministic from the payload, so a
    /// duplicate enqueue returns the existing id without adding a job.
    async fn enqueue(&self, payload: JobPayload, opts: EnqueueOptions) -> Result<JobId, RepoError>;

    /// Claims up to `limit` due jobs, highest priority first. Claimed jobs
    /// are invisible to other consumers until completed, retried, or their
    /// claim goes stale.
    async fn pull_due(&self, limit: usize) -> Result<Vec<Job>, RepoError>;

    /// Marks a claimed job completed.
    async fn complete(&self, id: &JobId) -> Result<(), RepoError>;

    /// Records a failed attempt; reschedules with backoff or dead-letters
    /// once the attempt budget is spent.
    async fn retry(&self, id: &JobId, error: &str) -> Result<RetryDecision, RepoError>;

    /// Dead-letters a job immediately (fatal failure, no point retrying).
    async fn bury(&self, id: &JobId, error: &str) -> Result<(), RepoError>;

    /// Jobs that exhausted their retry budget, for the operator surface.
    async fn dead_letters(&self) -> Result<Vec<Job>, RepoError>;

    /// Queue counters for the admin stats endpoint.
    async fn stats(&self) -> Result<QueueStats, RepoError>;
}
