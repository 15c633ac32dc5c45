//! In-memory job queue adapter.
//!
//! Same delivery contract as the Postgres queue: deterministic job ids
//! dedupe enqueues, claims go stale after a visibility window so a crashed
//! consumer's jobs get redelivered, and failed attempts back off
//! exponentially until the budget is spent.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;

use settlement_types::{
    EnqueueOptions, Job, JobId, JobPayload, JobQueue, JobStatus, QueueStats, RepoError,
    RetryDecision, RetryPolicy,
};

/// How long a claim holds before the job is considered abandoned.
const STALE_CLAIM_SECS: i64 = 60;

struct QueuedJob {
    job: Job,
    claimed_at: Option<DateTime<Utc>>,
}

/// In-memory work queue.
pub struct InMemoryJobQueue {
    jobs: DashMap<JobId, QueuedJob>,
    policy: RetryPolicy,
    /// Completed jobs are evicted from the map; only the count survives.
    completed: AtomicU64,
}

impl InMemoryJobQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            jobs: DashMap::new(),
            policy,
            completed: AtomicU64::new(0),
        }
    }

    fn is_claimable(&self, queued: &QueuedJob, now: DateTime<Utc>) -> bool {
        match queued.job.status {
            JobStatus::Pending => queued.job.not_before <= now,
            // Redeliver jobs whose consumer went away mid-claim.
            JobStatus::Running => queued
                .claimed_at
                .map(|at| now - at > ChronoDuration::seconds(STALE_CLAIM_SECS))
                .unwrap_or(true),
            JobStatus::Completed | JobStatus::Dead => false,
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait::async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, payload: JobPayload, opts: EnqueueOptions) -> Result<JobId, RepoError> {
        let id = JobId::derive(payload.kind(), &payload.dedupe_key());
        if self.jobs.contains_key(&id) {
            return Ok(id);
        }

        let job = Job {
            id: id.clone(),
            payload,
            priority: opts.priority,
            not_before: Utc::now() + opts.delay,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: self.policy.max_attempts as i32,
            last_error: None,
            created_at: Utc::now(),
        };
        self.jobs.entry(id.clone()).or_insert(QueuedJob {
            job,
            claimed_at: None,
        });
        Ok(id)
    }

    async fn pull_due(&self, limit: usize) -> Result<Vec<Job>, RepoError> {
        let now = Utc::now();

        let mut candidates: Vec<(JobId, i16, DateTime<Utc>)> = self
            .jobs
            .iter()
            .filter(|entry| self.is_claimable(entry.value(), now))
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().job.priority.as_i16(),
                    entry.value().job.not_before,
                )
            })
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let mut claimed = Vec::new();
        for (id, _, _) in candidates {
            if claimed.len() >= limit {
                break;
            }
            let Some(mut entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            // Re-check under the entry lock; another puller may have won.
            if !self.is_claimable(&entry, now) {
                continue;
            }
            entry.job.status = JobStatus::Running;
            entry.job.attempts += 1;
            entry.claimed_at = Some(now);
            claimed.push(entry.job.clone());
        }
        Ok(claimed)
    }

    async fn complete(&self, id: &JobId) -> Result<(), RepoError> {
        // Evict so a long-lived process does not accumulate finished jobs.
        // Dedupe of a later re-enqueue falls to the ledger idempotency key.
        self.jobs.remove(id).ok_or(RepoError::NotFound)?;
        self.completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn retry(&self, id: &JobId, error: &str) -> Result<RetryDecision, RepoError> {
        let mut entry = self.jobs.get_mut(id).ok_or(RepoError::NotFound)?;
        entry.job.last_error = Some(error.to_string());
        entry.claimed_at = None;

        if entry.job.attempts >= entry.job.max_attempts {
            entry.job.status = JobStatus::Dead;
            return Ok(RetryDecision::DeadLettered);
        }

        let next_run = Utc::now() + self.policy.backoff(entry.job.attempts as u32);
        entry.job.status = JobStatus::Pending;
        entry.job.not_before = next_run;
        Ok(RetryDecision::Scheduled(next_run))
    }

    async fn bury(&self, id: &JobId, error: &str) -> Result<(), RepoError> {
        let mut entry = self.jobs.get_mut(id).ok_or(RepoError::NotFound)?;
        entry.job.status = JobStatus::Dead;
        entry.job.last_error = Some(error.to_string());
        entry.claimed_at = None;
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<Job>, RepoError> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| entry.value().job.status == JobStatus::Dead)
            .map(|entry| entry.value().job.clone())
            .collect())
    }

    async fn stats(&self) -> Result<QueueStats, RepoError> {
        let mut stats = QueueStats {
            completed: self.completed.load(Ordering::Relaxed),
            ..QueueStats::default()
        };
        for entry in self.jobs.iter() {
            match entry.value().job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Dead => stats.dead += 1,
            }
        }
        Ok(stats)
    }
}
