//! Settlement job model.
//!
//! Jobs are ephemeral work items delivered at-least-once by the queue; the
//! job id is deterministic from the payload's dedupe key so redundant
//! enqueue calls collapse to one job.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::booking::{BookingId, PartnerId, UserId};
use super::money::Money;
use super::wallet::{EntryDirection, WalletOwner};

/// Deterministic job identifier (also the enqueue idempotency key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derives the id from the job kind and the payload's dedupe key.
    pub fn derive(kind: JobKind, dedupe_key: &str) -> Self {
        Self(format!("{}:{}", kind, dedupe_key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The kind of work a job performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Commission,
    WalletOperation,
    PartnerPayout,
    Refund,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Commission => write!(f, "commission"),
            JobKind::WalletOperation => write!(f, "wallet_operation"),
            JobKind::PartnerPayout => write!(f, "partner_payout"),
            JobKind::Refund => write!(f, "refund"),
        }
    }
}

/// Scheduling priority. Refunds run first, settlement work at medium.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl JobPriority {
    pub fn as_i16(&self) -> i16 {
        match self {
            JobPriority::Low => 0,
            JobPriority::Medium => 1,
            JobPriority::High => 2,
        }
    }

    pub fn from_i16(v: i16) -> Self {
        match v {
            2 => JobPriority::High,
            1 => JobPriority::Medium,
            _ => JobPriority::Low,
        }
    }
}

/// Queue-side job state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Retry budget exhausted; surfaced to operators, never retried again.
    Dead,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Dead => write!(f, "DEAD"),
        }
    }
}

/// Typed job payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Split a completed booking payment into partner payout and platform
    /// commission.
    Commission {
        booking_id: BookingId,
        partner_id: PartnerId,
        user_id: UserId,
    },
    /// Generic credit/debit with a caller-supplied reason.
    WalletOperation {
        owner: WalletOwner,
        amount: Money,
        direction: EntryDirection,
        reference_id: String,
        description: String,
    },
    /// Payout outside the commission flow (cancellation compensation).
    PartnerPayout {
        booking_id: BookingId,
        partner_id: PartnerId,
        amount: Money,
        commission: Money,
    },
    /// Return money to the payer, via the gateway when possible.
    Refund {
        booking_id: BookingId,
        user_id: UserId,
        amount: Money,
        reason: String,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Commission { .. } => JobKind::Commission,
            JobPayload::WalletOperation { .. } => JobKind::WalletOperation,
            JobPayload::PartnerPayout { .. } => JobKind::PartnerPayout,
            JobPayload::Refund { .. } => JobKind::Refund,
        }
    }

    /// Key the job id is derived from; duplicate enqueues with the same key
    /// collapse to one job.
    pub fn dedupe_key(&self) -> String {
        match self {
            JobPayload::Commission { booking_id, .. } => booking_id.to_string(),
            JobPayload::WalletOperation { reference_id, .. } => reference_id.clone(),
            JobPayload::PartnerPayout { booking_id, .. } => booking_id.to_string(),
            JobPayload::Refund { booking_id, .. } => booking_id.to_string(),
        }
    }
}

/// A queued unit of settlement work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub priority: JobPriority,
    /// Earliest time the job may be pulled.
    pub not_before: DateTime<Utc>,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Retry policy shared by all job kinds: a small attempt budget with
/// exponential backoff, then dead-letter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the given (1-based) retry attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// What the queue decided after a failed attempt.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Another attempt is scheduled for the given time.
    Scheduled(DateTime<Utc>),
    /// Attempts exhausted; the job moved to the dead-letter view.
    DeadLettered,
}

/// Consumer-side result of a processed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Processed,
    /// The idempotency check found the work already done.
    AlreadyProcessed,
}

/// Counts exposed on the admin queue-stats surface.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub dead: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_deterministic() {
        let booking_id = BookingId::new();
        let a = JobId::derive(JobKind::Commission, &booking_id.to_string());
        let b = JobId::derive(JobKind::Commission, &booking_id.to_string());
        assert_eq!(a, b);

        let refund = JobId::derive(JobKind::Refund, &booking_id.to_string());
        assert_ne!(a, refund);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(JobPriority::High > JobPriority::Medium);
        assert!(JobPriority::Medium > JobPriority::Low);
    }
}
