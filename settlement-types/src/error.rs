//! Error taxonomy for the settlement pipeline.

use crate::domain::{Currency, Gateway};

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount must be positive")]
    NonPositiveAmount,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Webhook verification errors.
///
/// `MissingSecret` is a configuration fault (fatal, alerting); the others
/// reject the request before any side effect occurs.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("No webhook secret configured for gateway {0}")]
    MissingSecret(Gateway),

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Unsupported gateway event type: {0}")]
    UnsupportedEvent(String),
}

/// Errors from external collaborators (KYC gate, refund gateway).
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator rejected the request: {0}")]
    Rejected(String),
}

/// Structured job failure, so the queue can tell "retry me" apart from
/// "dead-letter me".
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Transient failure; the queue retries with backoff.
    #[error("Retryable job failure: {0}")]
    Retryable(String),

    /// Permanent failure; the job is dead-lettered immediately.
    #[error("Fatal job failure: {0}")]
    Fatal(String),
}

impl JobError {
    /// Classifies a repository error: domain violations and missing rows
    /// will not heal on retry, storage hiccups might.
    pub fn from_repo(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => JobError::Fatal(e.to_string()),
            RepoError::NotFound => JobError::Fatal("referenced entity not found".into()),
            RepoError::Conflict(msg) => JobError::Fatal(msg),
            RepoError::Database(msg) | RepoError::Transaction(msg) => JobError::Retryable(msg),
        }
    }
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(DomainError::InsufficientBalance {
                available,
                requested,
            }) => AppError::InsufficientBalance {
                available,
                requested,
            },
            RepoError::Domain(DomainError::InvalidTransition { from, to }) => {
                AppError::Conflict(format!("Invalid status transition: {} -> {}", from, to))
            }
            RepoError::Domain(e) => AppError::BadRequest(e.to_string()),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::from(RepoError::Domain(err))
    }
}
