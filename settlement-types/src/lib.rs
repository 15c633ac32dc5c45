//! # Settlement Types
//!
//! Domain types and port traits for the payment & commission settlement
//! pipeline. This crate has ZERO external IO dependencies - only data
//! structures, business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Payment, Booking, Wallet, Job)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    AuditEntry, Booking, BookingId, BookingStatus, CommissionRate, Currency, DomainEvent,
    EntryDirection, Gateway, GatewayEvent, GatewayEventKind, Job, JobId, JobKind, JobOutcome,
    JobPayload, JobPriority, JobStatus, KycSession, KycStatus, KycVerification, LedgerEntry,
    LedgerOutcome, Money, PartnerId, Payment, PaymentId, PaymentStatus, QueueStats, RetryDecision,
    RetryPolicy, SettleOutcome, SettlementRecord, TransactionSource, UserId, Wallet, WalletId,
    WalletOwner, WalletTransaction, WalletTransactionId,
};
pub use dto::*;
pub use error::{AppError, CollaboratorError, DomainError, JobError, RepoError, VerifyError};
pub use ports::{EnqueueOptions, JobQueue, KycGate, Notifier, RefundGateway, SettlementRepository};
