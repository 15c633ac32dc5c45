//! Pure domain types - no IO, no framework dependencies.

pub mod audit;
pub mod booking;
pub mod event;
pub mod job;
pub mod kyc;
pub mod money;
pub mod payment;
pub mod wallet;

pub use audit::AuditEntry;
pub use booking::{Booking, BookingId, BookingStatus, PartnerId, UserId};
pub use event::{DomainEvent, GatewayEvent, GatewayEventKind};
pub use job::{
    Job, JobId, JobKind, JobOutcome, JobPayload, JobPriority, JobStatus, QueueStats,
    RetryDecision, RetryPolicy,
};
pub use kyc::{KycSession, KycStatus, KycVerification};
pub use money::{CommissionRate, Currency, Money};
pub use payment::{Gateway, Payment, PaymentId, PaymentStatus, SettleOutcome, SettlementRecord};
pub use wallet::{
    EntryDirection, LedgerEntry, LedgerOutcome, TransactionSource, Wallet, WalletId, WalletOwner,
    WalletTransaction, WalletTransactionId,
};
