//! Data Transfer Objects (DTOs) for requests and responses.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    Booking, BookingId, BookingStatus, Currency, EntryDirection, Gateway, Job, JobKind,
    JobPriority, PartnerId, Payment, PaymentId, PaymentStatus, TransactionSource, UserId, Wallet,
    WalletId, WalletTransaction, WalletTransactionId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Booking DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to register a booking with the settlement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub user_id: UserId,
    pub partner_id: PartnerId,
    /// Total amount in smallest currency unit (e.g. paise)
    #[schema(example = 250000)]
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: Currency,
}

fn default_currency() -> Currency {
    Currency::INR
}

/// Booking as seen through the settlement API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    pub id: BookingId,
    pub user_id: UserId,
    pub partner_id: PartnerId,
    #[schema(example = 250000)]
    pub amount: i64,
    pub currency: Currency,
    pub status: BookingStatus,
    /// Set while the booking waits on identity verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_verification_id: Option<String>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            user_id: b.user_id,
            partner_id: b.partner_id,
            amount: b.total.amount(),
            currency: b.total.currency(),
            status: b.status,
            kyc_verification_id: b.kyc_verification_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to open a payment attempt for a booking.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub gateway: Gateway,
    /// Amount in smallest currency unit
    #[schema(example = 250000)]
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: Currency,
}

/// Request to confirm a payment manually (admin/reconciliation path).
/// Routed through the same transition as gateway webhooks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    /// Gateway-side transaction id
    #[schema(example = "pay_LkQ9vZxH2a")]
    pub gateway_payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_response: Option<serde_json::Value>,
}

/// Request to mark a payment failed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FailPaymentRequest {
    #[schema(example = "card declined")]
    pub reason: String,
}

/// Payment as seen through the settlement API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: PaymentId,
    #[schema(example = "PAY-3f2a9c1e")]
    pub reference: String,
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub gateway: Gateway,
    #[schema(example = 250000)]
    pub amount: i64,
    pub currency: Currency,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub kyc_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_verification_id: Option<String>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            reference: p.reference,
            booking_id: p.booking_id,
            user_id: p.user_id,
            gateway: p.gateway,
            amount: p.amount.amount(),
            currency: p.amount.currency(),
            status: p.status,
            gateway_payment_id: p.gateway_payment_id,
            failure_reason: p.failure_reason,
            kyc_required: p.kyc_required,
            kyc_verification_id: p.kyc_verification_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KYC & refund DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Completion callback from the KYC provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KycCallbackRequest {
    pub user_id: UserId,
    /// Provider-side verification session id
    #[schema(example = "ver_8c1d2e")]
    pub verification_id: String,
}

/// Request to refund a booking.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Amount in smallest currency unit
    #[schema(example = 250000)]
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    #[schema(example = "booking cancelled by partner")]
    pub reason: String,
}

/// Acknowledgment body for refund/job-producing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnqueuedResponse {
    pub job_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallet DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Wallet as seen through the settlement API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    pub id: WalletId,
    #[schema(example = "partner:7c9e6679-7425-40de-944b-e07fc1f90ae7")]
    pub owner: String,
    #[schema(example = 225000)]
    pub balance: i64,
    pub currency: Currency,
}

impl From<Wallet> for WalletResponse {
    fn from(w: Wallet) -> Self {
        Self {
            id: w.id,
            owner: w.owner.storage_key(),
            balance: w.balance.amount(),
            currency: w.balance.currency(),
        }
    }
}

/// Ledger row as seen through the settlement API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletTransactionResponse {
    pub id: WalletTransactionId,
    pub wallet_id: WalletId,
    pub amount: i64,
    pub direction: EntryDirection,
    pub source: TransactionSource,
    pub reference_id: String,
    pub balance_after: i64,
    pub description: String,
    #[schema(value_type = String, example = "2024-01-01T00:00:00Z")]
    pub processed_at: String,
}

impl From<WalletTransaction> for WalletTransactionResponse {
    fn from(tx: WalletTransaction) -> Self {
        Self {
            id: tx.id,
            wallet_id: tx.wallet_id,
            amount: tx.amount.amount(),
            direction: tx.direction,
            source: tx.source,
            reference_id: tx.reference_id,
            balance_after: tx.balance_after.amount(),
            description: tx.description,
            processed_at: tx.processed_at.to_rfc3339(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Job as seen on the admin dead-letter surface.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    #[schema(example = "commission:7c9e6679-7425-40de-944b-e07fc1f90ae7")]
    pub id: String,
    pub kind: JobKind,
    pub priority: JobPriority,
    pub attempts: i32,
    pub max_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[schema(value_type = String, example = "2024-01-01T00:00:00Z")]
    pub created_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.into_string(),
            kind: job.payload.kind(),
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            last_error: job.last_error,
            created_at: job.created_at.to_rfc3339(),
        }
    }
}

/// Audit entry as seen through the admin API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntryResponse {
    pub aggregate_id: String,
    #[schema(example = "payment.completed")]
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<serde_json::Value>,
    #[schema(example = "gateway:razorpay")]
    pub actor: String,
    #[schema(value_type = String, example = "2024-01-01T00:00:00Z")]
    pub recorded_at: String,
}

impl From<crate::domain::AuditEntry> for AuditEntryResponse {
    fn from(entry: crate::domain::AuditEntry) -> Self {
        Self {
            aggregate_id: entry.aggregate_id,
            action: entry.action,
            previous: entry.previous,
            next: entry.next,
            actor: entry.actor,
            recorded_at: entry.recorded_at.to_rfc3339(),
        }
    }
}
