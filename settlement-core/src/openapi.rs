//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use settlement_types::domain::{
    BookingId, BookingStatus, Currency, EntryDirection, Gateway, JobKind, JobPriority, PartnerId,
    PaymentId, PaymentStatus, QueueStats, TransactionSource, UserId, WalletId,
    WalletTransactionId,
};
use settlement_types::dto::{
    AuditEntryResponse, BookingResponse, ConfirmPaymentRequest, CreateBookingRequest,
    CreatePaymentRequest, EnqueuedResponse, FailPaymentRequest, JobResponse, KycCallbackRequest,
    PaymentResponse, RefundRequest, WalletResponse, WalletTransactionResponse,
};
use utoipa::OpenApi;

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = inline(serde_json::Value), example = json!({"status": "healthy"}))
    )
)]
async fn health() {}

/// Receive a signed gateway webhook
#[utoipa::path(
    post,
    path = "/payment/webhook/{gateway}",
    tag = "webhooks",
    params(
        ("gateway" = String, Path, description = "Gateway name (razorpay or stripe)")
    ),
    responses(
        (status = 200, description = "Event applied or acknowledged"),
        (status = 401, description = "Signature verification failed"),
        (status = 404, description = "Unknown gateway")
    )
)]
async fn gateway_webhook() {}

/// KYC provider completion callback
#[utoipa::path(
    post,
    path = "/api/kyc/callback",
    tag = "kyc",
    request_body = KycCallbackRequest,
    responses(
        (status = 200, description = "Verification recorded, booking confirmed if it was gated", body = BookingResponse),
        (status = 404, description = "No pending verification with this id"),
        (status = 409, description = "Verification does not match the booking's gate")
    )
)]
async fn kyc_callback() {}

/// Register a booking
#[utoipa::path(
    post,
    path = "/api/bookings",
    tag = "bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking registered", body = BookingResponse),
        (status = 400, description = "Invalid request")
    )
)]
async fn create_booking() {}

/// Get booking by ID
#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    tag = "bookings",
    params(
        ("id" = BookingId, Path, description = "Booking ID (UUID)")
    ),
    responses(
        (status = 200, description = "Booking details", body = BookingResponse),
        (status = 404, description = "Booking not found")
    )
)]
async fn get_booking() {}

/// Queue a refund for a booking
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/refund",
    tag = "bookings",
    request_body = RefundRequest,
    params(
        ("id" = BookingId, Path, description = "Booking ID (UUID)")
    ),
    responses(
        (status = 202, description = "Refund job queued", body = EnqueuedResponse),
        (status = 400, description = "Amount exceeds booking total or is invalid"),
        (status = 404, description = "Booking not found")
    )
)]
async fn request_refund() {}

/// Open a payment attempt
#[utoipa::path(
    post,
    path = "/api/payments",
    tag = "payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = PaymentResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Booking is not awaiting payment")
    )
)]
async fn create_payment() {}

/// Get payment by ID
#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    tag = "payments",
    params(
        ("id" = PaymentId, Path, description = "Payment ID (UUID)")
    ),
    responses(
        (status = 200, description = "Payment details", body = PaymentResponse),
        (status = 404, description = "Payment not found")
    )
)]
async fn get_payment() {}

/// Confirm a payment manually (reconciliation)
#[utoipa::path(
    post,
    path = "/api/payments/{id}/confirm",
    tag = "payments",
    request_body = ConfirmPaymentRequest,
    params(
        ("id" = PaymentId, Path, description = "Payment ID (UUID)")
    ),
    responses(
        (status = 200, description = "Payment settled (idempotent)", body = PaymentResponse),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment already terminal under a different gateway transaction")
    )
)]
async fn confirm_payment() {}

/// Mark a payment failed
#[utoipa::path(
    post,
    path = "/api/payments/{id}/fail",
    tag = "payments",
    request_body = FailPaymentRequest,
    params(
        ("id" = PaymentId, Path, description = "Payment ID (UUID)")
    ),
    responses(
        (status = 200, description = "Payment failed (idempotent)", body = PaymentResponse),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment already completed or cancelled")
    )
)]
async fn fail_payment() {}

/// Cancel a pending payment
#[utoipa::path(
    post,
    path = "/api/payments/{id}/cancel",
    tag = "payments",
    params(
        ("id" = PaymentId, Path, description = "Payment ID (UUID)")
    ),
    responses(
        (status = 200, description = "Payment cancelled (idempotent)", body = PaymentResponse),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment already completed or failed")
    )
)]
async fn cancel_payment() {}

/// Get a partner's wallet
#[utoipa::path(
    get,
    path = "/api/partners/{id}/wallet",
    tag = "wallets",
    params(
        ("id" = PartnerId, Path, description = "Partner ID (UUID)")
    ),
    responses(
        (status = 200, description = "Partner wallet (created empty on first read)", body = WalletResponse)
    )
)]
async fn get_partner_wallet() {}

/// List ledger rows for a wallet
#[utoipa::path(
    get,
    path = "/api/wallets/{id}/transactions",
    tag = "wallets",
    params(
        ("id" = WalletId, Path, description = "Wallet ID (UUID)")
    ),
    responses(
        (status = 200, description = "Ledger rows, oldest first", body = Vec<WalletTransactionResponse>),
        (status = 404, description = "Wallet not found")
    )
)]
async fn list_wallet_transactions() {}

/// List dead-lettered jobs
#[utoipa::path(
    get,
    path = "/api/admin/jobs/dead-letters",
    tag = "admin",
    responses(
        (status = 200, description = "Jobs that exhausted their retry budget", body = Vec<JobResponse>)
    )
)]
async fn list_dead_letters() {}

/// Queue counters
#[utoipa::path(
    get,
    path = "/api/admin/jobs/stats",
    tag = "admin",
    responses(
        (status = 200, description = "Job counts by status", body = QueueStats)
    )
)]
async fn queue_stats() {}

/// Audit trail for an aggregate
#[utoipa::path(
    get,
    path = "/api/admin/audit/{aggregate_id}",
    tag = "admin",
    params(
        ("aggregate_id" = String, Path, description = "Payment, booking, or wallet id")
    ),
    responses(
        (status = 200, description = "Audit entries, oldest first", body = Vec<AuditEntryResponse>)
    )
)]
async fn audit_trail() {}

/// OpenAPI documentation for the Settlement API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Settlement Pipeline API",
        version = "1.0.0",
        description = "Payment and commission settlement for a coworking-space booking marketplace: signed gateway webhooks, a KYC-gated booking state machine, background commission/wallet workers, and an append-only audit trail.",
        license(name = "MIT"),
    ),
    paths(
        health,
        gateway_webhook,
        kyc_callback,
        create_booking,
        get_booking,
        request_refund,
        create_payment,
        get_payment,
        confirm_payment,
        fail_payment,
        cancel_payment,
        get_partner_wallet,
        list_wallet_transactions,
        list_dead_letters,
        queue_stats,
        audit_trail,
    ),
    components(
        schemas(
            CreateBookingRequest,
            BookingResponse,
            CreatePaymentRequest,
            ConfirmPaymentRequest,
            FailPaymentRequest,
            PaymentResponse,
            KycCallbackRequest,
            RefundRequest,
            EnqueuedResponse,
            WalletResponse,
            WalletTransactionResponse,
            JobResponse,
            AuditEntryResponse,
            QueueStats,
            Currency,
            Gateway,
            BookingStatus,
            PaymentStatus,
            EntryDirection,
            TransactionSource,
            JobKind,
            JobPriority,
            BookingId,
            PaymentId,
            UserId,
            PartnerId,
            WalletId,
            WalletTransactionId,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "webhooks", description = "Signed gateway callbacks"),
        (name = "kyc", description = "Identity verification callbacks"),
        (name = "bookings", description = "Booking lifecycle and refunds"),
        (name = "payments", description = "Payment lifecycle operations"),
        (name = "wallets", description = "Partner wallets and ledger rows"),
        (name = "admin", description = "Dead letters, queue stats, audit trail"),
    )
)]
pub struct ApiDoc;
