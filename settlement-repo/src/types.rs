//! Database row structs and string-enum parsing for the Postgres adapter.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use settlement_types::{
    AuditEntry, Booking, BookingId, BookingStatus, Currency, EntryDirection, Gateway, Job, JobId,
    JobPayload, JobPriority, JobStatus, KycStatus, KycVerification, Money, PartnerId, Payment,
    PaymentId, PaymentStatus, RepoError, TransactionSource, UserId, Wallet, WalletId, WalletOwner,
    WalletTransaction, WalletTransactionId,
};

// ─────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────

pub fn parse_currency(s: &str) -> Result<Currency, RepoError> {
    match s {
        "INR" => Ok(Currency::INR),
        "USD" => Ok(Currency::USD),
        _ => Err(RepoError::Database(format!("Unknown currency: {}", s))),
    }
}

pub fn parse_gateway(s: &str) -> Result<Gateway, RepoError> {
    s.parse().map_err(RepoError::Database)
}

pub fn parse_payment_status(s: &str) -> Result<PaymentStatus, RepoError> {
    match s {
        "PENDING" => Ok(PaymentStatus::Pending),
        "COMPLETED" => Ok(PaymentStatus::Completed),
        "FAILED" => Ok(PaymentStatus::Failed),
        "CANCELLED" => Ok(PaymentStatus::Cancelled),
        _ => Err(RepoError::Database(format!(
            "Unknown payment status: {}",
            s
        ))),
    }
}

pub fn parse_booking_status(s: &str) -> Result<BookingStatus, RepoError> {
    match s {
        "PENDING" => Ok(BookingStatus::Pending),
        "PENDING_KYC" => Ok(BookingStatus::PendingKyc),
        "CONFIRMED" => Ok(BookingStatus::Confirmed),
        "CANCELLED" => Ok(BookingStatus::Cancelled),
        _ => Err(RepoError::Database(format!(
            "Unknown booking status: {}",
            s
        ))),
    }
}

pub fn parse_kyc_status(s: &str) -> Result<KycStatus, RepoError> {
    match s {
        "PENDING" => Ok(KycStatus::Pending),
        "APPROVED" => Ok(KycStatus::Approved),
        "REJECTED" => Ok(KycStatus::Rejected),
        _ => Err(RepoError::Database(format!("Unknown KYC status: {}", s))),
    }
}

pub fn parse_direction(s: &str) -> Result<EntryDirection, RepoError> {
    match s {
        "CREDIT" => Ok(EntryDirection::Credit),
        "DEBIT" => Ok(EntryDirection::Debit),
        _ => Err(RepoError::Database(format!(
            "Unknown entry direction: {}",
            s
        ))),
    }
}

pub fn parse_source(s: &str) -> Result<TransactionSource, RepoError> {
    match s {
        "BOOKING_PAYOUT" => Ok(TransactionSource::BookingPayout),
        "COMMISSION" => Ok(TransactionSource::Commission),
        "REFUND" => Ok(TransactionSource::Refund),
        "ADMIN_ADJUSTMENT" => Ok(TransactionSource::AdminAdjustment),
        _ => Err(RepoError::Database(format!(
            "Unknown transaction source: {}",
            s
        ))),
    }
}

pub fn parse_job_status(s: &str) -> Result<JobStatus, RepoError> {
    match s {
        "PENDING" => Ok(JobStatus::Pending),
        "RUNNING" => Ok(JobStatus::Running),
        "COMPLETED" => Ok(JobStatus::Completed),
        "DEAD" => Ok(JobStatus::Dead),
        _ => Err(RepoError::Database(format!("Unknown job status: {}", s))),
    }
}

/// Inverse of `WalletOwner::storage_key`.
pub fn parse_owner(key: &str) -> Result<WalletOwner, RepoError> {
    if key == "platform" {
        return Ok(WalletOwner::Platform);
    }
    let bad_key = || RepoError::Database(format!("Unknown wallet owner key: {}", key));
    let (kind, id) = key.split_once(':').ok_or_else(bad_key)?;
    let uuid = Uuid::parse_str(id).map_err(|_| bad_key())?;
    match kind {
        "partner" => Ok(WalletOwner::Partner(PartnerId::from_uuid(uuid))),
        "user" => Ok(WalletOwner::User(UserId::from_uuid(uuid))),
        _ => Err(bad_key()),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Row structs
// ─────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
pub struct DbPayment {
    pub id: Uuid,
    pub reference: String,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub gateway: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub gateway_payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub kyc_required: bool,
    pub kyc_verification_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl DbPayment {
    pub fn into_domain(self) -> Result<Payment, RepoError> {
        let currency = parse_currency(&self.currency)?;
        Ok(Payment {
            id: PaymentId::from_uuid(self.id),
            reference: self.reference,
            booking_id: BookingId::from_uuid(self.booking_id),
            user_id: UserId::from_uuid(self.user_id),
            gateway: parse_gateway(&self.gateway)?,
            amount: Money::new(self.amount, currency).map_err(RepoError::Domain)?,
            status: parse_payment_status(&self.status)?,
            gateway_payment_id: self.gateway_payment_id,
            gateway_order_id: self.gateway_order_id,
            gateway_response: self.gateway_response,
            failure_reason: self.failure_reason,
            kyc_required: self.kyc_required,
            kyc_verification_id: self.kyc_verification_id,
            created_at: self.created_at,
            completed_at: self.completed_at,
            failed_at: self.failed_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbBooking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub partner_id: Uuid,
    pub total_amount: i64,
    pub currency: String,
    pub status: String,
    pub kyc_verification_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl DbBooking {
    pub fn into_domain(self) -> Result<Booking, RepoError> {
        let currency = parse_currency(&self.currency)?;
        Ok(Booking::from_parts(
            BookingId::from_uuid(self.id),
            UserId::from_uuid(self.user_id),
            PartnerId::from_uuid(self.partner_id),
            Money::new(self.total_amount, currency).map_err(RepoError::Domain)?,
            parse_booking_status(&self.status)?,
            self.kyc_verification_id,
            self.created_at,
            self.confirmed_at,
        ))
    }
}

#[derive(FromRow)]
pub struct DbKycVerification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booking_id: Uuid,
    pub payment_id: Uuid,
    pub provider_verification_id: String,
    pub verification_url: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DbKycVerification {
    pub fn into_domain(self) -> Result<KycVerification, RepoError> {
        Ok(KycVerification {
            id: self.id,
            user_id: UserId::from_uuid(self.user_id),
            booking_id: BookingId::from_uuid(self.booking_id),
            payment_id: PaymentId::from_uuid(self.payment_id),
            provider_verification_id: self.provider_verification_id,
            verification_url: self.verification_url,
            status: parse_kyc_status(&self.status)?,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbWallet {
    pub id: Uuid,
    pub owner_key: String,
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl DbWallet {
    pub fn into_domain(self) -> Result<Wallet, RepoError> {
        let currency = parse_currency(&self.currency)?;
        Ok(Wallet {
            id: WalletId::from_uuid(self.id),
            owner: parse_owner(&self.owner_key)?,
            balance: Money::new(self.balance, currency).map_err(RepoError::Domain)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbWalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub direction: String,
    pub source: String,
    pub reference_id: String,
    pub balance_after: i64,
    pub description: String,
    pub processed_at: DateTime<Utc>,
}

impl DbWalletTransaction {
    pub fn into_domain(self) -> Result<WalletTransaction, RepoError> {
        let currency = parse_currency(&self.currency)?;
        Ok(WalletTransaction {
            id: WalletTransactionId::from_uuid(self.id),
            wallet_id: WalletId::from_uuid(self.wallet_id),
            amount: Money::new(self.amount, currency).map_err(RepoError::Domain)?,
            direction: parse_direction(&self.direction)?,
            source: parse_source(&self.source)?,
            reference_id: self.reference_id,
            balance_after: Money::new(self.balance_after, currency).map_err(RepoError::Domain)?,
            description: self.description,
            processed_at: self.processed_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbJob {
    pub id: String,
    pub payload: serde_json::Value,
    pub priority: i16,
    pub not_before: DateTime<Utc>,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DbJob {
    pub fn into_domain(self) -> Result<Job, RepoError> {
        let payload: JobPayload = serde_json::from_value(self.payload)
            .map_err(|e| RepoError::Database(format!("Bad job payload: {}", e)))?;
        Ok(Job {
            id: JobId::from(self.id),
            payload,
            priority: JobPriority::from_i16(self.priority),
            not_before: self.not_before,
            status: parse_job_status(&self.status)?,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            last_error: self.last_error,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbAuditEntry {
    pub id: Uuid,
    pub aggregate_id: String,
    pub action: String,
    pub previous: Option<serde_json::Value>,
    pub next: Option<serde_json::Value>,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

impl DbAuditEntry {
    pub fn into_domain(self) -> AuditEntry {
        AuditEntry {
            id: self.id,
            aggregate_id: self.aggregate_id,
            action: self.action,
            previous: self.previous,
            next: self.next,
            actor: self.actor,
            recorded_at: self.recorded_at,
        }
    }
}
