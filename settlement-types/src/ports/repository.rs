//! Repository port trait.
//!
//! This is the primary port in the hexagonal architecture. Adapters
//! (Postgres, InMemory) implement this trait; the state machine and the
//! workers depend only on it.

use crate::domain::{
    AuditEntry, Booking, BookingId, BookingStatus, KycVerification, LedgerEntry, LedgerOutcome,
    Payment, PaymentId, SettleOutcome, SettlementRecord, TransactionSource, UserId, Wallet,
    WalletId, WalletOwner, WalletTransaction,
};
use crate::error::RepoError;

/// Persistence port for the settlement pipeline.
///
/// Status transitions and ledger mutations MUST be atomic: `settle_payment`
/// and `fail_payment` are compare-and-set on a pending row, and
/// `apply_ledger_entry` performs its idempotency check, balance update, and
/// transaction insert inside one lock/transaction scope.
#[async_trait::async_trait]
pub trait SettlementRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────

    /// Persists a new pending payment.
    async fn create_payment(&self, payment: Payment) -> Result<Payment, RepoError>;

    /// Gets a payment by id.
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError>;

    /// Finds a payment by the reference we handed to the gateway.
    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, RepoError>;

    /// Finds a payment by the gateway order id recorded at creation.
    async fn find_payment_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, RepoError>;

    /// Atomically moves a pending payment to `completed` and records the
    /// gateway ids. Only one of N concurrent callers observes `Settled`.
    async fn settle_payment(
        &self,
        id: PaymentId,
        record: SettlementRecord,
    ) -> Result<SettleOutcome, RepoError>;

    /// Atomically moves a pending payment to `failed`.
    async fn fail_payment(
        &self,
        id: PaymentId,
        reason: String,
        gateway_response: Option<serde_json::Value>,
    ) -> Result<SettleOutcome, RepoError>;

    /// Atomically moves a pending payment to `cancelled`.
    async fn cancel_payment(&self, id: PaymentId) -> Result<SettleOutcome, RepoError>;

    /// Records that this payment gated its booking on KYC, and which
    /// verification session clears the hold.
    async fn set_payment_kyc(
        &self,
        id: PaymentId,
        verification_id: Option<String>,
    ) -> Result<(), RepoError>;

    /// Number of completed payments the user has made. Used as a pure query
    /// for the first-booking KYC gate.
    async fn count_completed_payments(&self, user_id: UserId) -> Result<i64, RepoError>;

    /// The completed payment backing a booking, if any.
    async fn find_completed_payment_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bookings
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a booking with the settlement store.
    async fn create_booking(&self, booking: Booking) -> Result<Booking, RepoError>;

    /// Gets a booking by id.
    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError>;

    /// Moves a booking to a new status, rejecting transitions the domain
    /// does not allow.
    async fn set_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, RepoError>;

    /// Attaches (or clears) the verification session gating a booking.
    async fn set_booking_kyc_verification(
        &self,
        id: BookingId,
        verification_id: Option<String>,
    ) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Users & KYC
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the user has already passed identity verification.
    async fn is_user_verified(&self, user_id: UserId) -> Result<bool, RepoError>;

    /// Marks a user as identity-verified (or revokes it).
    async fn set_user_verified(&self, user_id: UserId, verified: bool) -> Result<(), RepoError>;

    /// The user's still-pending verification session, if one exists.
    /// Reused instead of opening a second provider session.
    async fn find_pending_kyc(
        &self,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, RepoError>;

    /// Persists a newly opened verification session.
    async fn insert_kyc_verification(
        &self,
        verification: KycVerification,
    ) -> Result<KycVerification, RepoError>;

    /// Marks the verification session approved and returns it; `None` when
    /// no pending session matches the provider id and user.
    async fn complete_kyc_verification(
        &self,
        provider_verification_id: &str,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Wallets (mutations MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetches the owner's wallet, creating an empty one if absent.
    async fn get_or_create_wallet(&self, owner: WalletOwner) -> Result<Wallet, RepoError>;

    /// Gets a wallet by id.
    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>, RepoError>;

    /// Applies a ledger entry: idempotency check on `(reference_id, source)`,
    /// balance-after computation, negative-balance rejection, and the
    /// transaction insert, all in one atomic scope.
    async fn apply_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerOutcome, RepoError>;

    /// Finds the ledger row with the given idempotency pair, if any.
    async fn find_wallet_transaction(
        &self,
        reference_id: &str,
        source: TransactionSource,
    ) -> Result<Option<WalletTransaction>, RepoError>;

    /// Lists a wallet's ledger rows, oldest first.
    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit trail (append-only)
    // ─────────────────────────────────────────────────────────────────────────

    /// Appends an audit entry. Entries are never mutated or deleted.
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), RepoError>;

    /// Lists the audit trail for an aggregate, oldest first.
    async fn list_audit(&self, aggregate_id: &str) -> Result<Vec<AuditEntry>, RepoError>;
}
