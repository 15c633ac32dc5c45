//! In-memory repository adapter.
//!
//! Backs tests and local development. Atomicity comes from DashMap's
//! per-entry exclusive references: a payment CAS or a ledger application
//! runs entirely under one entry lock, so concurrent webhook redeliveries
//! and job retries observe the same guarantees the Postgres adapter gives.

use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use settlement_types::{
    AuditEntry, Booking, BookingId, BookingStatus, Currency, DomainError, EntryDirection,
    KycStatus, KycVerification, LedgerEntry, LedgerOutcome, Payment, PaymentId, PaymentStatus,
    RepoError, SettleOutcome, SettlementRecord, SettlementRepository, TransactionSource, UserId,
    Wallet, WalletId, WalletOwner, WalletTransaction, WalletTransactionId,
};

/// A wallet together with its ledger rows, mutated under one entry lock.
struct WalletState {
    wallet: Wallet,
    transactions: Vec<WalletTransaction>,
}

/// In-memory settlement store.
#[derive(Default)]
pub struct InMemoryRepo {
    payments: DashMap<PaymentId, Payment>,
    bookings: DashMap<BookingId, Booking>,
    verified_users: DashMap<UserId, bool>,
    kyc: Mutex<Vec<KycVerification>>,
    wallets: DashMap<WalletId, WalletState>,
    /// Owner storage key -> wallet id.
    wallet_owners: DashMap<String, WalletId>,
    /// Gateway transaction id -> the payment it settled. A gateway id
    /// settles at most one payment.
    gateway_ids: DashMap<String, PaymentId>,
    /// `(reference_id, source)` -> where the ledger row lives. Claimed
    /// under the entry lock, so duplicate deliveries serialize here.
    ledger_index: DashMap<(String, TransactionSource), (WalletId, WalletTransactionId)>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SettlementRepository for InMemoryRepo {
    async fn create_payment(&self, payment: Payment) -> Result<Payment, RepoError> {
        self.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        Ok(self.payments.get(&id).map(|p| p.clone()))
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.reference == reference)
            .map(|p| p.clone()))
    }

    async fn find_payment_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.gateway_order_id.as_deref() == Some(gateway_order_id))
            .map(|p| p.clone()))
    }

    async fn settle_payment(
        &self,
        id: PaymentId,
        record: SettlementRecord,
    ) -> Result<SettleOutcome, RepoError> {
        let mut payment = self.payments.get_mut(&id).ok_or(RepoError::NotFound)?;
        if payment.status.is_terminal() {
            return Ok(SettleOutcome::AlreadyTerminal(payment.clone()));
        }
        // Claim the gateway transaction id before flipping the status; a
        // second payment presenting the same id is a conflict.
        match self.gateway_ids.entry(record.gateway_payment_id.clone()) {
            Entry::Occupied(slot) if *slot.get() != id => {
                return Err(RepoError::Conflict(format!(
                    "gateway transaction {} already settled payment {}",
                    record.gateway_payment_id,
                    slot.get()
                )));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        payment.status = PaymentStatus::Completed;
        payment.gateway_payment_id = Some(record.gateway_payment_id);
        if record.gateway_order_id.is_some() {
            payment.gateway_order_id = record.gateway_order_id;
        }
        payment.gateway_response = record.gateway_response;
        payment.completed_at = Some(Utc::now());
        Ok(SettleOutcome::Settled(payment.clone()))
    }

    async fn fail_payment(
        &self,
        id: PaymentId,
        reason: String,
        gateway_response: Option<serde_json::Value>,
    ) -> Result<SettleOutcome, RepoError> {
        let mut payment = self.payments.get_mut(&id).ok_or(RepoError::NotFound)?;
        if payment.status.is_terminal() {
            return Ok(SettleOutcome::AlreadyTerminal(payment.clone()));
        }
        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason);
        payment.gateway_response = gateway_response;
        payment.failed_at = Some(Utc::now());
        Ok(SettleOutcome::Settled(payment.clone()))
    }

    async fn cancel_payment(&self, id: PaymentId) -> Result<SettleOutcome, RepoError> {
        let mut payment = self.payments.get_mut(&id).ok_or(RepoError::NotFound)?;
        if payment.status.is_terminal() {
            return Ok(SettleOutcome::AlreadyTerminal(payment.clone()));
        }
        payment.status = PaymentStatus::Cancelled;
        Ok(SettleOutcome::Settled(payment.clone()))
    }

    async fn set_payment_kyc(
        &self,
        id: PaymentId,
        verification_id: Option<String>,
    ) -> Result<(), RepoError> {
        let mut payment = self.payments.get_mut(&id).ok_or(RepoError::NotFound)?;
        payment.kyc_required = true;
        payment.kyc_verification_id = verification_id;
        Ok(())
    }

    async fn count_completed_payments(&self, user_id: UserId) -> Result<i64, RepoError> {
        Ok(self
            .payments
            .iter()
            .filter(|p| p.user_id == user_id && p.status == PaymentStatus::Completed)
            .count() as i64)
    }

    async fn find_completed_payment_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.booking_id == booking_id && p.status == PaymentStatus::Completed)
            .map(|p| p.clone()))
    }

    async fn create_booking(&self, booking: Booking) -> Result<Booking, RepoError> {
        self.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError> {
        Ok(self.bookings.get(&id).map(|b| b.clone()))
    }

    async fn set_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, RepoError> {
        let mut booking = self.bookings.get_mut(&id).ok_or(RepoError::NotFound)?;
        if !booking.status.can_transition_to(status) {
            return Err(RepoError::Domain(DomainError::InvalidTransition {
                from: booking.status.to_string(),
                to: status.to_string(),
            }));
        }
        booking.status = status;
        if status == BookingStatus::Confirmed {
            booking.confirmed_at = Some(Utc::now());
        }
        Ok(booking.clone())
    }

    async fn set_booking_kyc_verification(
        &self,
        id: BookingId,
        verification_id: Option<String>,
    ) -> Result<(), RepoError> {
        let mut booking = self.bookings.get_mut(&id).ok_or(RepoError::NotFound)?;
        booking.kyc_verification_id = verification_id;
        Ok(())
    }

    async fn is_user_verified(&self, user_id: UserId) -> Result<bool, RepoError> {
        Ok(self
            .verified_users
            .get(&user_id)
            .map(|v| *v)
            .unwrap_or(false))
    }

    async fn set_user_verified(&self, user_id: UserId, verified: bool) -> Result<(), RepoError> {
        self.verified_users.insert(user_id, verified);
        Ok(())
    }

    async fn find_pending_kyc(
        &self,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, RepoError> {
        let kyc = self.kyc.lock().expect("kyc lock poisoned");
        Ok(kyc
            .iter()
            .find(|v| v.user_id == user_id && v.status == KycStatus::Pending)
            .cloned())
    }

    async fn insert_kyc_verification(
        &self,
        verification: KycVerification,
    ) -> Result<KycVerification, RepoError> {
        let mut kyc = self.kyc.lock().expect("kyc lock poisoned");
        kyc.push(verification.clone());
        Ok(verification)
    }

    async fn complete_kyc_verification(
        &self,
        provider_verification_id: &str,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, RepoError> {
        let mut kyc = self.kyc.lock().expect("kyc lock poisoned");
        let Some(v) = kyc.iter_mut().find(|v| {
            v.provider_verification_id == provider_verification_id
                && v.user_id == user_id
                && v.status == KycStatus::Pending
        }) else {
            return Ok(None);
        };
        v.status = KycStatus::Approved;
        v.completed_at = Some(Utc::now());
        Ok(Some(v.clone()))
    }

    async fn get_or_create_wallet(&self, owner: WalletOwner) -> Result<Wallet, RepoError> {
        let id = *self
            .wallet_owners
            .entry(owner.storage_key())
            .or_insert_with(|| {
                let wallet = Wallet::new(owner, Currency::INR);
                let id = wallet.id;
                self.wallets.insert(
                    id,
                    WalletState {
                        wallet,
                        transactions: Vec::new(),
                    },
                );
                id
            });

        self.wallets
            .get(&id)
            .map(|state| state.wallet.clone())
            .ok_or_else(|| RepoError::Database("wallet index out of sync".to_string()))
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>, RepoError> {
        Ok(self.wallets.get(&id).map(|state| state.wallet.clone()))
    }

    async fn apply_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerOutcome, RepoError> {
        // The idempotency pair is claimed under the index entry lock, so
        // concurrent duplicates serialize before the balance moves. This
        // stands in for the Postgres UNIQUE constraint.
        match self
            .ledger_index
            .entry((entry.reference_id.clone(), entry.source))
        {
            Entry::Occupied(slot) => {
                let (wallet_id, tx_id) = *slot.get();
                let state = self
                    .wallets
                    .get(&wallet_id)
                    .ok_or_else(|| RepoError::Database("ledger index out of sync".to_string()))?;
                let tx = state
                    .transactions
                    .iter()
                    .find(|tx| tx.id == tx_id)
                    .cloned()
                    .ok_or_else(|| RepoError::Database("ledger index out of sync".to_string()))?;
                Ok(LedgerOutcome::AlreadyApplied(tx))
            }
            Entry::Vacant(slot) => {
                let mut state = self
                    .wallets
                    .get_mut(&entry.wallet_id)
                    .ok_or(RepoError::NotFound)?;

                // An early return here leaves the pair unclaimed.
                let balance_after = match entry.direction {
                    EntryDirection::Credit => state.wallet.balance.checked_add(entry.amount)?,
                    EntryDirection::Debit => state.wallet.balance.checked_sub(entry.amount)?,
                };
                state.wallet.balance = balance_after;

                let tx = WalletTransaction {
                    id: WalletTransactionId::new(),
                    wallet_id: entry.wallet_id,
                    amount: entry.amount,
                    direction: entry.direction,
                    source: entry.source,
                    reference_id: entry.reference_id,
                    balance_after,
                    description: entry.description,
                    processed_at: Utc::now(),
                };
                state.transactions.push(tx.clone());
                slot.insert((tx.wallet_id, tx.id));
                Ok(LedgerOutcome::Applied(tx))
            }
        }
    }

    async fn find_wallet_transaction(
        &self,
        reference_id: &str,
        source: TransactionSource,
    ) -> Result<Option<WalletTransaction>, RepoError> {
        let Some(slot) = self
            .ledger_index
            .get(&(reference_id.to_string(), source))
        else {
            return Ok(None);
        };
        let (wallet_id, tx_id) = *slot;
        Ok(self.wallets.get(&wallet_id).and_then(|state| {
            state
                .transactions
                .iter()
                .find(|tx| tx.id == tx_id)
                .cloned()
        }))
    }

    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, RepoError> {
        Ok(self
            .wallets
            .get(&wallet_id)
            .map(|state| state.transactions.clone())
            .unwrap_or_default())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), RepoError> {
        let mut audit = self.audit.lock().expect("audit lock poisoned");
        audit.push(entry);
        Ok(())
    }

    async fn list_audit(&self, aggregate_id: &str) -> Result<Vec<AuditEntry>, RepoError> {
        let audit = self.audit.lock().expect("audit lock poisoned");
        Ok(audit
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use settlement_types::{Gateway, Money, PartnerId};

    fn inr(amount: i64) -> Money {
        Money::new(amount, Currency::INR).unwrap()
    }

    async fn seed_payment(repo: &InMemoryRepo) -> Payment {
        let payment = Payment::new(
            BookingId::new(),
            UserId::new(),
            Gateway::Razorpay,
            inr(250_000),
        )
        .unwrap();
        repo.create_payment(payment).await.unwrap()
    }

    #[tokio::test]
    async fn test_settle_is_compare_and_set() {
        let repo = Arc::new(InMemoryRepo::new());
        let payment = seed_payment(&repo).await;

        let record = SettlementRecord {
            gateway_payment_id: "pay_1".to_string(),
            gateway_order_id: None,
            gateway_response: None,
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let record = record.clone();
            handles.push(tokio::spawn(async move {
                repo.settle_payment(payment.id, record).await.unwrap()
            }));
        }

        let mut settled = 0;
        for handle in handles {
            if let SettleOutcome::Settled(_) = handle.await.unwrap() {
                settled += 1;
            }
        }
        // Exactly one caller wins the transition.
        assert_eq!(settled, 1);
    }

    #[tokio::test]
    async fn test_concurrent_credits_sum_up() {
        let repo = Arc::new(InMemoryRepo::new());
        let owner = WalletOwner::Partner(PartnerId::new());
        let wallet = repo.get_or_create_wallet(owner).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = repo.clone();
            let entry = LedgerEntry::credit(
                wallet.id,
                inr(1_000),
                TransactionSource::BookingPayout,
                format!("booking-{}", i),
                "payout",
            );
            handles.push(tokio::spawn(async move {
                repo.apply_ledger_entry(entry).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let wallet = repo.get_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(wallet.balance.amount(), 20_000);
        assert_eq!(
            repo.list_wallet_transactions(wallet.id).await.unwrap().len(),
            20
        );
    }

    #[tokio::test]
    async fn test_gateway_transaction_settles_at_most_one_payment() {
        let repo = InMemoryRepo::new();
        let first = seed_payment(&repo).await;
        let second = seed_payment(&repo).await;

        let record = SettlementRecord {
            gateway_payment_id: "pay_shared".to_string(),
            gateway_order_id: None,
            gateway_response: None,
        };

        let outcome = repo.settle_payment(first.id, record.clone()).await.unwrap();
        assert!(matches!(outcome, SettleOutcome::Settled(_)));

        // The same gateway transaction cannot settle a second payment.
        let result = repo.settle_payment(second.id, record.clone()).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));

        // Redelivery against the settled payment stays a no-op.
        let outcome = repo.settle_payment(first.id, record).await.unwrap();
        assert!(matches!(outcome, SettleOutcome::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_entries_credit_once() {
        let repo = Arc::new(InMemoryRepo::new());
        let owner = WalletOwner::Partner(PartnerId::new());
        let wallet = repo.get_or_create_wallet(owner).await.unwrap();

        // Many rounds of racing deliveries of the same entry; exactly one
        // per round may move the balance.
        for round in 0..100 {
            let entry = LedgerEntry::credit(
                wallet.id,
                inr(1_000),
                TransactionSource::BookingPayout,
                format!("booking-{}", round),
                "payout",
            );
            let mut handles = Vec::new();
            for _ in 0..8 {
                let repo = repo.clone();
                let entry = entry.clone();
                handles.push(tokio::spawn(async move {
                    repo.apply_ledger_entry(entry).await.unwrap()
                }));
            }
            let mut applied = 0;
            for handle in handles {
                if let LedgerOutcome::Applied(_) = handle.await.unwrap() {
                    applied += 1;
                }
            }
            assert_eq!(applied, 1, "round {}: entry applied {} times", round, applied);
        }

        let wallet = repo.get_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(wallet.balance.amount(), 100_000);
        assert_eq!(
            repo.list_wallet_transactions(wallet.id).await.unwrap().len(),
            100
        );
    }

    #[tokio::test]
    async fn test_duplicate_ledger_entry_is_absorbed() {
        let repo = InMemoryRepo::new();
        let wallet = repo
            .get_or_create_wallet(WalletOwner::Platform)
            .await
            .unwrap();

        let entry = LedgerEntry::credit(
            wallet.id,
            inr(25_000),
            TransactionSource::Commission,
            "booking-1",
            "commission",
        );
        let first = repo.apply_ledger_entry(entry.clone()).await.unwrap();
        let second = repo.apply_ledger_entry(entry).await.unwrap();

        assert!(matches!(first, LedgerOutcome::Applied(_)));
        assert!(matches!(second, LedgerOutcome::AlreadyApplied(_)));

        let wallet = repo.get_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(wallet.balance.amount(), 25_000);
    }

    #[tokio::test]
    async fn test_debit_cannot_go_negative() {
        let repo = InMemoryRepo::new();
        let wallet = repo
            .get_or_create_wallet(WalletOwner::Platform)
            .await
            .unwrap();

        let entry = LedgerEntry::debit(
            wallet.id,
            inr(1),
            TransactionSource::AdminAdjustment,
            "adj-1",
            "test",
        );
        let result = repo.apply_ledger_entry(entry).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InsufficientBalance { .. }))
        ));

        // Nothing was written.
        assert!(repo
            .list_wallet_transactions(wallet.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalid_booking_transition_rejected() {
        let repo = InMemoryRepo::new();
        let booking = Booking::new(UserId::new(), PartnerId::new(), inr(250_000)).unwrap();
        let booking = repo.create_booking(booking).await.unwrap();
        repo.set_booking_status(booking.id, BookingStatus::Cancelled)
            .await
            .unwrap();

        let result = repo
            .set_booking_status(booking.id, BookingStatus::Confirmed)
            .await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_get_or_create_wallet_is_stable_per_owner() {
        let repo = InMemoryRepo::new();
        let owner = WalletOwner::Partner(PartnerId::new());

        let a = repo.get_or_create_wallet(owner).await.unwrap();
        let b = repo.get_or_create_wallet(owner).await.unwrap();
        assert_eq!(a.id, b.id);

        let platform = repo
            .get_or_create_wallet(WalletOwner::Platform)
            .await
            .unwrap();
        assert_ne!(a.id, platform.id);
    }
}
