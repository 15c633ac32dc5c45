//! Service-level tests against in-process mock adapters.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use settlement_types::{
    AppError, AuditEntry, Booking, BookingId, BookingStatus, CollaboratorError, CommissionRate,
    Currency, DomainEvent, EnqueueOptions, EntryDirection, Gateway, GatewayEvent,
    GatewayEventKind, Job, JobError, JobId, JobOutcome, JobQueue, JobStatus, KycCallbackRequest,
    KycGate, KycSession, KycStatus, KycVerification, LedgerEntry, LedgerOutcome, Money, Notifier,
    PartnerId, Payment, PaymentId, PaymentStatus, QueueStats, RefundGateway, RepoError,
    RetryDecision, SettleOutcome, SettlementRecord, SettlementRepository, TransactionSource,
    UserId, Wallet, WalletId, WalletOwner, WalletTransaction, WalletTransactionId,
};

use crate::dispatch::{DispatchPolicy, JobDispatcher};
use crate::service::{SettlementService, SettlementSettings};
use crate::workers::{CommissionProcessor, WalletProcessor};

// ─────────────────────────────────────────────────────────────────────────────
// Mock repository
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockRepo {
    payments: Mutex<HashMap<PaymentId, Payment>>,
    bookings: Mutex<HashMap<BookingId, Booking>>,
    verified_users: Mutex<HashSet<UserId>>,
    kyc: Mutex<Vec<KycVerification>>,
    wallets: Mutex<HashMap<WalletId, Wallet>>,
    owners: Mutex<HashMap<String, WalletId>>,
    transactions: Mutex<Vec<WalletTransaction>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MockRepo {
    pub(crate) fn audit_actions(&self, aggregate_id: &str) -> Vec<String> {
        self.audit
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl SettlementRepository for MockRepo {
    async fn create_payment(&self, payment: Payment) -> Result<Payment, RepoError> {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        Ok(self.payments.lock().unwrap().get(&id).cloned())
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.reference == reference)
            .cloned())
    }

    async fn find_payment_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn settle_payment(
        &self,
        id: PaymentId,
        record: SettlementRecord,
    ) -> Result<SettleOutcome, RepoError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.get_mut(&id).ok_or(RepoError::NotFound)?;
        if payment.status.is_terminal() {
            return Ok(SettleOutcome::AlreadyTerminal(payment.clone()));
        }
        payment.status = PaymentStatus::Completed;
        payment.gateway_payment_id = Some(record.gateway_payment_id);
        payment.gateway_order_id = record.gateway_order_id.or(payment.gateway_order_id.take());
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
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.get_mut(&id).ok_or(RepoError::NotFound)?;
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
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.get_mut(&id).ok_or(RepoError::NotFound)?;
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
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.get_mut(&id).ok_or(RepoError::NotFound)?;
        payment.kyc_required = true;
        payment.kyc_verification_id = verification_id;
        Ok(())
    }

    async fn count_completed_payments(&self, user_id: UserId) -> Result<i64, RepoError> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.user_id == user_id && p.status == PaymentStatus::Completed)
            .count() as i64)
    }

    async fn find_completed_payment_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.booking_id == booking_id && p.status == PaymentStatus::Completed)
            .cloned())
    }

    async fn create_booking(&self, booking: Booking) -> Result<Booking, RepoError> {
        self.bookings
            .lock()
            .unwrap()
            .insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError> {
        Ok(self.bookings.lock().unwrap().get(&id).cloned())
    }

    async fn set_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, RepoError> {
        let mut bookings = self.bookings.lock().unwrap();
        let booking = bookings.get_mut(&id).ok_or(RepoError::NotFound)?;
        if !booking.status.can_transition_to(status) {
            return Err(RepoError::Domain(
                settlement_types::DomainError::InvalidTransition {
                    from: booking.status.to_string(),
                    to: status.to_string(),
                },
            ));
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
        let mut bookings = self.bookings.lock().unwrap();
        let booking = bookings.get_mut(&id).ok_or(RepoError::NotFound)?;
        booking.kyc_verification_id = verification_id;
        Ok(())
    }

    async fn is_user_verified(&self, user_id: UserId) -> Result<bool, RepoError> {
        Ok(self.verified_users.lock().unwrap().contains(&user_id))
    }

    async fn set_user_verified(&self, user_id: UserId, verified: bool) -> Result<(), RepoError> {
        let mut users = self.verified_users.lock().unwrap();
        if verified {
            users.insert(user_id);
        } else {
            users.remove(&user_id);
        }
        Ok(())
    }

    async fn find_pending_kyc(
        &self,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, RepoError> {
        Ok(self
            .kyc
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.user_id == user_id && v.status == KycStatus::Pending)
            .cloned())
    }

    async fn insert_kyc_verification(
        &self,
        verification: KycVerification,
    ) -> Result<KycVerification, RepoError> {
        self.kyc.lock().unwrap().push(verification.clone());
        Ok(verification)
    }

    async fn complete_kyc_verification(
        &self,
        provider_verification_id: &str,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, RepoError> {
        let mut kyc = self.kyc.lock().unwrap();
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
        let mut owners = self.owners.lock().unwrap();
        let mut wallets = self.wallets.lock().unwrap();
        if let Some(id) = owners.get(&owner.storage_key()) {
            return Ok(wallets[id].clone());
        }
        let wallet = Wallet::new(owner, Currency::INR);
        owners.insert(owner.storage_key(), wallet.id);
        wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>, RepoError> {
        Ok(self.wallets.lock().unwrap().get(&id).cloned())
    }

    async fn apply_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerOutcome, RepoError> {
        let mut transactions = self.transactions.lock().unwrap();
        if let Some(existing) = transactions
            .iter()
            .find(|tx| tx.reference_id == entry.reference_id && tx.source == entry.source)
        {
            return Ok(LedgerOutcome::AlreadyApplied(existing.clone()));
        }

        let mut wallets = self.wallets.lock().unwrap();
        let wallet = wallets.get_mut(&entry.wallet_id).ok_or(RepoError::NotFound)?;
        let balance_after = match entry.direction {
            EntryDirection::Credit => wallet.balance.checked_add(entry.amount)?,
            EntryDirection::Debit => wallet.balance.checked_sub(entry.amount)?,
        };
        wallet.balance = balance_after;

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
        transactions.push(tx.clone());
        Ok(LedgerOutcome::Applied(tx))
    }

    async fn find_wallet_transaction(
        &self,
        reference_id: &str,
        source: TransactionSource,
    ) -> Result<Option<WalletTransaction>, RepoError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .find(|tx| tx.reference_id == reference_id && tx.source == source)
            .cloned())
    }

    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, RepoError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), RepoError> {
        self.audit.lock().unwrap().push(entry);
        Ok(())
    }

    async fn list_audit(&self, aggregate_id: &str) -> Result<Vec<AuditEntry>, RepoError> {
        Ok(self
            .audit
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock queue & collaborators
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockQueue {
    jobs: Mutex<Vec<Job>>,
}

impl MockQueue {
    pub(crate) fn job_ids(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|j| j.id.as_str().to_string())
            .collect()
    }
}

#[async_trait::async_trait]
impl JobQueue for MockQueue {
    async fn enqueue(
        &self,
        payload: settlement_types::JobPayload,
        opts: EnqueueOptions,
    ) -> Result<JobId, RepoError> {
        let id = JobId::derive(payload.kind(), &payload.dedupe_key());
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.iter().any(|j| j.id == id) {
            return Ok(id);
        }
        jobs.push(Job {
            id: id.clone(),
            payload,
            priority: opts.priority,
            not_before: Utc::now() + chrono::Duration::from_std(opts.delay).unwrap(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            last_error: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn pull_due(&self, limit: usize) -> Result<Vec<Job>, RepoError> {
        let mut jobs = self.jobs.lock().unwrap();
        let now = Utc::now();
        let mut claimed = Vec::new();
        for job in jobs.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if job.status == JobStatus::Pending && job.not_before <= now {
                job.status = JobStatus::Running;
                job.attempts += 1;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: &JobId) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or(RepoError::NotFound)?;
        job.status = JobStatus::Completed;
        Ok(())
    }

    async fn retry(&self, id: &JobId, error: &str) -> Result<RetryDecision, RepoError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or(RepoError::NotFound)?;
        job.last_error = Some(error.to_string());
        if job.attempts >= job.max_attempts {
            job.status = JobStatus::Dead;
            return Ok(RetryDecision::DeadLettered);
        }
        let at = Utc::now() + chrono::Duration::seconds(2);
        job.status = JobStatus::Pending;
        job.not_before = at;
        Ok(RetryDecision::Scheduled(at))
    }

    async fn bury(&self, id: &JobId, error: &str) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or(RepoError::NotFound)?;
        job.last_error = Some(error.to_string());
        job.status = JobStatus::Dead;
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<Job>, RepoError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Dead)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<QueueStats, RepoError> {
        let jobs = self.jobs.lock().unwrap();
        let mut stats = QueueStats::default();
        for job in jobs.iter() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Dead => stats.dead += 1,
            }
        }
        Ok(stats)
    }
}

struct NullNotifier;

#[async_trait::async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _event: &DomainEvent) {}
}

struct StubKycGate {
    fail: bool,
}

#[async_trait::async_trait]
impl KycGate for StubKycGate {
    async fn initiate(
        &self,
        _user_id: UserId,
        _booking_id: BookingId,
        return_url: &str,
    ) -> Result<KycSession, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Unavailable(
                "provider timed out".to_string(),
            ));
        }
        Ok(KycSession {
            verification_id: "ver_test_1".to_string(),
            verification_url: format!("https://kyc.example.com/start?return={}", return_url),
        })
    }
}

struct StubRefundGateway {
    fail: bool,
}

#[async_trait::async_trait]
impl RefundGateway for StubRefundGateway {
    async fn initiate_refund(
        &self,
        _gateway: Gateway,
        _gateway_payment_id: &str,
        _amount: Money,
        _reference: &str,
    ) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Unavailable(
                "gateway unreachable".to_string(),
            ));
        }
        Ok("rfnd_test_1".to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn inr(amount: i64) -> Money {
    Money::new(amount, Currency::INR).unwrap()
}

fn record(gateway_payment_id: &str) -> SettlementRecord {
    SettlementRecord {
        gateway_payment_id: gateway_payment_id.to_string(),
        gateway_order_id: None,
        gateway_response: None,
    }
}

fn build_service(
    repo: Arc<MockRepo>,
    queue: Arc<MockQueue>,
    kyc_gate_fails: bool,
) -> SettlementService<MockRepo, MockQueue> {
    SettlementService::new(
        repo,
        JobDispatcher::new(queue, DispatchPolicy::default()),
        Arc::new(StubKycGate {
            fail: kyc_gate_fails,
        }),
        Arc::new(NullNotifier),
        SettlementSettings::default(),
    )
}

async fn seed_booking_and_payment(repo: &MockRepo) -> (Booking, Payment) {
    let booking = Booking::new(UserId::new(), PartnerId::new(), inr(250_000)).unwrap();
    let booking = repo.create_booking(booking).await.unwrap();
    let payment = Payment::new(
        booking.id,
        booking.user_id,
        Gateway::Razorpay,
        booking.total,
    )
    .unwrap();
    let payment = repo.create_payment(payment).await.unwrap();
    (booking, payment)
}

// ─────────────────────────────────────────────────────────────────────────────
// State machine tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_time_payer_is_gated_on_kyc() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;

    let settled = service
        .settle_payment(payment.id, record("pay_1"), "gateway:razorpay")
        .await
        .unwrap();

    assert_eq!(settled.status, PaymentStatus::Completed);
    assert!(settled.kyc_required);
    assert_eq!(settled.kyc_verification_id.as_deref(), Some("ver_test_1"));

    let booking = repo.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::PendingKyc);
    assert_eq!(booking.kyc_verification_id.as_deref(), Some("ver_test_1"));

    // No commission until the payer verifies.
    assert!(queue.job_ids().is_empty());
}

#[tokio::test]
async fn test_repeat_payer_confirms_and_enqueues_commission() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;
    repo.set_user_verified(booking.user_id, true).await.unwrap();

    let settled = service
        .settle_payment(payment.id, record("pay_1"), "gateway:razorpay")
        .await
        .unwrap();

    assert_eq!(settled.status, PaymentStatus::Completed);
    assert!(!settled.kyc_required);

    let booking = repo.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);

    let job_ids = queue.job_ids();
    assert_eq!(job_ids.len(), 1);
    assert_eq!(job_ids[0], format!("commission:{}", booking.id));
}

#[tokio::test]
async fn test_redelivered_settlement_is_a_noop() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;
    repo.set_user_verified(booking.user_id, true).await.unwrap();

    for _ in 0..3 {
        let settled = service
            .settle_payment(payment.id, record("pay_1"), "gateway:razorpay")
            .await
            .unwrap();
        assert_eq!(settled.status, PaymentStatus::Completed);
    }

    assert_eq!(queue.job_ids().len(), 1);
    let completions = repo
        .audit_actions(&payment.id.to_string())
        .into_iter()
        .filter(|a| a == "payment.completed")
        .count();
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn test_conflicting_gateway_transaction_is_rejected() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;
    repo.set_user_verified(booking.user_id, true).await.unwrap();

    service
        .settle_payment(payment.id, record("pay_1"), "gateway:razorpay")
        .await
        .unwrap();
    let result = service
        .settle_payment(payment.id, record("pay_OTHER"), "gateway:razorpay")
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    // The recorded settlement is untouched and the conflict is on the trail.
    let stored = repo.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.gateway_payment_id.as_deref(), Some("pay_1"));
    assert!(repo
        .audit_actions(&payment.id.to_string())
        .contains(&"payment.conflict".to_string()));
}

#[tokio::test]
async fn test_failed_payment_releases_kyc_hold() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;
    repo.set_booking_status(booking.id, BookingStatus::PendingKyc)
        .await
        .unwrap();
    repo.set_booking_kyc_verification(booking.id, Some("ver_test_1".to_string()))
        .await
        .unwrap();

    let failed = service
        .fail_payment(
            payment.id,
            "card declined".to_string(),
            None,
            "gateway:razorpay",
        )
        .await
        .unwrap();

    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));

    // The booking is no longer stuck behind a dead payment's KYC hold.
    let booking = repo.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert!(booking.kyc_verification_id.is_none());
}

#[tokio::test]
async fn test_kyc_completion_confirms_booking_and_enqueues_commission() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;

    service
        .settle_payment(payment.id, record("pay_1"), "gateway:razorpay")
        .await
        .unwrap();

    let confirmed = service
        .handle_kyc_completion(KycCallbackRequest {
            user_id: booking.user_id,
            verification_id: "ver_test_1".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert!(repo.is_user_verified(booking.user_id).await.unwrap());
    assert_eq!(
        queue.job_ids(),
        vec![format!("commission:{}", booking.id)]
    );
}

#[tokio::test]
async fn test_kyc_gate_outage_keeps_the_hold() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), true);
    let (booking, payment) = seed_booking_and_payment(&repo).await;

    // Settlement must still succeed when the provider is down.
    let settled = service
        .settle_payment(payment.id, record("pay_1"), "gateway:razorpay")
        .await
        .unwrap();

    assert_eq!(settled.status, PaymentStatus::Completed);
    assert!(settled.kyc_required);
    assert!(settled.kyc_verification_id.is_none());

    // Gated with no session, never silently confirmed.
    let booking = repo.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::PendingKyc);
    assert!(booking.kyc_verification_id.is_none());
    assert!(queue.job_ids().is_empty());
}

#[tokio::test]
async fn test_kyc_callback_for_unknown_session_is_not_found() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);

    let result = service
        .handle_kyc_completion(KycCallbackRequest {
            user_id: UserId::new(),
            verification_id: "ver_unknown".to_string(),
        })
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_gateway_event_routes_by_payment_reference() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;
    repo.set_user_verified(booking.user_id, true).await.unwrap();

    let event = GatewayEvent {
        gateway: Gateway::Razorpay,
        kind: GatewayEventKind::PaymentCaptured,
        gateway_payment_id: "pay_evt".to_string(),
        gateway_order_id: None,
        payment_reference: Some(payment.reference.clone()),
        amount: Some(250_000),
        failure_reason: None,
        raw: serde_json::json!({"event": "payment.captured"}),
    };

    let settled = service.apply_gateway_event(event).await.unwrap();
    assert_eq!(settled.id, payment.id);
    assert_eq!(settled.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_gateway_failure_event_fails_the_payment() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (_, payment) = seed_booking_and_payment(&repo).await;

    let event = GatewayEvent {
        gateway: Gateway::Razorpay,
        kind: GatewayEventKind::PaymentFailed,
        gateway_payment_id: "pay_evt".to_string(),
        gateway_order_id: None,
        payment_reference: Some(payment.reference.clone()),
        amount: None,
        failure_reason: Some("insufficient funds".to_string()),
        raw: serde_json::json!({"event": "payment.failed"}),
    };

    let failed = service.apply_gateway_event(event).await.unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("insufficient funds"));
}

#[tokio::test]
async fn test_refund_exceeding_booking_total_is_rejected() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue.clone(), false);
    let (booking, _) = seed_booking_and_payment(&repo).await;

    let result = service
        .request_refund(
            booking.id,
            settlement_types::RefundRequest {
                amount: 300_000,
                currency: Currency::INR,
                reason: "overcharged".to_string(),
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert!(queue.job_ids().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker tests
// ─────────────────────────────────────────────────────────────────────────────

async fn seed_confirmed_booking(repo: &MockRepo) -> Booking {
    let booking = Booking::new(UserId::new(), PartnerId::new(), inr(250_000)).unwrap();
    let booking = repo.create_booking(booking).await.unwrap();
    repo.set_booking_status(booking.id, BookingStatus::Confirmed)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_commission_splits_ten_percent() {
    let repo = Arc::new(MockRepo::default());
    let booking = seed_confirmed_booking(&repo).await;
    let processor = CommissionProcessor::new(
        repo.clone(),
        Arc::new(NullNotifier),
        CommissionRate::DEFAULT,
    );

    let outcome = processor
        .process(booking.id, booking.partner_id)
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Processed);

    let partner = repo
        .get_or_create_wallet(WalletOwner::Partner(booking.partner_id))
        .await
        .unwrap();
    let platform = repo
        .get_or_create_wallet(WalletOwner::Platform)
        .await
        .unwrap();
    assert_eq!(partner.balance.amount(), 225_000);
    assert_eq!(platform.balance.amount(), 25_000);
    assert!(repo
        .audit_actions(&booking.id.to_string())
        .contains(&"commission.settled".to_string()));
}

#[tokio::test]
async fn test_commission_rerun_does_not_double_credit() {
    let repo = Arc::new(MockRepo::default());
    let booking = seed_confirmed_booking(&repo).await;
    let processor = CommissionProcessor::new(
        repo.clone(),
        Arc::new(NullNotifier),
        CommissionRate::DEFAULT,
    );

    processor
        .process(booking.id, booking.partner_id)
        .await
        .unwrap();
    let second = processor
        .process(booking.id, booking.partner_id)
        .await
        .unwrap();
    assert_eq!(second, JobOutcome::AlreadyProcessed);

    let partner = repo
        .get_or_create_wallet(WalletOwner::Partner(booking.partner_id))
        .await
        .unwrap();
    assert_eq!(partner.balance.amount(), 225_000);

    let payout_rows = repo
        .find_wallet_transaction(&booking.id.to_string(), TransactionSource::BookingPayout)
        .await
        .unwrap();
    assert!(payout_rows.is_some());
    assert_eq!(
        repo.list_wallet_transactions(partner.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_commission_for_missing_booking_is_fatal() {
    let repo = Arc::new(MockRepo::default());
    let processor = CommissionProcessor::new(
        repo.clone(),
        Arc::new(NullNotifier),
        CommissionRate::DEFAULT,
    );

    let result = processor.process(BookingId::new(), PartnerId::new()).await;
    assert!(matches!(result, Err(JobError::Fatal(_))));
}

#[tokio::test]
async fn test_overdraft_dead_letters_immediately() {
    let repo = Arc::new(MockRepo::default());
    let processor = WalletProcessor::new(
        repo.clone(),
        Arc::new(StubRefundGateway { fail: false }),
        Arc::new(NullNotifier),
    );
    let owner = WalletOwner::Partner(PartnerId::new());
    repo.get_or_create_wallet(owner).await.unwrap();

    let result = processor
        .process_wallet_operation(
            owner,
            inr(10_000),
            EntryDirection::Debit,
            "adj-1".to_string(),
            "chargeback".to_string(),
        )
        .await;

    assert!(matches!(result, Err(JobError::Fatal(_))));
}

#[tokio::test]
async fn test_refund_without_gateway_payment_credits_wallet() {
    let repo = Arc::new(MockRepo::default());
    let booking = seed_confirmed_booking(&repo).await;
    let processor = WalletProcessor::new(
        repo.clone(),
        Arc::new(StubRefundGateway { fail: false }),
        Arc::new(NullNotifier),
    );

    let outcome = processor
        .process_refund(
            booking.id,
            booking.user_id,
            inr(100_000),
            "partner cancelled".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Processed);

    let wallet = repo
        .get_or_create_wallet(WalletOwner::User(booking.user_id))
        .await
        .unwrap();
    assert_eq!(wallet.balance.amount(), 100_000);

    // Redelivery finds the ledger row and does nothing.
    let rerun = processor
        .process_refund(
            booking.id,
            booking.user_id,
            inr(100_000),
            "partner cancelled".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(rerun, JobOutcome::AlreadyProcessed);
    let wallet = repo.get_wallet(wallet.id).await.unwrap().unwrap();
    assert_eq!(wallet.balance.amount(), 100_000);
}

#[tokio::test]
async fn test_refund_with_gateway_payment_goes_through_gateway() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue, false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;
    repo.set_user_verified(booking.user_id, true).await.unwrap();
    service
        .settle_payment(payment.id, record("pay_1"), "gateway:razorpay")
        .await
        .unwrap();

    let processor = WalletProcessor::new(
        repo.clone(),
        Arc::new(StubRefundGateway { fail: false }),
        Arc::new(NullNotifier),
    );
    let outcome = processor
        .process_refund(
            booking.id,
            booking.user_id,
            inr(250_000),
            "full refund".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Processed);

    // Gateway path: no internal wallet credit, but the trail records it.
    let user_wallet = repo
        .get_or_create_wallet(WalletOwner::User(booking.user_id))
        .await
        .unwrap();
    assert!(user_wallet.balance.is_zero());
    assert!(repo
        .audit_actions(&booking.id.to_string())
        .contains(&"refund.gateway_initiated".to_string()));
}

#[tokio::test]
async fn test_unavailable_refund_gateway_is_retryable() {
    let repo = Arc::new(MockRepo::default());
    let queue = Arc::new(MockQueue::default());
    let service = build_service(repo.clone(), queue, false);
    let (booking, payment) = seed_booking_and_payment(&repo).await;
    repo.set_user_verified(booking.user_id, true).await.unwrap();
    service
        .settle_payment(payment.id, record("pay_1"), "gateway:razorpay")
        .await
        .unwrap();

    let processor = WalletProcessor::new(
        repo.clone(),
        Arc::new(StubRefundGateway { fail: true }),
        Arc::new(NullNotifier),
    );
    let result = processor
        .process_refund(
            booking.id,
            booking.user_id,
            inr(250_000),
            "full refund".to_string(),
        )
        .await;

    assert!(matches!(result, Err(JobError::Retryable(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch & queue tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_enqueue_collapses_to_one_job() {
    let queue = Arc::new(MockQueue::default());
    let dispatcher = JobDispatcher::new(queue.clone(), DispatchPolicy::default());
    let booking_id = BookingId::new();
    let partner_id = PartnerId::new();
    let user_id = UserId::new();

    let first = dispatcher
        .enqueue_commission(booking_id, partner_id, user_id)
        .await
        .unwrap();
    let second = dispatcher
        .enqueue_commission(booking_id, partner_id, user_id)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(queue.job_ids().len(), 1);
}

#[tokio::test]
async fn test_commission_job_is_delayed() {
    let queue = Arc::new(MockQueue::default());
    let dispatcher = JobDispatcher::new(queue.clone(), DispatchPolicy::default());
    dispatcher
        .enqueue_commission(BookingId::new(), PartnerId::new(), UserId::new())
        .await
        .unwrap();

    // Not yet due: the dispatch policy holds commission jobs back.
    let due = queue.pull_due(10).await.unwrap();
    assert!(due.is_empty());
}
