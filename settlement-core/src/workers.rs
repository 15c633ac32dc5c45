//! Job consumers for the settlement queue.
//!
//! Consumers assume at-least-once delivery: every money-moving step leans
//! on the ledger's `(reference_id, source)` idempotency key, so a crash
//! between two writes is healed by the retry instead of doubled.
//!
//! Failure classification is the consumer's job: [`JobError::Retryable`]
//! sends the job back with backoff, [`JobError::Fatal`] dead-letters it
//! immediately.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use settlement_types::{
    AuditEntry, BookingId, BookingStatus, CollaboratorError, CommissionRate, DomainEvent,
    EntryDirection, Job, JobError, JobOutcome, JobPayload, JobQueue, LedgerEntry, LedgerOutcome,
    Money, Notifier, PartnerId, RefundGateway, RepoError, RetryDecision, SettlementRepository,
    TransactionSource, UserId, WalletOwner,
};

fn repo_err(err: RepoError) -> JobError {
    JobError::from_repo(err)
}

// ─────────────────────────────────────────────────────────────────────────────
// Commission worker
// ─────────────────────────────────────────────────────────────────────────────

/// Splits a confirmed booking's total into partner payout and platform
/// commission, crediting both wallets.
pub struct CommissionProcessor<R: SettlementRepository> {
    repo: Arc<R>,
    notifier: Arc<dyn Notifier>,
    rate: CommissionRate,
}

impl<R: SettlementRepository> CommissionProcessor<R> {
    pub fn new(repo: Arc<R>, notifier: Arc<dyn Notifier>, rate: CommissionRate) -> Self {
        Self {
            repo,
            notifier,
            rate,
        }
    }

    /// Settles the commission for one booking.
    ///
    /// Each wallet credit is individually idempotent, so a redelivery that
    /// lands after a partial run finishes the missing half instead of
    /// doubling the done half.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn process(
        &self,
        booking_id: BookingId,
        partner_id: PartnerId,
    ) -> Result<JobOutcome, JobError> {
        let booking = self
            .repo
            .get_booking(booking_id)
            .await
            .map_err(repo_err)?
            .ok_or_else(|| JobError::Fatal(format!("Booking {} not found", booking_id)))?;

        if booking.status != BookingStatus::Confirmed {
            return Err(JobError::Fatal(format!(
                "Booking {} is {}, commission is not due",
                booking_id, booking.status
            )));
        }

        let (payout, commission) = self.rate.split(booking.total);

        let partner_wallet = self
            .repo
            .get_or_create_wallet(WalletOwner::Partner(partner_id))
            .await
            .map_err(repo_err)?;
        let payout_outcome = self
            .repo
            .apply_ledger_entry(LedgerEntry::credit(
                partner_wallet.id,
                payout,
                TransactionSource::BookingPayout,
                booking_id.to_string(),
                format!("Payout for booking {}", booking_id),
            ))
            .await
            .map_err(repo_err)?;

        let platform_wallet = self
            .repo
            .get_or_create_wallet(WalletOwner::Platform)
            .await
            .map_err(repo_err)?;
        let commission_outcome = self
            .repo
            .apply_ledger_entry(LedgerEntry::credit(
                platform_wallet.id,
                commission,
                TransactionSource::Commission,
                booking_id.to_string(),
                format!("Commission for booking {}", booking_id),
            ))
            .await
            .map_err(repo_err)?;

        if matches!(payout_outcome, LedgerOutcome::AlreadyApplied(_))
            && matches!(commission_outcome, LedgerOutcome::AlreadyApplied(_))
        {
            tracing::debug!(booking_id = %booking_id, "commission already settled");
            return Ok(JobOutcome::AlreadyProcessed);
        }

        self.repo
            .append_audit(AuditEntry::record(
                booking_id.to_string(),
                "commission.settled",
                None,
                Some(json!({
                    "payout": payout.amount(),
                    "commission": commission.amount(),
                    "rate_bps": self.rate.basis_points(),
                    "partner_wallet": partner_wallet.id,
                    "platform_wallet": platform_wallet.id,
                })),
                "worker",
            ))
            .await
            .map_err(repo_err)?;

        // Money has moved; the notification is best-effort and must not
        // fail the job.
        self.notifier
            .notify(&DomainEvent::PayoutProcessed {
                booking_id,
                partner_id,
                amount: payout,
                commission,
            })
            .await;

        tracing::info!(
            booking_id = %booking_id,
            payout = payout.amount(),
            commission = commission.amount(),
            "commission settled"
        );
        Ok(JobOutcome::Processed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallet worker
// ─────────────────────────────────────────────────────────────────────────────

/// Applies wallet operations, out-of-band payouts, and refunds.
pub struct WalletProcessor<R: SettlementRepository> {
    repo: Arc<R>,
    refunds: Arc<dyn RefundGateway>,
    notifier: Arc<dyn Notifier>,
}

impl<R: SettlementRepository> WalletProcessor<R> {
    pub fn new(
        repo: Arc<R>,
        refunds: Arc<dyn RefundGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repo,
            refunds,
            notifier,
        }
    }

    /// Generic credit/debit against any wallet.
    #[tracing::instrument(skip(self, description), fields(reference_id = %reference_id))]
    pub async fn process_wallet_operation(
        &self,
        owner: WalletOwner,
        amount: Money,
        direction: EntryDirection,
        reference_id: String,
        description: String,
    ) -> Result<JobOutcome, JobError> {
        let wallet = self
            .repo
            .get_or_create_wallet(owner)
            .await
            .map_err(repo_err)?;

        let entry = LedgerEntry {
            wallet_id: wallet.id,
            amount,
            direction,
            source: TransactionSource::AdminAdjustment,
            reference_id: reference_id.clone(),
            description,
        };

        // An overdraft surfaces as a domain error and dead-letters; there
        // is no balance state a retry could heal.
        match self.repo.apply_ledger_entry(entry).await.map_err(repo_err)? {
            LedgerOutcome::AlreadyApplied(_) => Ok(JobOutcome::AlreadyProcessed),
            LedgerOutcome::Applied(tx) => {
                self.repo
                    .append_audit(AuditEntry::record(
                        wallet.id.to_string(),
                        "wallet.adjusted",
                        None,
                        Some(json!({
                            "amount": tx.amount.amount(),
                            "direction": tx.direction,
                            "reference_id": reference_id,
                            "balance_after": tx.balance_after.amount(),
                        })),
                        "worker",
                    ))
                    .await
                    .map_err(repo_err)?;
                Ok(JobOutcome::Processed)
            }
        }
    }

    /// Payout outside the commission flow: both amounts come from the
    /// payload instead of the rate split.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn process_partner_payout(
        &self,
        booking_id: BookingId,
        partner_id: PartnerId,
        amount: Money,
        commission: Money,
    ) -> Result<JobOutcome, JobError> {
        let partner_wallet = self
            .repo
            .get_or_create_wallet(WalletOwner::Partner(partner_id))
            .await
            .map_err(repo_err)?;
        let payout_outcome = self
            .repo
            .apply_ledger_entry(LedgerEntry::credit(
                partner_wallet.id,
                amount,
                TransactionSource::BookingPayout,
                booking_id.to_string(),
                format!("Payout for booking {}", booking_id),
            ))
            .await
            .map_err(repo_err)?;

        let platform_wallet = self
            .repo
            .get_or_create_wallet(WalletOwner::Platform)
            .await
            .map_err(repo_err)?;
        let commission_outcome = self
            .repo
            .apply_ledger_entry(LedgerEntry::credit(
                platform_wallet.id,
                commission,
                TransactionSource::Commission,
                booking_id.to_string(),
                format!("Commission for booking {}", booking_id),
            ))
            .await
            .map_err(repo_err)?;

        if matches!(payout_outcome, LedgerOutcome::AlreadyApplied(_))
            && matches!(commission_outcome, LedgerOutcome::AlreadyApplied(_))
        {
            return Ok(JobOutcome::AlreadyProcessed);
        }

        self.repo
            .append_audit(AuditEntry::record(
                booking_id.to_string(),
                "payout.settled",
                None,
                Some(json!({
                    "payout": amount.amount(),
                    "commission": commission.amount(),
                })),
                "worker",
            ))
            .await
            .map_err(repo_err)?;

        self.notifier
            .notify(&DomainEvent::PayoutProcessed {
                booking_id,
                partner_id,
                amount,
                commission,
            })
            .await;

        Ok(JobOutcome::Processed)
    }

    /// Returns money to the payer. When the booking's completed payment has
    /// a gateway transaction, the refund is initiated at the gateway (which
    /// deduplicates by our payment reference); otherwise the amount is
    /// credited to the payer's internal wallet.
    #[tracing::instrument(skip(self, reason), fields(booking_id = %booking_id))]
    pub async fn process_refund(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        amount: Money,
        reason: String,
    ) -> Result<JobOutcome, JobError> {
        let payment = self
            .repo
            .find_completed_payment_for_booking(booking_id)
            .await
            .map_err(repo_err)?;

        if let Some(payment) = &payment {
            if let Some(gateway_payment_id) = &payment.gateway_payment_id {
                let refund_id = self
                    .refunds
                    .initiate_refund(
                        payment.gateway,
                        gateway_payment_id,
                        amount,
                        &payment.reference,
                    )
                    .await
                    .map_err(|e| match e {
                        CollaboratorError::Unavailable(msg) => JobError::Retryable(msg),
                        CollaboratorError::Rejected(msg) => JobError::Fatal(msg),
                    })?;

                self.repo
                    .append_audit(AuditEntry::record(
                        booking_id.to_string(),
                        "refund.gateway_initiated",
                        None,
                        Some(json!({
                            "gateway": payment.gateway,
                            "gateway_refund_id": refund_id,
                            "amount": amount.amount(),
                            "reason": reason,
                        })),
                        "worker",
                    ))
                    .await
                    .map_err(repo_err)?;

                self.notifier
                    .notify(&DomainEvent::RefundProcessed {
                        booking_id,
                        user_id,
                        amount,
                    })
                    .await;

                tracing::info!(booking_id = %booking_id, %refund_id, "gateway refund initiated");
                return Ok(JobOutcome::Processed);
            }
        }

        // No gateway transaction to reverse; credit the internal wallet.
        let wallet = self
            .repo
            .get_or_create_wallet(WalletOwner::User(user_id))
            .await
            .map_err(repo_err)?;
        match self
            .repo
            .apply_ledger_entry(LedgerEntry::credit(
                wallet.id,
                amount,
                TransactionSource::Refund,
                booking_id.to_string(),
                format!("Refund for booking {}: {}", booking_id, reason),
            ))
            .await
            .map_err(repo_err)?
        {
            LedgerOutcome::AlreadyApplied(_) => Ok(JobOutcome::AlreadyProcessed),
            LedgerOutcome::Applied(tx) => {
                self.repo
                    .append_audit(AuditEntry::record(
                        booking_id.to_string(),
                        "refund.wallet_credited",
                        None,
                        Some(json!({
                            "amount": tx.amount.amount(),
                            "reason": reason,
                            "balance_after": tx.balance_after.amount(),
                        })),
                        "worker",
                    ))
                    .await
                    .map_err(repo_err)?;

                self.notifier
                    .notify(&DomainEvent::RefundProcessed {
                        booking_id,
                        user_id,
                        amount,
                    })
                    .await;

                Ok(JobOutcome::Processed)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runner
// ─────────────────────────────────────────────────────────────────────────────

/// Polls the queue and routes each job to its processor.
pub struct JobRunner<R: SettlementRepository, Q: JobQueue> {
    queue: Arc<Q>,
    commission: CommissionProcessor<R>,
    wallet: WalletProcessor<R>,
    poll_interval: Duration,
    batch_size: usize,
}

impl<R: SettlementRepository, Q: JobQueue> JobRunner<R, Q> {
    pub fn new(
        queue: Arc<Q>,
        commission: CommissionProcessor<R>,
        wallet: WalletProcessor<R>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            commission,
            wallet,
            poll_interval,
            batch_size: 10,
        }
    }

    /// Runs the consumer loop until the task is aborted.
    pub async fn run(self) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "job runner started"
        );
        loop {
            match self.queue.pull_due(self.batch_size).await {
                Ok(jobs) => {
                    for job in jobs {
                        self.handle(job).await;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to pull jobs");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, attempt = job.attempts))]
    async fn handle(&self, job: Job) {
        let result = self.dispatch(&job).await;
        match result {
            Ok(outcome) => {
                if outcome == JobOutcome::AlreadyProcessed {
                    tracing::debug!(job_id = %job.id, "job was already processed");
                }
                if let Err(e) = self.queue.complete(&job.id).await {
                    tracing::warn!(job_id = %job.id, error = %e, "failed to mark job completed");
                }
            }
            Err(JobError::Retryable(msg)) => {
                tracing::warn!(job_id = %job.id, error = %msg, "job failed, retrying");
                match self.queue.retry(&job.id, &msg).await {
                    Ok(RetryDecision::Scheduled(at)) => {
                        tracing::info!(job_id = %job.id, retry_at = %at, "job rescheduled");
                    }
                    Ok(RetryDecision::DeadLettered) => {
                        tracing::error!(job_id = %job.id, error = %msg, "job dead-lettered after exhausting retries");
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, error = %e, "failed to record retry");
                    }
                }
            }
            Err(JobError::Fatal(msg)) => {
                tracing::error!(job_id = %job.id, error = %msg, "job failed fatally, dead-lettering");
                if let Err(e) = self.queue.bury(&job.id, &msg).await {
                    tracing::warn!(job_id = %job.id, error = %e, "failed to bury job");
                }
            }
        }
    }

    async fn dispatch(&self, job: &Job) -> Result<JobOutcome, JobError> {
        match job.payload.clone() {
            JobPayload::Commission {
                booking_id,
                partner_id,
                ..
            } => self.commission.process(booking_id, partner_id).await,
            JobPayload::WalletOperation {
                owner,
                amount,
                direction,
                reference_id,
                description,
            } => {
                self.wallet
                    .process_wallet_operation(owner, amount, direction, reference_id, description)
                    .await
            }
            JobPayload::PartnerPayout {
                booking_id,
                partner_id,
                amount,
                commission,
            } => {
                self.wallet
                    .process_partner_payout(booking_id, partner_id, amount, commission)
                    .await
            }
            JobPayload::Refund {
                booking_id,
                user_id,
                amount,
                reason,
            } => {
                self.wallet
                    .process_refund(booking_id, user_id, amount, reason)
                    .await
            }
        }
    }
}
