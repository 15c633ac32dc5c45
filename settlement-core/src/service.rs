//! Settlement Application Service
//!
//! Orchestrates the payment/booking state machine through the repository
//! and queue ports. `settle_payment` is the single authoritative entry
//! point for the `pending -> completed` transition; gateway webhooks and
//! the manual confirm endpoint both route through it.

use std::sync::Arc;

use serde_json::json;

use settlement_types::{
    AppError, AuditEntry, Booking, BookingId, BookingStatus, CommissionRate, CreateBookingRequest,
    CreatePaymentRequest, DomainEvent, GatewayEvent, GatewayEventKind, Job, JobId, JobQueue,
    KycCallbackRequest, KycGate, KycSession, KycVerification, Money, Notifier, PartnerId, Payment,
    PaymentId, PaymentStatus, QueueStats, RefundRequest, SettleOutcome, SettlementRecord,
    SettlementRepository, Wallet, WalletId, WalletOwner, WalletTransaction,
};

use crate::dispatch::JobDispatcher;

/// Business settings injected at startup.
#[derive(Debug, Clone)]
pub struct SettlementSettings {
    pub commission_rate: CommissionRate,
    /// Where the KYC provider sends the payer back after verification.
    pub kyc_return_url: String,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            commission_rate: CommissionRate::DEFAULT,
            kyc_return_url: "https://app.example.com/kyc/return".to_string(),
        }
    }
}

/// Application service for the settlement pipeline.
///
/// Generic over `R: SettlementRepository` and `Q: JobQueue` - adapters are
/// injected at compile time. Collaborators (KYC gate, notifier) sit behind
/// trait objects since they are pure IO boundaries.
pub struct SettlementService<R: SettlementRepository, Q: JobQueue> {
    repo: Arc<R>,
    dispatcher: JobDispatcher<Q>,
    kyc_gate: Arc<dyn KycGate>,
    notifier: Arc<dyn Notifier>,
    settings: SettlementSettings,
}

impl<R: SettlementRepository, Q: JobQueue> SettlementService<R, Q> {
    pub fn new(
        repo: Arc<R>,
        dispatcher: JobDispatcher<Q>,
        kyc_gate: Arc<dyn KycGate>,
        notifier: Arc<dyn Notifier>,
        settings: SettlementSettings,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            kyc_gate,
            notifier,
            settings,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn settings(&self) -> &SettlementSettings {
        &self.settings
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Booking & payment intake
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a booking with the settlement store.
    pub async fn create_booking(&self, req: CreateBookingRequest) -> Result<Booking, AppError> {
        let total = Money::new(req.amount, req.currency)?;
        let booking = Booking::new(req.user_id, req.partner_id, total)?;
        self.repo
            .create_booking(booking)
            .await
            .map_err(Into::into)
    }

    /// Gets a booking by id.
    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, AppError> {
        self.repo
            .get_booking(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Booking {}", id))))
    }

    /// Opens a payment attempt for a booking.
    pub async fn create_payment(&self, req: CreatePaymentRequest) -> Result<Payment, AppError> {
        let amount = Money::new(req.amount, req.currency)?;
        let booking = self.get_booking(req.booking_id).await?;

        if booking.status != BookingStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Booking {} is {}, not awaiting payment",
                booking.id, booking.status
            )));
        }

        let payment = Payment::new(req.booking_id, req.user_id, req.gateway, amount)?;
        let payment = self.repo.create_payment(payment).await?;

        self.repo
            .append_audit(AuditEntry::record(
                payment.id.to_string(),
                "payment.created",
                None,
                Some(json!({
                    "status": payment.status,
                    "reference": payment.reference,
                    "amount": payment.amount.amount(),
                })),
                "api",
            ))
            .await?;

        self.notifier
            .notify(&DomainEvent::PaymentInitiated {
                payment_id: payment.id,
                booking_id: payment.booking_id,
                user_id: payment.user_id,
                amount: payment.amount,
            })
            .await;

        Ok(payment)
    }

    /// Gets a payment by id.
    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, AppError> {
        self.repo
            .get_payment(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Payment {}", id))))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gateway events
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies a verified gateway event to the payment it references.
    #[tracing::instrument(skip(self, event), fields(gateway = %event.gateway, gateway_payment_id = %event.gateway_payment_id))]
    pub async fn apply_gateway_event(&self, event: GatewayEvent) -> Result<Payment, AppError> {
        let payment = self.locate_payment(&event).await?.ok_or_else(|| {
            AppError::NotFound(format!(
                "No payment matches gateway transaction {}",
                event.gateway_payment_id
            ))
        })?;

        let actor = format!("gateway:{}", event.gateway);
        match event.kind {
            GatewayEventKind::PaymentCaptured => {
                let record = SettlementRecord {
                    gateway_payment_id: event.gateway_payment_id,
                    gateway_order_id: event.gateway_order_id,
                    gateway_response: Some(event.raw),
                };
                self.settle_payment(payment.id, record, &actor).await
            }
            GatewayEventKind::PaymentFailed => {
                let reason = event
                    .failure_reason
                    .unwrap_or_else(|| "payment failed at gateway".to_string());
                self.fail_payment(payment.id, reason, Some(event.raw), &actor)
                    .await
            }
        }
    }

    async fn locate_payment(&self, event: &GatewayEvent) -> Result<Option<Payment>, AppError> {
        if let Some(reference) = &event.payment_reference {
            if let Some(payment) = self.repo.find_payment_by_reference(reference).await? {
                return Ok(Some(payment));
            }
        }
        if let Some(order_id) = &event.gateway_order_id {
            if let Some(payment) = self.repo.find_payment_by_gateway_order(order_id).await? {
                return Ok(Some(payment));
            }
        }
        Ok(None)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State machine: pending -> completed
    // ─────────────────────────────────────────────────────────────────────────

    /// Settles a pending payment and drives the booking forward.
    ///
    /// Re-applying an equivalent event (same gateway transaction id) is a
    /// no-op returning success; a terminal payment with a different
    /// transaction id is a conflict that is logged, audited, and never
    /// overwritten.
    #[tracing::instrument(skip(self, record), fields(payment_id = %id))]
    pub async fn settle_payment(
        &self,
        id: PaymentId,
        record: SettlementRecord,
        actor: &str,
    ) -> Result<Payment, AppError> {
        let payment = self.get_payment(id).await?;

        if payment.status.is_terminal() {
            return self
                .resolve_redelivery(payment, &record.gateway_payment_id)
                .await;
        }

        // Pure query, evaluated before the settle write so the count does
        // not include this payment: the KYC gate only applies to a user's
        // very first completed payment.
        let prior_completed = self.repo.count_completed_payments(payment.user_id).await?;
        let already_verified = self.repo.is_user_verified(payment.user_id).await?;
        let kyc_required = prior_completed == 0 && !already_verified;

        let settled = match self.repo.settle_payment(id, record.clone()).await? {
            SettleOutcome::Settled(p) => p,
            // Lost the race against a concurrent redelivery; fall back to
            // the same idempotency check the early return uses.
            SettleOutcome::AlreadyTerminal(p) => {
                return self
                    .resolve_redelivery(p, &record.gateway_payment_id)
                    .await;
            }
        };

        self.repo
            .append_audit(AuditEntry::record(
                settled.id.to_string(),
                "payment.completed",
                Some(json!({ "status": PaymentStatus::Pending })),
                Some(json!({
                    "status": settled.status,
                    "gateway_payment_id": settled.gateway_payment_id,
                })),
                actor,
            ))
            .await?;

        let booking = self.get_booking(settled.booking_id).await?;

        if kyc_required {
            self.hold_for_kyc(&settled, &booking, actor).await?;
        } else {
            self.confirm_booking(&booking, actor).await?;
        }

        self.notifier
            .notify(&DomainEvent::PaymentCompleted {
                payment_id: settled.id,
                booking_id: settled.booking_id,
                user_id: settled.user_id,
                amount: settled.amount,
                kyc_required,
            })
            .await;

        // Re-read so the response reflects the KYC fields set above.
        Ok(self.repo.get_payment(id).await?.unwrap_or(settled))
    }

    /// Decides what a redelivered event against a terminal payment means.
    async fn resolve_redelivery(
        &self,
        payment: Payment,
        gateway_payment_id: &str,
    ) -> Result<Payment, AppError> {
        if payment.status == PaymentStatus::Completed
            && payment.matches_gateway_transaction(gateway_payment_id)
        {
            tracing::debug!(payment_id = %payment.id, "redelivered settlement event is a no-op");
            return Ok(payment);
        }

        tracing::error!(
            payment_id = %payment.id,
            status = %payment.status,
            recorded = ?payment.gateway_payment_id,
            incoming = %gateway_payment_id,
            "conflicting settlement for terminal payment"
        );
        self.repo
            .append_audit(AuditEntry::record(
                payment.id.to_string(),
                "payment.conflict",
                Some(json!({
                    "status": payment.status,
                    "gateway_payment_id": payment.gateway_payment_id,
                })),
                Some(json!({ "incoming_gateway_payment_id": gateway_payment_id })),
                "gateway",
            ))
            .await?;

        Err(AppError::Conflict(format!(
            "Payment {} is already {} under a different gateway transaction",
            payment.id, payment.status
        )))
    }

    /// Parks the booking behind identity verification. The hold stands
    /// even when the provider is unreachable - the check is never waived.
    async fn hold_for_kyc(
        &self,
        payment: &Payment,
        booking: &Booking,
        actor: &str,
    ) -> Result<(), AppError> {
        self.repo
            .set_booking_status(booking.id, BookingStatus::PendingKyc)
            .await?;

        // Reuse a still-pending session before opening a new one.
        let session = match self.repo.find_pending_kyc(payment.user_id).await? {
            Some(existing) => Some(KycSession {
                verification_id: existing.provider_verification_id,
                verification_url: existing.verification_url,
            }),
            None => {
                match self
                    .kyc_gate
                    .initiate(payment.user_id, booking.id, &self.settings.kyc_return_url)
                    .await
                {
                    Ok(session) => {
                        self.repo
                            .insert_kyc_verification(KycVerification::new(
                                payment.user_id,
                                booking.id,
                                payment.id,
                                session.clone(),
                            ))
                            .await?;
                        Some(session)
                    }
                    Err(e) => {
                        tracing::error!(
                            booking_id = %booking.id,
                            error = %e,
                            "failed to open KYC session; booking stays gated without one"
                        );
                        None
                    }
                }
            }
        };

        let verification_id = session.map(|s| s.verification_id);
        self.repo
            .set_booking_kyc_verification(booking.id, verification_id.clone())
            .await?;
        self.repo
            .set_payment_kyc(payment.id, verification_id.clone())
            .await?;

        self.repo
            .append_audit(AuditEntry::record(
                booking.id.to_string(),
                "booking.pending_kyc",
                Some(json!({ "status": booking.status })),
                Some(json!({
                    "status": BookingStatus::PendingKyc,
                    "verification_id": verification_id,
                })),
                actor,
            ))
            .await?;
        Ok(())
    }

    /// Confirms the booking and enqueues its commission job. The enqueue
    /// happens after the confirmed status is persisted, preserving the
    /// per-booking ordering guarantee.
    async fn confirm_booking(&self, booking: &Booking, actor: &str) -> Result<(), AppError> {
        let confirmed = self
            .repo
            .set_booking_status(booking.id, BookingStatus::Confirmed)
            .await?;

        let job_id = self
            .dispatcher
            .enqueue_commission(booking.id, booking.partner_id, booking.user_id)
            .await?;

        self.repo
            .append_audit(AuditEntry::record(
                booking.id.to_string(),
                "booking.confirmed",
                Some(json!({ "status": booking.status })),
                Some(json!({
                    "status": confirmed.status,
                    "commission_job_id": job_id,
                })),
                actor,
            ))
            .await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State machine: pending -> failed / cancelled
    // ─────────────────────────────────────────────────────────────────────────

    /// Fails a pending payment. A booking held for KYC by this payment is
    /// released back to `pending` - it must never stay gated with no
    /// active payment.
    #[tracing::instrument(skip(self, gateway_response), fields(payment_id = %id))]
    pub async fn fail_payment(
        &self,
        id: PaymentId,
        reason: String,
        gateway_response: Option<serde_json::Value>,
        actor: &str,
    ) -> Result<Payment, AppError> {
        let payment = self.get_payment(id).await?;

        if payment.status.is_terminal() {
            if payment.status == PaymentStatus::Failed {
                return Ok(payment);
            }
            return Err(AppError::Conflict(format!(
                "Payment {} is already {}",
                payment.id, payment.status
            )));
        }

        let failed = match self
            .repo
            .fail_payment(id, reason.clone(), gateway_response)
            .await?
        {
            SettleOutcome::Settled(p) => p,
            SettleOutcome::AlreadyTerminal(p) => {
                if p.status == PaymentStatus::Failed {
                    return Ok(p);
                }
                return Err(AppError::Conflict(format!(
                    "Payment {} is already {}",
                    p.id, p.status
                )));
            }
        };

        self.repo
            .append_audit(AuditEntry::record(
                failed.id.to_string(),
                "payment.failed",
                Some(json!({ "status": PaymentStatus::Pending })),
                Some(json!({ "status": failed.status, "reason": reason })),
                actor,
            ))
            .await?;

        let booking = self.get_booking(failed.booking_id).await?;
        if booking.status == BookingStatus::PendingKyc {
            self.repo
                .set_booking_status(booking.id, BookingStatus::Pending)
                .await?;
            self.repo
                .set_booking_kyc_verification(booking.id, None)
                .await?;
            self.repo
                .append_audit(AuditEntry::record(
                    booking.id.to_string(),
                    "booking.kyc_hold_released",
                    Some(json!({ "status": BookingStatus::PendingKyc })),
                    Some(json!({ "status": BookingStatus::Pending })),
                    actor,
                ))
                .await?;
        }

        self.notifier
            .notify(&DomainEvent::PaymentFailed {
                payment_id: failed.id,
                booking_id: failed.booking_id,
                user_id: failed.user_id,
                reason,
            })
            .await;

        Ok(failed)
    }

    /// Cancels a still-pending payment (payer abandoned the attempt).
    #[tracing::instrument(skip(self), fields(payment_id = %id))]
    pub async fn cancel_payment(&self, id: PaymentId, actor: &str) -> Result<Payment, AppError> {
        let payment = self.get_payment(id).await?;
        if payment.status.is_terminal() {
            if payment.status == PaymentStatus::Cancelled {
                return Ok(payment);
            }
            return Err(AppError::Conflict(format!(
                "Payment {} is already {}",
                payment.id, payment.status
            )));
        }

        let cancelled = match self.repo.cancel_payment(id).await? {
            SettleOutcome::Settled(p) => p,
            SettleOutcome::AlreadyTerminal(p) => {
                if p.status == PaymentStatus::Cancelled {
                    return Ok(p);
                }
                return Err(AppError::Conflict(format!(
                    "Payment {} is already {}",
                    p.id, p.status
                )));
            }
        };

        self.repo
            .append_audit(AuditEntry::record(
                cancelled.id.to_string(),
                "payment.cancelled",
                Some(json!({ "status": PaymentStatus::Pending })),
                Some(json!({ "status": cancelled.status })),
                actor,
            ))
            .await?;

        Ok(cancelled)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // KYC completion callback
    // ─────────────────────────────────────────────────────────────────────────

    /// Clears a booking's KYC hold. This is the only place a commission
    /// job is enqueued late.
    #[tracing::instrument(skip(self, req), fields(user_id = %req.user_id, verification_id = %req.verification_id))]
    pub async fn handle_kyc_completion(
        &self,
        req: KycCallbackRequest,
    ) -> Result<Booking, AppError> {
        let verification = self
            .repo
            .complete_kyc_verification(&req.verification_id, req.user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No pending verification {} for user {}",
                    req.verification_id, req.user_id
                ))
            })?;

        self.repo.set_user_verified(req.user_id, true).await?;

        let booking = self.get_booking(verification.booking_id).await?;
        if booking.status != BookingStatus::PendingKyc {
            // Hold already released (payment failed) or booking already
            // confirmed; the callback is idempotent.
            tracing::info!(booking_id = %booking.id, status = %booking.status, "KYC callback with no hold to clear");
            return Ok(booking);
        }

        // Confirm only when the payment that requested the hold is the one
        // that completed.
        let payment = self
            .repo
            .find_completed_payment_for_booking(booking.id)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Booking {} is gated but has no completed payment",
                    booking.id
                ))
            })?;

        if payment.kyc_verification_id.as_deref() != Some(req.verification_id.as_str()) {
            tracing::error!(
                booking_id = %booking.id,
                payment_id = %payment.id,
                expected = ?payment.kyc_verification_id,
                got = %req.verification_id,
                "KYC callback does not match the session that gated this booking"
            );
            return Err(AppError::Conflict(format!(
                "Verification {} did not gate booking {}",
                req.verification_id, booking.id
            )));
        }

        self.confirm_booking(&booking, "kyc").await?;

        self.repo
            .append_audit(AuditEntry::record(
                booking.id.to_string(),
                "kyc.completed",
                None,
                Some(json!({ "verification_id": req.verification_id })),
                "kyc",
            ))
            .await?;

        self.notifier
            .notify(&DomainEvent::KycCompleted {
                booking_id: booking.id,
                user_id: req.user_id,
                verification_id: req.verification_id,
            })
            .await;

        self.get_booking(booking.id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refunds
    // ─────────────────────────────────────────────────────────────────────────

    /// Queues a refund for a booking at the highest priority.
    #[tracing::instrument(skip(self, req), fields(booking_id = %booking_id))]
    pub async fn request_refund(
        &self,
        booking_id: BookingId,
        req: RefundRequest,
    ) -> Result<JobId, AppError> {
        let booking = self.get_booking(booking_id).await?;
        let amount = Money::new(req.amount, req.currency)?;
        if amount.is_zero() {
            return Err(AppError::BadRequest("Refund amount must be positive".into()));
        }
        // Also catches currency mismatches.
        booking
            .total
            .checked_sub(amount)
            .map_err(|e| AppError::BadRequest(format!("Refund exceeds booking total: {}", e)))?;

        let job_id = self
            .dispatcher
            .enqueue_refund(booking.id, booking.user_id, amount, req.reason.clone())
            .await?;

        self.repo
            .append_audit(AuditEntry::record(
                booking.id.to_string(),
                "refund.requested",
                None,
                Some(json!({
                    "amount": amount.amount(),
                    "reason": req.reason,
                    "job_id": job_id,
                })),
                "api",
            ))
            .await?;

        Ok(job_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admin reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Audit trail for one aggregate, oldest first.
    pub async fn audit_trail(&self, aggregate_id: &str) -> Result<Vec<AuditEntry>, AppError> {
        self.repo.list_audit(aggregate_id).await.map_err(Into::into)
    }

    /// Jobs that exhausted their retry budget.
    pub async fn dead_letters(&self) -> Result<Vec<Job>, AppError> {
        self.dispatcher
            .queue()
            .dead_letters()
            .await
            .map_err(Into::into)
    }

    /// Queue counters.
    pub async fn queue_stats(&self) -> Result<QueueStats, AppError> {
        self.dispatcher.queue().stats().await.map_err(Into::into)
    }

    /// A partner's wallet, created empty on first read.
    pub async fn partner_wallet(&self, partner_id: PartnerId) -> Result<Wallet, AppError> {
        self.repo
            .get_or_create_wallet(WalletOwner::Partner(partner_id))
            .await
            .map_err(Into::into)
    }

    /// Ledger rows for a wallet, oldest first.
    pub async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        self.repo
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet {}", wallet_id)))?;
        self.repo
            .list_wallet_transactions(wallet_id)
            .await
            .map_err(Into::into)
    }
}
