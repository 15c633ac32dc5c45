//! Job dispatch policy.
//!
//! The dispatcher is the only place enqueue options are decided: commission
//! jobs get a short delay so the payment write settles before a worker
//! reads the booking, refunds jump the queue, and everything else runs at
//! medium priority. Job ids are deterministic from the payload, so a
//! redelivered webhook that races the state machine's idempotency check
//! still collapses to one job.

use std::sync::Arc;
use std::time::Duration;

use settlement_types::{
    AppError, BookingId, EnqueueOptions, EntryDirection, JobId, JobPayload, JobPriority, JobQueue,
    Money, PartnerId, UserId, WalletOwner,
};

/// Scheduling knobs for the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    /// Delay before a commission job becomes due.
    pub commission_delay: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            commission_delay: Duration::from_secs(5),
        }
    }
}

/// Enqueues settlement jobs with kind-specific scheduling.
pub struct JobDispatcher<Q: JobQueue> {
    queue: Arc<Q>,
    policy: DispatchPolicy,
}

impl<Q: JobQueue> JobDispatcher<Q> {
    pub fn new(queue: Arc<Q>, policy: DispatchPolicy) -> Self {
        Self { queue, policy }
    }

    /// Returns the underlying queue (admin reads).
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Enqueues the commission split for a confirmed booking.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn enqueue_commission(
        &self,
        booking_id: BookingId,
        partner_id: PartnerId,
        user_id: UserId,
    ) -> Result<JobId, AppError> {
        let payload = JobPayload::Commission {
            booking_id,
            partner_id,
            user_id,
        };
        let opts = EnqueueOptions {
            delay: self.policy.commission_delay,
            priority: JobPriority::Medium,
        };
        self.queue.enqueue(payload, opts).await.map_err(Into::into)
    }

    /// Enqueues a generic wallet credit/debit.
    #[tracing::instrument(skip(self), fields(reference_id = %reference_id))]
    pub async fn enqueue_wallet_operation(
        &self,
        owner: WalletOwner,
        amount: Money,
        direction: EntryDirection,
        reference_id: String,
        description: String,
    ) -> Result<JobId, AppError> {
        let payload = JobPayload::WalletOperation {
            owner,
            amount,
            direction,
            reference_id,
            description,
        };
        self.queue
            .enqueue(payload, EnqueueOptions::default())
            .await
            .map_err(Into::into)
    }

    /// Enqueues a partner payout outside the commission flow.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn enqueue_partner_payout(
        &self,
        booking_id: BookingId,
        partner_id: PartnerId,
        amount: Money,
        commission: Money,
    ) -> Result<JobId, AppError> {
        let payload = JobPayload::PartnerPayout {
            booking_id,
            partner_id,
            amount,
            commission,
        };
        self.queue
            .enqueue(payload, EnqueueOptions::default())
            .await
            .map_err(Into::into)
    }

    /// Enqueues a refund at the highest priority.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn enqueue_refund(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        amount: Money,
        reason: String,
    ) -> Result<JobId, AppError> {
        let payload = JobPayload::Refund {
            booking_id,
            user_id,
            amount,
            reason,
        };
        let opts = EnqueueOptions {
            delay: Duration::ZERO,
            priority: JobPriority::High,
        };
        self.queue.enqueue(payload, opts).await.map_err(Into::into)
    }
}
