//! Collaborator ports: external systems the pipeline talks to but does
//! not own.

use crate::domain::{BookingId, DomainEvent, Gateway, KycSession, Money, UserId};
use crate::error::CollaboratorError;

/// Identity-verification provider, invoked when a first-time payer must
/// verify before their booking is confirmed.
#[async_trait::async_trait]
pub trait KycGate: Send + Sync + 'static {
    /// Opens a verification session and returns the id/URL the payer is
    /// sent to. The provider later calls back with the same id.
    async fn initiate(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        return_url: &str,
    ) -> Result<KycSession, CollaboratorError>;
}

/// Fire-and-forget notification fan-out. Failures are the adapter's
/// problem and must never roll back a financial write, so there is no
/// error channel here.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, event: &DomainEvent);
}

/// Gateway-side refund initiation. The refund itself completes
/// asynchronously at the gateway and is reconciled via its own webhook.
#[async_trait::async_trait]
pub trait RefundGateway: Send + Sync + 'static {
    /// Returns the gateway-side refund id.
    async fn initiate_refund(
        &self,
        gateway: Gateway,
        gateway_payment_id: &str,
        amount: Money,
        reference: &str,
    ) -> Result<String, CollaboratorError>;
}
