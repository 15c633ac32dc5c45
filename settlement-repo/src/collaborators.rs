//! Collaborator adapters: the KYC provider, the refund side of the payment
//! gateways, and the notification fan-out.
//!
//! The HTTP adapters distinguish "could not reach the collaborator"
//! (retryable) from "the collaborator said no" (fatal); the static variants
//! back local development and demos without external services.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use settlement_types::{
    BookingId, CollaboratorError, DomainEvent, Gateway, KycGate, KycSession, Money, Notifier,
    RefundGateway, UserId,
};

const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────
// KYC provider
// ─────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OpenVerificationRequest<'a> {
    user_id: UserId,
    booking_id: BookingId,
    return_url: &'a str,
}

#[derive(Deserialize)]
struct OpenVerificationResponse {
    verification_id: String,
    verification_url: String,
}

/// KYC provider reached over HTTP.
pub struct HttpKycGate {
    client: reqwest::Client,
    base_url: String,
}

impl HttpKycGate {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(COLLABORATOR_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }
}

#[async_trait::async_trait]
impl KycGate for HttpKycGate {
    #[tracing::instrument(skip(self), fields(user_id = %user_id, booking_id = %booking_id))]
    async fn initiate(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        return_url: &str,
    ) -> Result<KycSession, CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/verifications", self.base_url))
            .json(&OpenVerificationRequest {
                user_id,
                booking_id,
                return_url,
            })
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Rejected(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: OpenVerificationResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Rejected(e.to_string()))?;

        info!(verification_id = %body.verification_id, "Opened KYC verification session");
        Ok(KycSession {
            verification_id: body.verification_id,
            verification_url: body.verification_url,
        })
    }
}

/// Dev-mode KYC gate: every session opens immediately with a synthetic id.
/// The callback endpoint still has to be hit to clear the hold.
pub struct StaticKycGate;

#[async_trait::async_trait]
impl KycGate for StaticKycGate {
    async fn initiate(
        &self,
        _user_id: UserId,
        _booking_id: BookingId,
        return_url: &str,
    ) -> Result<KycSession, CollaboratorError> {
        let verification_id = format!("ver_{}", Uuid::new_v4().simple());
        Ok(KycSession {
            verification_url: format!("{}?session={}", return_url, verification_id),
            verification_id,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Refund gateway
// ─────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InitiateRefundRequest<'a> {
    gateway: Gateway,
    gateway_payment_id: &'a str,
    amount: i64,
    currency: settlement_types::Currency,
    /// Dedupe key on the gateway side; redelivered requests with the same
    /// reference return the original refund.
    reference: &'a str,
}

#[derive(Deserialize)]
struct InitiateRefundResponse {
    refund_id: String,
}

/// Refund initiation against the gateways' refund API (via an internal
/// proxy that holds the gateway credentials).
pub struct HttpRefundGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRefundGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(COLLABORATOR_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }
}

#[async_trait::async_trait]
impl RefundGateway for HttpRefundGateway {
    #[tracing::instrument(skip(self), fields(gateway = %gateway, reference = %reference))]
    async fn initiate_refund(
        &self,
        gateway: Gateway,
        gateway_payment_id: &str,
        amount: Money,
        reference: &str,
    ) -> Result<String, CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/refunds", self.base_url))
            .json(&InitiateRefundRequest {
                gateway,
                gateway_payment_id,
                amount: amount.amount(),
                currency: amount.currency(),
                reference,
            })
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(CollaboratorError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(CollaboratorError::Rejected(format!("HTTP {}", status)));
        }

        let body: InitiateRefundResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Rejected(e.to_string()))?;

        info!(refund_id = %body.refund_id, "Initiated gateway refund");
        Ok(body.refund_id)
    }
}

/// Dev-mode refund gateway: accepts everything, returns a synthetic id.
pub struct StaticRefundGateway;

#[async_trait::async_trait]
impl RefundGateway for StaticRefundGateway {
    async fn initiate_refund(
        &self,
        gateway: Gateway,
        gateway_payment_id: &str,
        amount: Money,
        _reference: &str,
    ) -> Result<String, CollaboratorError> {
        info!(%gateway, gateway_payment_id, %amount, "Static refund gateway accepted refund");
        Ok(format!("rfnd_{}", Uuid::new_v4().simple()))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Notifier
// ─────────────────────────────────────────────────────────────────────────

/// Notifier that writes every domain event to the structured log. Stands in
/// for the email/push fan-out owned by the wider backend.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &DomainEvent) {
        match event {
            DomainEvent::PaymentInitiated {
                payment_id,
                booking_id,
                user_id,
                amount,
            } => info!(
                event = event.name(), %payment_id, %booking_id, %user_id, %amount,
                "Payment initiated"
            ),
            DomainEvent::PaymentCompleted {
                payment_id,
                booking_id,
                user_id,
                amount,
                kyc_required,
            } => info!(
                event = event.name(), %payment_id, %booking_id, %user_id, %amount, kyc_required,
                "Payment completed"
            ),
            DomainEvent::PaymentFailed {
                payment_id,
                booking_id,
                user_id,
                reason,
            } => info!(
                event = event.name(), %payment_id, %booking_id, %user_id, reason,
                "Payment failed"
            ),
            DomainEvent::KycCompleted {
                booking_id,
                user_id,
                verification_id,
            } => info!(
                event = event.name(), %booking_id, %user_id, verification_id,
                "KYC verification completed"
            ),
            DomainEvent::PayoutProcessed {
                booking_id,
                partner_id,
                amount,
                commission,
            } => info!(
                event = event.name(), %booking_id, %partner_id, %amount, %commission,
                "Partner payout processed"
            ),
            DomainEvent::RefundProcessed {
                booking_id,
                user_id,
                amount,
            } => info!(
                event = event.name(), %booking_id, %user_id, %amount,
                "Refund processed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settlement_types::Currency;

    #[tokio::test]
    async fn test_static_kyc_gate_embeds_session_in_return_url() {
        let session = StaticKycGate
            .initiate(UserId::new(), BookingId::new(), "https://app.test/kyc/done")
            .await
            .unwrap();
        assert!(session.verification_id.starts_with("ver_"));
        assert!(session
            .verification_url
            .contains(&session.verification_id));
    }

    #[tokio::test]
    async fn test_static_refund_gateway_returns_refund_id() {
        let refund_id = StaticRefundGateway
            .initiate_refund(
                Gateway::Razorpay,
                "pay_123",
                Money::new(1_000, Currency::INR).unwrap(),
                "PAY-abc",
            )
            .await
            .unwrap();
        assert!(refund_id.starts_with("rfnd_"));
    }
}
