//! Payment domain model.
//!
//! A Payment is an append-only financial record: status only moves forward
//! (`pending` into exactly one terminal state) and the gateway identifiers
//! become immutable once a terminal state is reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::{BookingId, UserId};
use super::money::Money;
use crate::error::DomainError;

/// Unique identifier for a Payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    /// Creates a new random PaymentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a PaymentId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the UUID value.
    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PaymentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// External payment gateways that call back via webhook.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Razorpay,
    Stripe,
}

impl Gateway {
    /// Header each gateway uses to carry the webhook signature.
    pub fn signature_header(&self) -> &'static str {
        match self {
            Gateway::Razorpay => "x-razorpay-signature",
            Gateway::Stripe => "stripe-signature",
        }
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gateway::Razorpay => write!(f, "razorpay"),
            Gateway::Stripe => write!(f, "stripe"),
        }
    }
}

impl std::str::FromStr for Gateway {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "razorpay" => Ok(Gateway::Razorpay),
            "stripe" => Ok(Gateway::Stripe),
            other => Err(format!("Unknown gateway: {}", other)),
        }
    }
}

/// Payment lifecycle states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Completed => write!(f, "COMPLETED"),
            PaymentStatus::Failed => write!(f, "FAILED"),
            PaymentStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One attempt to collect money for a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// External payment reference handed to the gateway (shows up back in
    /// webhook payload metadata).
    pub reference: String,
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub gateway: Gateway,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Gateway-side transaction id; unique once set.
    pub gateway_payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
    /// Raw gateway response, kept opaque for reconciliation.
    pub gateway_response: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    /// Whether this payment gated its booking on identity verification,
    /// and the provider session that clears the hold.
    pub kyc_required: bool,
    pub kyc_verification_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates a new pending payment for a booking.
    pub fn new(
        booking_id: BookingId,
        user_id: UserId,
        gateway: Gateway,
        amount: Money,
    ) -> Result<Self, DomainError> {
        if amount.amount() <= 0 {
            return Err(DomainError::NonPositiveAmount);
        }
        Ok(Self {
            id: PaymentId::new(),
            reference: format!("PAY-{}", Uuid::new_v4().simple()),
            booking_id,
            user_id,
            gateway,
            amount,
            status: PaymentStatus::Pending,
            gateway_payment_id: None,
            gateway_order_id: None,
            gateway_response: None,
            failure_reason: None,
            kyc_required: false,
            kyc_verification_id: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        })
    }

    /// Whether a redelivered gateway event is equivalent to the settlement
    /// already recorded on this payment.
    pub fn matches_gateway_transaction(&self, gateway_payment_id: &str) -> bool {
        self.gateway_payment_id.as_deref() == Some(gateway_payment_id)
    }
}

/// Fields recorded when a payment settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub gateway_payment_id: String,
    pub gateway_order_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
}

/// Result of a compare-and-set status transition at the repository.
///
/// Only one of N concurrent redeliveries observes `Settled`; the rest see
/// the row already terminal and re-run the idempotency check on it.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// This caller performed the transition.
    Settled(Payment),
    /// The payment was already in a terminal state.
    AlreadyTerminal(Payment),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    #[test]
    fn test_payment_requires_positive_amount() {
        let result = Payment::new(
            BookingId::new(),
            UserId::new(),
            Gateway::Razorpay,
            Money::zero(Currency::INR),
        );
        assert!(matches!(result, Err(DomainError::NonPositiveAmount)));
    }

    #[test]
    fn test_new_payment_is_pending() {
        let payment = Payment::new(
            BookingId::new(),
            UserId::new(),
            Gateway::Razorpay,
            Money::new(250_000, Currency::INR).unwrap(),
        )
        .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.reference.starts_with("PAY-"));
        assert!(!payment.status.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }
}
