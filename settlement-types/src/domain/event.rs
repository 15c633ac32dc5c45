//! Gateway events and domain events.

use serde::{Deserialize, Serialize};

use super::booking::{BookingId, PartnerId, UserId};
use super::money::Money;
use super::payment::{Gateway, PaymentId};

/// What a verified gateway callback reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEventKind {
    /// The gateway captured the payment.
    PaymentCaptured,
    /// The gateway gave up on the payment.
    PaymentFailed,
}

/// A gateway callback after signature verification, normalized to a
/// gateway-agnostic shape. Gateway-specific field names are translated in
/// the verifier, nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub gateway: Gateway,
    pub kind: GatewayEventKind,
    /// Gateway-side transaction id.
    pub gateway_payment_id: String,
    pub gateway_order_id: Option<String>,
    /// Our payment reference, when the gateway echoes it back.
    pub payment_reference: Option<String>,
    pub amount: Option<i64>,
    pub failure_reason: Option<String>,
    /// The verified body, kept for the payment's gateway_response field.
    pub raw: serde_json::Value,
}

/// The closed set of domain events the pipeline emits. Handlers (the
/// notification collaborator) match on this exhaustively, so adding an
/// event is a compile-visible change everywhere it must be handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    PaymentInitiated {
        payment_id: PaymentId,
        booking_id: BookingId,
        user_id: UserId,
        amount: Money,
    },
    PaymentCompleted {
        payment_id: PaymentId,
        booking_id: BookingId,
        user_id: UserId,
        amount: Money,
        kyc_required: bool,
    },
    PaymentFailed {
        payment_id: PaymentId,
        booking_id: BookingId,
        user_id: UserId,
        reason: String,
    },
    KycCompleted {
        booking_id: BookingId,
        user_id: UserId,
        verification_id: String,
    },
    PayoutProcessed {
        booking_id: BookingId,
        partner_id: PartnerId,
        amount: Money,
        commission: Money,
    },
    RefundProcessed {
        booking_id: BookingId,
        user_id: UserId,
        amount: Money,
    },
}

impl DomainEvent {
    /// Stable event name for logs and the audit trail.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::PaymentInitiated { .. } => "payment.initiated",
            DomainEvent::PaymentCompleted { .. } => "payment.completed",
            DomainEvent::PaymentFailed { .. } => "payment.failed",
            DomainEvent::KycCompleted { .. } => "kyc.completed",
            DomainEvent::PayoutProcessed { .. } => "payout.processed",
            DomainEvent::RefundProcessed { .. } => "refund.processed",
        }
    }
}
