//! KYC verification domain model.
//!
//! Identity verification itself happens at an external provider; the core
//! only tracks the session it opened for a gated booking and whether that
//! session cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::{BookingId, UserId};
use super::payment::PaymentId;

/// A verification session opened at the external KYC provider.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct KycSession {
    /// Provider-side session id, echoed back in the completion callback.
    pub verification_id: String,
    /// URL the payer is sent to.
    pub verification_url: String,
}

/// Lifecycle of a verification session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for KycStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KycStatus::Pending => write!(f, "PENDING"),
            KycStatus::Approved => write!(f, "APPROVED"),
            KycStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Tracks one verification session and the booking/payment it gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycVerification {
    pub id: Uuid,
    pub user_id: UserId,
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub provider_verification_id: String,
    pub verification_url: String,
    pub status: KycStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl KycVerification {
    /// Opens a new pending verification for a gated booking.
    pub fn new(
        user_id: UserId,
        booking_id: BookingId,
        payment_id: PaymentId,
        session: KycSession,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            booking_id,
            payment_id,
            provider_verification_id: session.verification_id,
            verification_url: session.verification_url,
            status: KycStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
