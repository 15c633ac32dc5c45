//! Booking domain model.
//!
//! Bookings are owned by the wider marketplace backend; the settlement
//! pipeline only reads them and moves their `status` (plus the KYC session
//! reference) through the gated confirmation flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Money;

/// Unique identifier for a Booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random BookingId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a BookingId from an existing UUID.
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

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BookingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a paying user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a space partner (the party paid out on settlement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct PartnerId(Uuid);

impl PartnerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for PartnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PartnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PartnerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Booking lifecycle states the settlement pipeline moves between.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Awaiting a completed payment.
    Pending,
    /// Payment completed but the payer must finish identity verification.
    PendingKyc,
    /// Payment completed and any KYC hold cleared.
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Whether the settlement pipeline may move a booking from `self` to `next`.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::PendingKyc)
                | (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::PendingKyc, BookingStatus::Confirmed)
                | (BookingStatus::PendingKyc, BookingStatus::Pending)
                | (BookingStatus::PendingKyc, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "PENDING"),
            BookingStatus::PendingKyc => write!(f, "PENDING_KYC"),
            BookingStatus::Confirmed => write!(f, "CONFIRMED"),
            BookingStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A space booking, as far as settlement cares about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub partner_id: PartnerId,
    /// Total amount the payer was charged.
    pub total: Money,
    pub status: BookingStatus,
    /// Provider-side verification session id while the booking is gated.
    pub kyc_verification_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Creates a new pending booking.
    pub fn new(user_id: UserId, partner_id: PartnerId, total: Money) -> Result<Self, crate::error::DomainError> {
        if total.amount() <= 0 {
            return Err(crate::error::DomainError::NonPositiveAmount);
        }
        Ok(Self {
            id: BookingId::new(),
            user_id,
            partner_id,
            total,
            status: BookingStatus::Pending,
            kyc_verification_id: None,
            created_at: Utc::now(),
            confirmed_at: None,
        })
    }

    /// Reconstructs a booking from stored fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: BookingId,
        user_id: UserId,
        partner_id: PartnerId,
        total: Money,
        status: BookingStatus,
        kyc_verification_id: Option<String>,
        created_at: DateTime<Utc>,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            user_id,
            partner_id,
            total,
            status,
            kyc_verification_id,
            created_at,
            confirmed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    #[test]
    fn test_booking_requires_positive_total() {
        let result = Booking::new(
            UserId::new(),
            PartnerId::new(),
            Money::zero(Currency::INR),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_kyc_hold_can_be_released() {
        assert!(BookingStatus::PendingKyc.can_transition_to(BookingStatus::Pending));
        assert!(BookingStatus::PendingKyc.can_transition_to(BookingStatus::Confirmed));
    }

    #[test]
    fn test_confirmed_cannot_regress() {
        assert!(!BookingStatus::Confirmed.can_transition_to(BookingStatus::Pending));
        assert!(!BookingStatus::Confirmed.can_transition_to(BookingStatus::PendingKyc));
    }
}
