//! Wallet ledger domain model.
//!
//! A wallet's balance is only ever mutated through `apply ledger entry`,
//! which writes an immutable WalletTransaction row and the new balance in
//! one atomic step. The `(reference_id, source)` pair on each row is the
//! idempotency key that makes job redelivery safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::{PartnerId, UserId};
use super::money::Money;

/// Unique identifier for a Wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct WalletId(Uuid);

impl WalletId {
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

impl Default for WalletId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WalletId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WalletId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a WalletTransaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct WalletTransactionId(Uuid);

impl WalletTransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for WalletTransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WalletTransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a wallet belongs to. The platform ledger is itself a wallet, so
/// commission rows go through the same atomic primitive as payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum WalletOwner {
    Partner(PartnerId),
    User(UserId),
    Platform,
}

impl WalletOwner {
    /// Stable key used by adapters to look a wallet up by owner.
    pub fn storage_key(&self) -> String {
        match self {
            WalletOwner::Partner(id) => format!("partner:{}", id),
            WalletOwner::User(id) => format!("user:{}", id),
            WalletOwner::Platform => "platform".to_string(),
        }
    }
}

impl std::fmt::Display for WalletOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// An internal balance mutated only by ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner: WalletOwner,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates an empty wallet for the given owner.
    pub fn new(owner: WalletOwner, currency: super::money::Currency) -> Self {
        Self {
            id: WalletId::new(),
            owner,
            balance: Money::zero(currency),
            created_at: Utc::now(),
        }
    }
}

/// Direction of a ledger entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryDirection {
    Credit,
    Debit,
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDirection::Credit => write!(f, "CREDIT"),
            EntryDirection::Debit => write!(f, "DEBIT"),
        }
    }
}

/// Business reason for a ledger entry. Together with the reference id this
/// forms the idempotency key for wallet mutations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionSource {
    BookingPayout,
    Commission,
    Refund,
    AdminAdjustment,
}

impl std::fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionSource::BookingPayout => write!(f, "BOOKING_PAYOUT"),
            TransactionSource::Commission => write!(f, "COMMISSION"),
            TransactionSource::Refund => write!(f, "REFUND"),
            TransactionSource::AdminAdjustment => write!(f, "ADMIN_ADJUSTMENT"),
        }
    }
}

/// An immutable ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: WalletTransactionId,
    pub wallet_id: WalletId,
    pub amount: Money,
    pub direction: EntryDirection,
    pub source: TransactionSource,
    /// Booking or payment id the entry settles.
    pub reference_id: String,
    /// Balance snapshot taken in the same atomic step as the write.
    pub balance_after: Money,
    pub description: String,
    pub processed_at: DateTime<Utc>,
}

/// A requested wallet mutation, before it is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub wallet_id: WalletId,
    pub amount: Money,
    pub direction: EntryDirection,
    pub source: TransactionSource,
    pub reference_id: String,
    pub description: String,
}

impl LedgerEntry {
    pub fn credit(
        wallet_id: WalletId,
        amount: Money,
        source: TransactionSource,
        reference_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            amount,
            direction: EntryDirection::Credit,
            source,
            reference_id: reference_id.into(),
            description: description.into(),
        }
    }

    pub fn debit(
        wallet_id: WalletId,
        amount: Money,
        source: TransactionSource,
        reference_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            amount,
            direction: EntryDirection::Debit,
            source,
            reference_id: reference_id.into(),
            description: description.into(),
        }
    }
}

/// Result of applying a ledger entry.
#[derive(Debug, Clone)]
pub enum LedgerOutcome {
    /// The entry was written and the balance moved.
    Applied(WalletTransaction),
    /// A row with the same `(reference_id, source)` already exists;
    /// the balance was not touched.
    AlreadyApplied(WalletTransaction),
}

impl LedgerOutcome {
    pub fn transaction(&self) -> &WalletTransaction {
        match self {
            LedgerOutcome::Applied(tx) | LedgerOutcome::AlreadyApplied(tx) => tx,
        }
    }
}
