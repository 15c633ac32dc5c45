//! Type-safe monetary value with embedded currency.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// Currencies supported by the settlement pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    INR,
    USD,
}

impl Currency {
    /// Returns the currency symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::INR => "₹",
            Currency::USD => "$",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Type-safe money representation with embedded currency.
///
/// Amount is stored in the smallest unit of the currency (paise, cents)
/// to avoid floating-point precision issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: i64, currency: Currency) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Returns the amount in smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Checked addition - returns error if currencies don't match.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        Ok(Money {
            amount: self.amount.saturating_add(other.amount),
            currency: self.currency,
        })
    }

    /// Checked subtraction - returns error if currencies don't match or the
    /// result would be negative.
    pub fn checked_sub(&self, other: Money) -> Result<Money, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        if self.amount < other.amount {
            return Err(DomainError::InsufficientBalance {
                available: self.amount,
                requested: other.amount,
            });
        }
        Ok(Money {
            amount: self.amount - other.amount,
            currency: self.currency,
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self.amount / 100;
        let minor = (self.amount % 100).abs();
        write!(f, "{}{}.{:02}", self.currency.symbol(), major, minor)
    }
}

/// Platform commission rate, stored in basis points so the payout split is
/// pure integer math on minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRate(u32);

impl CommissionRate {
    /// 10% - the platform default.
    pub const DEFAULT: CommissionRate = CommissionRate(1000);

    /// Creates a rate from basis points (100 bps = 1%). Rates above 100%
    /// are rejected.
    pub fn from_basis_points(bps: u32) -> Result<Self, DomainError> {
        if bps > 10_000 {
            return Err(DomainError::ValidationError(format!(
                "Commission rate {} bps exceeds 100%",
                bps
            )));
        }
        Ok(Self(bps))
    }

    /// Returns the rate in basis points.
    pub fn basis_points(&self) -> u32 {
        self.0
    }

    /// Splits a booking total into (partner payout, platform commission).
    /// The commission is rounded down, so the partner never loses a unit
    /// to rounding.
    pub fn split(&self, total: Money) -> (Money, Money) {
        let commission_amount = total.amount() * i64::from(self.0) / 10_000;
        let commission = Money {
            amount: commission_amount,
            currency: total.currency(),
        };
        let payout = Money {
            amount: total.amount() - commission_amount,
            currency: total.currency(),
        };
        (payout, commission)
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let money = Money::new(1000, Currency::INR).unwrap();
        assert_eq!(money.amount(), 1000);
        assert_eq!(money.currency(), Currency::INR);
    }

    #[test]
    fn test_negative_money_fails() {
        let result = Money::new(-100, Currency::INR);
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_currency_mismatch() {
        let inr = Money::new(100, Currency::INR).unwrap();
        let usd = Money::new(50, Currency::USD).unwrap();
        let result = inr.checked_add(usd);
        assert!(matches!(result, Err(DomainError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_subtraction_below_zero_fails() {
        let a = Money::new(100, Currency::INR).unwrap();
        let b = Money::new(150, Currency::INR).unwrap();
        let result = a.checked_sub(b);
        assert!(matches!(
            result,
            Err(DomainError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_commission_split_ten_percent() {
        // ₹2500.00 booking at the default 10% rate
        let total = Money::new(250_000, Currency::INR).unwrap();
        let (payout, commission) = CommissionRate::DEFAULT.split(total);
        assert_eq!(payout.amount(), 225_000);
        assert_eq!(commission.amount(), 25_000);
    }

    #[test]
    fn test_commission_split_rounds_toward_partner() {
        let total = Money::new(999, Currency::INR).unwrap();
        let (payout, commission) = CommissionRate::DEFAULT.split(total);
        assert_eq!(commission.amount(), 99);
        assert_eq!(payout.amount(), 900);
        assert_eq!(payout.amount() + commission.amount(), 999);
    }

    #[test]
    fn test_commission_rate_over_100_percent_fails() {
        assert!(CommissionRate::from_basis_points(10_001).is_err());
    }
}
