use crate::error::PayoutError;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Fraction of the gross amount left payable after the 3.3% contractor
/// withholding tax.
const WITHHOLDING_FACTOR: Decimal = dec!(0.967);

/// A VAT-inclusive total is `supply * 1.1`.
const VAT_DIVISOR: Decimal = dec!(1.1);

/// A non-negative monetary amount in whole currency units.
///
/// The domain has no fractional currency units, so construction rejects
/// values with a fractional part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, PayoutError> {
        if value < Decimal::ZERO {
            return Err(PayoutError::Validation(format!(
                "amount must not be negative: {value}"
            )));
        }
        if value.fract() != Decimal::ZERO {
            return Err(PayoutError::Validation(format!(
                "amount must be in whole currency units: {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The amount payable after the 3.3% withholding deduction.
    pub fn deducted(&self) -> Amount {
        Amount(apply_deduction(self.0))
    }

    /// Splits this VAT-inclusive amount into supply value and VAT.
    pub fn vat_breakdown(&self) -> VatBreakdown {
        extract_vat(self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PayoutError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Supply/VAT split of a VAT-inclusive total. Display-only: the stored total
/// is never changed by this breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VatBreakdown {
    pub supply: Decimal,
    pub vat: Decimal,
}

/// Rounds to whole currency units, half away from zero.
pub fn round_to_unit(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Applies the 3.3% withholding deduction: `round(amount * 0.967)`.
///
/// The gross amount must be retained by the caller; reversal re-derives from
/// the original, never from the rounded result.
pub fn apply_deduction(amount: Decimal) -> Decimal {
    round_to_unit(amount * WITHHOLDING_FACTOR)
}

/// Splits a VAT-inclusive total into supply value and 10% VAT.
///
/// `vat` is the exact remainder so that `supply + vat == total` always holds.
pub fn extract_vat(total: Decimal) -> VatBreakdown {
    let supply = round_to_unit(total / VAT_DIVISOR);
    VatBreakdown {
        supply,
        vat: total - supply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduction_of_one_million() {
        assert_eq!(apply_deduction(dec!(1_000_000)), dec!(967_000));
    }

    #[test]
    fn test_deduction_rounds_half_away_from_zero() {
        // 500 * 0.967 = 483.5 -> 484
        assert_eq!(apply_deduction(dec!(500)), dec!(484));
    }

    #[test]
    fn test_vat_extraction() {
        let breakdown = extract_vat(dec!(1_100_000));
        assert_eq!(breakdown.supply, dec!(1_000_000));
        assert_eq!(breakdown.vat, dec!(100_000));
    }

    #[test]
    fn test_vat_split_always_sums_to_total() {
        for total in [dec!(1), dec!(10), dec!(33_333), dec!(999_999)] {
            let b = extract_vat(total);
            assert_eq!(b.supply + b.vat, total);
        }
    }

    #[test]
    fn test_amount_rejects_negative() {
        assert!(Amount::new(dec!(-1)).is_err());
    }

    #[test]
    fn test_amount_rejects_fractional() {
        assert!(Amount::new(dec!(100.5)).is_err());
        assert!(Amount::new(dec!(100)).is_ok());
    }

    #[test]
    fn test_amount_addition() {
        let a = Amount::new(dec!(300)).unwrap();
        let b = Amount::new(dec!(700)).unwrap();
        assert_eq!((a + b).value(), dec!(1000));
    }
}
