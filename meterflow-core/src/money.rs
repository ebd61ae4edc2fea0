//! Arbitrary-precision monetary arithmetic.
//!
//! All intermediate billing math (tier ladders, commitment drawdown, wallet
//! allocation) is performed in [`rust_decimal::Decimal`] and never rounded
//! until the final presentation value is produced. Rounding mid-calculation
//! is how a thousand one-cent-off invoices become a revenue leak.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A monetary amount tagged with its currency. Arithmetic across mismatched
/// currencies panics in debug builds via `assert_eq!` inside the operator
/// impls below, since mixing currencies is always a caller bug, never a
/// runtime condition to recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    #[serde(skip)]
    currency_index: CurrencyIndex,
}

// `Currency` itself (see below) isn't `Copy`-friendly to embed directly
// without an allocation per `Money` value, so we intern the 3-letter code.
type CurrencyIndex = [u8; 3];

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Money {
            amount,
            currency_index: currency_code(currency),
        }
    }

    pub fn zero(currency: &str) -> Self {
        Money::new(Decimal::ZERO, currency)
    }

    pub fn currency(&self) -> String {
        String::from_utf8_lossy(&self.currency_index).to_string()
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Rounds to the currency's conventional decimal precision (2 for most
    /// currencies, 0 for zero-decimal currencies like JPY). This is the only
    /// place rounding happens; callers accumulate unrounded `Decimal` sums
    /// and round exactly once, at presentation time.
    pub fn rounded(&self) -> Money {
        let scale = conventional_precision(&self.currency());
        Money {
            amount: self.amount.round_dp(scale),
            currency_index: self.currency_index,
        }
    }

    fn assert_same_currency(&self, other: &Money) {
        assert_eq!(
            self.currency_index, other.currency_index,
            "cannot combine money in {} with money in {}",
            self.currency(),
            other.currency()
        );
    }
}

fn currency_code(currency: &str) -> CurrencyIndex {
    let upper = currency.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let mut out = [b'?'; 3];
    for (i, b) in bytes.iter().take(3).enumerate() {
        out[i] = *b;
    }
    out
}

/// Number of decimal places a currency is conventionally presented with.
/// Only the handful of zero-decimal currencies actually used in billing
/// fixtures are special-cased; everything else defaults to 2.
pub fn conventional_precision(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "CLP" => 0,
        "BHD" | "KWD" | "OMR" => 3,
        _ => 2,
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        self.assert_same_currency(&rhs);
        Money {
            amount: self.amount + rhs.amount,
            currency_index: self.currency_index,
        }
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        self.assert_same_currency(&rhs);
        Money {
            amount: self.amount - rhs.amount,
            currency_index: self.currency_index,
        }
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(mut iter: I) -> Money {
        match iter.next() {
            None => Money::zero("USD"),
            Some(first) => iter.fold(first, |acc, m| acc + m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_to_conventional_precision() {
        let m = Money::new(dec!(10.005), "USD");
        assert_eq!(m.rounded().amount, dec!(10.01));

        let jpy = Money::new(dec!(1050.7), "JPY");
        assert_eq!(jpy.rounded().amount, dec!(1051));
    }

    #[test]
    fn add_preserves_currency() {
        let a = Money::new(dec!(1.50), "USD");
        let b = Money::new(dec!(2.25), "USD");
        assert_eq!((a + b).amount, dec!(3.75));
    }

    #[test]
    #[should_panic]
    fn mismatched_currency_add_panics() {
        let a = Money::new(dec!(1.00), "USD");
        let b = Money::new(dec!(1.00), "EUR");
        let _ = a + b;
    }

    proptest::proptest! {
        /// Rounding twice is the same as rounding once — a budget property
        /// worth holding given `rounded()` is the only place presentation
        /// rounding happens and every caller is expected to call it exactly
        /// once.
        #[test]
        fn rounding_is_idempotent(cents in -1_000_000_000i64..1_000_000_000i64) {
            let amount = Decimal::new(cents, 4);
            let m = Money::new(amount, "USD");
            let once = m.rounded();
            let twice = once.rounded();
            prop_assert_eq!(once.amount, twice.amount);
        }

        /// Three-letter currency codes survive the intern/un-intern round
        /// trip untouched, regardless of case.
        #[test]
        fn currency_code_round_trips(code in "[a-zA-Z]{3}") {
            let m = Money::new(Decimal::ZERO, &code);
            prop_assert_eq!(m.currency(), code.to_ascii_uppercase());
        }
    }
}
