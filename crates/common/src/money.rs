//! Fixed-point currency amounts.

use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by money arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Two amounts in different currencies were combined or compared.
    #[error("Cannot operate on Money with different currencies: {left} and {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// A currency code was not three ASCII letters.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// The result does not fit in the minor-unit range.
    #[error("Money amount out of range")]
    Overflow,
}

/// Three-letter currency code, always upper case.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const EUR: Currency = Currency(*b"EUR");
    pub const USD: Currency = Currency(*b"USD");
    pub const GBP: Currency = Currency(*b"GBP");

    /// Parses a currency code, accepting lower case input.
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let trimmed = code.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::EUR
    }
}

impl std::fmt::Debug for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Currency({})", self.as_str())
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.as_str().to_string()
    }
}

/// An immutable amount of money stored as minor units (cents) with two
/// implied decimal places.
///
/// Every binary operation requires both operands to share a currency and
/// reports [`MoneyError::CurrencyMismatch`] otherwise. Arithmetic is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    amount_minor_units: i64,
    currency: Currency,
}

impl Money {
    /// Creates an amount from minor units (e.g. 129999 = 1299.99).
    pub fn from_minor_units(minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor_units: minor,
            currency,
        }
    }

    /// Creates a zero amount.
    pub fn zero(currency: Currency) -> Self {
        Self::from_minor_units(0, currency)
    }

    /// Creates an amount from a decimal value, rounding half away from zero
    /// to two decimal places.
    pub fn from_decimal(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        let minor = amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|d| d.to_i64())
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor_units(minor, currency))
    }

    /// Returns the amount in minor units.
    pub fn to_minor_units(&self) -> i64 {
        self.amount_minor_units
    }

    /// Returns the amount as a two-decimal value.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount_minor_units, 2)
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor_units == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount_minor_units > 0
    }

    pub fn is_negative(&self) -> bool {
        self.amount_minor_units < 0
    }

    /// Adds another amount of the same currency.
    pub fn add(&self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(&other)?;
        let minor = self
            .amount_minor_units
            .checked_add(other.amount_minor_units)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor_units(minor, self.currency))
    }

    /// Subtracts another amount of the same currency.
    pub fn subtract(&self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(&other)?;
        let minor = self
            .amount_minor_units
            .checked_sub(other.amount_minor_units)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor_units(minor, self.currency))
    }

    /// Multiplies by an integral quantity.
    pub fn multiply(&self, quantity: i64) -> Result<Money, MoneyError> {
        let minor = self
            .amount_minor_units
            .checked_mul(quantity)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor_units(minor, self.currency))
    }

    /// Multiplies by a decimal rate (e.g. a tax rate of `0.20`), rounding the
    /// result half away from zero to whole minor units.
    pub fn multiply_rate(&self, rate: Decimal) -> Result<Money, MoneyError> {
        let minor = Decimal::from(self.amount_minor_units)
            .checked_mul(rate)
            .map(|d| d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|d| d.to_i64())
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor_units(minor, self.currency))
    }

    /// Compares two amounts of the same currency.
    pub fn compare(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.amount_minor_units.cmp(&other.amount_minor_units))
    }

    pub fn greater_than(&self, other: &Money) -> Result<bool, MoneyError> {
        Ok(self.compare(other)? == Ordering::Greater)
    }

    pub fn greater_than_or_equal(&self, other: &Money) -> Result<bool, MoneyError> {
        Ok(self.compare(other)? != Ordering::Less)
    }

    pub fn less_than(&self, other: &Money) -> Result<bool, MoneyError> {
        Ok(self.compare(other)? == Ordering::Less)
    }

    pub fn less_than_or_equal(&self, other: &Money) -> Result<bool, MoneyError> {
        Ok(self.compare(other)? != Ordering::Greater)
    }

    /// Sums amounts, starting from zero in `currency`.
    pub fn sum<I>(amounts: I, currency: Currency) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.add(m))
    }

    /// Returns the amount formatted as `1 299,99` (space-grouped thousands,
    /// comma decimals), without the currency.
    pub fn formatted_amount(&self) -> String {
        let abs = self.amount_minor_units.unsigned_abs();
        let units = (abs / 100).to_string();
        let cents = abs % 100;

        let mut grouped = String::with_capacity(units.len() + units.len() / 3);
        for (i, ch) in units.chars().enumerate() {
            if i > 0 && (units.len() - i) % 3 == 0 {
                grouped.push(' ');
            }
            grouped.push(ch);
        }

        let sign = if self.is_negative() { "-" } else { "" };
        format!("{sign}{grouped},{cents:02}")
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.formatted_amount(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    fn eur(minor: i64) -> Money {
        Money::from_minor_units(minor, Currency::EUR)
    }

    #[test]
    fn currency_parsing_normalizes_case() {
        assert_eq!(Currency::new("eur").unwrap(), Currency::EUR);
        assert_eq!(Currency::new(" usd ").unwrap(), Currency::USD);
        assert!(Currency::new("EURO").is_err());
        assert!(Currency::new("E1R").is_err());
    }

    #[test]
    fn arithmetic_in_same_currency() {
        let a = eur(1000);
        let b = eur(250);
        assert_eq!(a.add(b).unwrap(), eur(1250));
        assert_eq!(a.subtract(b).unwrap(), eur(750));
        assert_eq!(b.multiply(3).unwrap(), eur(750));
    }

    #[test]
    fn mismatched_currencies_fail() {
        let a = eur(100);
        let b = Money::from_minor_units(100, Currency::USD);
        assert!(matches!(
            a.add(b),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
        assert!(a.greater_than(&b).is_err());
    }

    #[test]
    fn overflow_is_reported() {
        let max = eur(i64::MAX);
        assert_eq!(max.add(eur(1)), Err(MoneyError::Overflow));
        assert_eq!(max.multiply(2), Err(MoneyError::Overflow));
    }

    #[test]
    fn comparisons() {
        let a = eur(200);
        let b = eur(100);
        assert!(a.greater_than(&b).unwrap());
        assert!(a.greater_than_or_equal(&a).unwrap());
        assert!(b.less_than(&a).unwrap());
        assert!(b.less_than_or_equal(&b).unwrap());
        assert!(eur(0).is_zero());
        assert!(eur(1).is_positive());
        assert!(eur(-1).is_negative());
    }

    #[test]
    fn decimal_conversion_rounds_to_cents() {
        let m = Money::from_decimal(Decimal::from_str("1299.99").unwrap(), Currency::EUR).unwrap();
        assert_eq!(m.to_minor_units(), 129_999);

        let rounded =
            Money::from_decimal(Decimal::from_str("0.005").unwrap(), Currency::EUR).unwrap();
        assert_eq!(rounded.to_minor_units(), 1);

        assert_eq!(m.to_decimal(), Decimal::from_str("1299.99").unwrap());
    }

    #[test]
    fn rate_multiplication_rounds_half_away_from_zero() {
        let net = eur(10_000);
        assert_eq!(
            net.multiply_rate(Decimal::from_str("0.20").unwrap()).unwrap(),
            eur(2_000)
        );
        // 0.05 * 0.5 = 0.025 -> 0.03
        assert_eq!(
            eur(5).multiply_rate(Decimal::from_str("0.5").unwrap()).unwrap(),
            eur(3)
        );
    }

    #[test]
    fn display_uses_grouped_format() {
        assert_eq!(eur(129_999).to_string(), "1 299,99 EUR");
        assert_eq!(eur(5).to_string(), "0,05 EUR");
        assert_eq!(eur(123_456_789).to_string(), "1 234 567,89 EUR");
        assert_eq!(eur(-1050).to_string(), "-10,50 EUR");
    }

    #[test]
    fn sum_of_amounts() {
        let total = Money::sum([eur(100), eur(250), eur(5)], Currency::EUR).unwrap();
        assert_eq!(total, eur(355));
        assert!(Money::sum([eur(1), Money::zero(Currency::GBP)], Currency::EUR).is_err());
    }

    #[test]
    fn currency_serializes_as_code() {
        let json = serde_json::to_string(&Currency::GBP).unwrap();
        assert_eq!(json, "\"GBP\"");
        let back: Currency = serde_json::from_str("\"gbp\"").unwrap();
        assert_eq!(back, Currency::GBP);
    }

    proptest! {
        #[test]
        fn add_then_subtract_is_identity(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let a = eur(a);
            let b = eur(b);
            prop_assert_eq!(a.add(b).unwrap().subtract(b).unwrap(), a);
        }

        #[test]
        fn minor_units_round_trip(minor in any::<i64>()) {
            let m = eur(minor);
            prop_assert_eq!(Money::from_minor_units(m.to_minor_units(), m.currency()), m);
        }
    }
}
