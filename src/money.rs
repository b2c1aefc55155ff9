//! Fixed-precision currency values for Choparia Caixa.
//!
//! Amounts are held as integer centavos so that summing a month of sales
//! never drifts the way binary floats do. Two parse paths exist: the
//! masked-input path used by the entry form (digits only, last two are
//! cents, anything else silently dropped) and a strict path for ingesting
//! records from files or the API.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::SalesError;

/// A currency amount in integer centavos.
///
/// Signed: raw form fields are always >= 0, but derived figures such as
/// the cash delta and the conference value can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Money(i64);

pub const ZERO: Money = Money(0);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Parse masked currency input the way the entry form does: every
    /// non-digit character is discarded and the remaining digit string is
    /// read as centavos, so typing "1234" yields 12.34. Empty (or
    /// all-garbage) input is the zero value, never an error.
    pub fn parse_masked(raw: &str) -> Self {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return ZERO;
        }
        // Cap at 16 digits so pathological paste input cannot overflow.
        let digits = if digits.len() > 16 {
            &digits[digits.len() - 16..]
        } else {
            &digits[..]
        };
        Money(digits.parse::<i64>().unwrap_or(0))
    }

    /// Strict parse for file/API ingestion: optional sign, decimal point,
    /// at most two fraction digits. Rejects anything else instead of
    /// silently discarding characters.
    pub fn parse_strict(raw: &str) -> Result<Self, SalesError> {
        let s = raw.trim();
        if s.is_empty() {
            return Ok(ZERO);
        }
        let (negative, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty()
            || frac_part.len() > 2
            || !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(SalesError::MalformedRecord(format!(
                "invalid money value: {raw:?}"
            )));
        }
        let whole: i64 = int_part.parse().map_err(|_| {
            SalesError::MalformedRecord(format!("money value out of range: {raw:?}"))
        })?;
        let frac: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().unwrap_or(0) * 10,
            _ => frac_part.parse().unwrap_or(0),
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(|| {
                SalesError::MalformedRecord(format!("money value out of range: {raw:?}"))
            })?;
        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Format for display in the original locale: "R$ 1.234,56".
    /// Negative amounts render as "-R$ 1.234,56".
    pub fn format_brl(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / 100;
        let frac = abs % 100;

        let digits = whole.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        format!("{sign}R$ {grouped},{frac:02}")
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(ZERO, Add::add)
    }
}

/// Plain 2-decimal rendering ("1234.56"), the form persisted records and
/// CSV cells use.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct MoneyVisitor;

impl Visitor<'_> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string or number with at most 2 fraction digits")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        Money::parse_strict(v).map_err(|e| E::custom(e.to_string()))
    }

    // Legacy documents stored some amounts as raw numbers.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        Ok(Money((v * 100.0).round() as i64))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        Ok(Money(v * 100))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        Ok(Money(v as i64 * 100))
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_parse_reads_trailing_digits_as_cents() {
        assert_eq!(Money::parse_masked("1234"), Money::from_cents(1234));
        assert_eq!(Money::parse_masked("R$ 12,34"), Money::from_cents(1234));
        assert_eq!(Money::parse_masked("5"), Money::from_cents(5));
    }

    #[test]
    fn masked_parse_empty_and_garbage_yield_zero() {
        assert_eq!(Money::parse_masked(""), ZERO);
        assert_eq!(Money::parse_masked("abc"), ZERO);
    }

    #[test]
    fn masked_parse_roundtrips_two_decimal_values() {
        for cents in [0i64, 1, 99, 100, 123_456, 99_999_999] {
            let m = Money::from_cents(cents);
            assert_eq!(Money::parse_masked(&m.to_string()), m);
            assert_eq!(Money::parse_masked(&m.format_brl()), m);
        }
    }

    #[test]
    fn strict_parse_accepts_plain_decimals() {
        assert_eq!(
            Money::parse_strict("12.34").unwrap(),
            Money::from_cents(1234)
        );
        assert_eq!(Money::parse_strict("12.3").unwrap(), Money::from_cents(1230));
        assert_eq!(Money::parse_strict("12").unwrap(), Money::from_cents(1200));
        assert_eq!(Money::parse_strict("").unwrap(), ZERO);
        assert_eq!(
            Money::parse_strict("-5.00").unwrap(),
            Money::from_cents(-500)
        );
    }

    #[test]
    fn strict_parse_rejects_bad_input() {
        assert!(Money::parse_strict("12.345").is_err());
        assert!(Money::parse_strict("abc").is_err());
        assert!(Money::parse_strict("1,00").is_err());
    }

    #[test]
    fn brl_formatting_groups_thousands() {
        assert_eq!(Money::from_cents(123_456).format_brl(), "R$ 1.234,56");
        assert_eq!(Money::from_cents(0).format_brl(), "R$ 0,00");
        assert_eq!(Money::from_cents(-990).format_brl(), "-R$ 9,90");
        assert_eq!(
            Money::from_cents(100_000_000).format_brl(),
            "R$ 1.000.000,00"
        );
    }

    #[test]
    fn serde_uses_two_decimal_strings_and_accepts_numbers() {
        let m = Money::from_cents(8550);
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"85.50\"");
        assert_eq!(serde_json::from_str::<Money>("\"85.50\"").unwrap(), m);
        assert_eq!(serde_json::from_str::<Money>("85.5").unwrap(), m);
        assert_eq!(
            serde_json::from_str::<Money>("85").unwrap(),
            Money::from_cents(8500)
        );
    }
}
