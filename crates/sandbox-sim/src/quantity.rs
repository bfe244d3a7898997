//! Kubernetes-style resource quantities (`100m`, `200Mi`, `1.5`, `1e3`).
//!
//! Values are held exactly in milli-units so that summing many small CPU
//! requests never loses precision. Anything finer than a milli-unit is
//! rounded up, matching the Kubernetes `MilliValue()` behaviour.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix in quantity {0:?}")]
    UnknownSuffix(String),

    #[error("quantity {0:?} is out of range")]
    Overflow(String),
}

/// Largest power of ten representable in an `i128`.
const MAX_POW10: u32 = 38;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    milli: i128,
}

enum Scale {
    Decimal(i32),
    Binary(u32),
}

impl Quantity {
    pub const ZERO: Quantity = Quantity { milli: 0 };

    pub fn from_milli(milli: i128) -> Self {
        Self { milli }
    }

    pub fn from_value(value: i64) -> Self {
        Self {
            milli: i128::from(value) * 1000,
        }
    }

    /// Value in milli-units (`100m` → 100, `2` → 2000).
    pub fn milli_value(&self) -> i128 {
        self.milli
    }

    /// Value in base units, rounded up (`1500m` → 2).
    pub fn value(&self) -> i128 {
        let whole = self.milli.div_euclid(1000);
        if self.milli.rem_euclid(1000) == 0 {
            whole
        } else {
            whole + 1
        }
    }

    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }
}

fn pow10(exp: u32) -> Option<i128> {
    if exp > MAX_POW10 {
        return None;
    }
    10i128.checked_pow(exp)
}

/// Ceiling division for a non-negative numerator and positive denominator.
fn ceil_div(num: i128, den: i128) -> i128 {
    let q = num / den;
    if num % den == 0 { q } else { q + 1 }
}

fn parse_scale(suffix: &str, raw: &str) -> Result<Scale, QuantityError> {
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        "Ki" => Scale::Binary(10),
        "Mi" => Scale::Binary(20),
        "Gi" => Scale::Binary(30),
        "Ti" => Scale::Binary(40),
        "Pi" => Scale::Binary(50),
        "Ei" => Scale::Binary(60),
        other => {
            let exp = other
                .strip_prefix('e')
                .or_else(|| other.strip_prefix('E'))
                .and_then(|e| e.parse::<i32>().ok())
                .ok_or_else(|| QuantityError::UnknownSuffix(raw.to_string()))?;
            Scale::Decimal(exp)
        }
    };
    Ok(scale)
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = if let Some(r) = s.strip_prefix('-') {
            (true, r)
        } else if let Some(r) = s.strip_prefix('+') {
            (false, r)
        } else {
            (false, s)
        };

        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(end);

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
            return Err(QuantityError::InvalidNumber(raw.to_string()));
        }

        let overflow = || QuantityError::Overflow(raw.to_string());

        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(b - b'0')))
                .ok_or_else(overflow)?;
        }
        let frac_digits = u32::try_from(frac_part.len()).map_err(|_| overflow())?;

        let milli = match parse_scale(suffix, raw)? {
            Scale::Decimal(exp) => {
                let shift = i64::from(exp) + 3 - i64::from(frac_digits);
                if shift >= 0 {
                    let factor = u32::try_from(shift).ok().and_then(pow10).ok_or_else(overflow)?;
                    mantissa.checked_mul(factor).ok_or_else(overflow)?
                } else {
                    match u32::try_from(-shift).ok().and_then(pow10) {
                        Some(divisor) => ceil_div(mantissa, divisor),
                        // Far below a milli-unit: anything non-zero rounds up to 1m.
                        None => i128::from(mantissa > 0),
                    }
                }
            }
            Scale::Binary(bits) => {
                let num = mantissa
                    .checked_mul(1i128 << bits)
                    .and_then(|n| n.checked_mul(1000))
                    .ok_or_else(overflow)?;
                let den = pow10(frac_digits).ok_or_else(overflow)?;
                ceil_div(num, den)
            }
        };

        Ok(Quantity {
            milli: if negative { -milli } else { milli },
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % 1000 == 0 {
            write!(f, "{}", self.milli / 1000)
        } else {
            write!(f, "{}m", self.milli)
        }
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity::from_milli(self.milli.saturating_add(rhs.milli))
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Quantity {
        iter.copied().sum()
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }

        match Raw::deserialize(d)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Int(v) => Ok(Quantity::from_value(v)),
        }
    }
}
