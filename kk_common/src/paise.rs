use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const INR_CURRENCY_CODE: &str = "INR";
pub const PAISE_PER_RUPEE: i64 = 100;

//--------------------------------------        Paise        ---------------------------------------------------------
/// An amount of Indian rupees, held in paise (the minor unit). All money in the system is integral paise; there is
/// no floating point anywhere on the money path.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Paise(i64);

op!(binary Paise, Add, add);
op!(binary Paise, Sub, sub);
op!(inplace Paise, AddAssign, add_assign);
op!(inplace Paise, SubAssign, sub_assign);
op!(unary Paise, Neg, neg);

impl Mul<i64> for Paise {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Paise {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Paise {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in paise: {0}")]
pub struct PaiseConversionError(String);

impl TryFrom<u64> for Paise {
    type Error = PaiseConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| PaiseConversionError(format!("Value {value} is too large to convert to Paise")))
    }
}

impl Display for Paise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_rupee = PAISE_PER_RUPEE.unsigned_abs();
        write!(f, "{sign}₹{}.{:02}", abs / per_rupee, abs % per_rupee)
    }
}

/// Parses a rupee amount such as `1899`, `1899.5` or `1899.50` into paise. More than two decimal places is an error
/// rather than a silent rounding.
impl FromStr for Paise {
    type Err = PaiseConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || PaiseConversionError(format!("'{s}' is not a valid rupee amount"));
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() || frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let rupees = whole.parse::<i64>().map_err(|_| err())?;
        let paise = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse::<i64>().map_err(|_| err())?,
        };
        let value = rupees.checked_mul(PAISE_PER_RUPEE).and_then(|v| v.checked_add(paise)).ok_or_else(err)?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl Paise {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn from_rupees(rupees: i64) -> Self {
        Self(rupees * PAISE_PER_RUPEE)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// `percent`% of this amount, rounded half-up to the nearest paisa. Only meaningful for non-negative amounts.
    pub fn percentage_half_up(&self, percent: i64) -> Self {
        let scaled = i128::from(self.0) * i128::from(percent);
        let rounded = (scaled + 50).div_euclid(100);
        Self(i64::try_from(rounded).unwrap_or(i64::MAX))
    }
}
