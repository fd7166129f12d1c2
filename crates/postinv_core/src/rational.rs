//! Exact rational arithmetic backing every coefficient of the symbolic engine.
//!
//! High-order derivatives carry coefficients such as `q!` and `q^(q+1)` that are far
//! outside the `f64` range, so they are kept exact here and only reduced to a
//! logarithm (or a float) when bytecode is compiled.

use dashu::base::{Abs, BitTest, Inverse, Signed as DashuSigned, UnsignedAbs};
use dashu::integer::{IBig, UBig};
use dashu::rational::RBig;
use num_traits::{One, Zero};
use std::f64::consts::LN_2;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Exact powers whose result would exceed this many bits are left unevaluated.
const MAX_POW_BITS: usize = 1 << 26;

/// An arbitrary precision rational, always in lowest terms with a positive denominator.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Rational(RBig);

impl Rational {
    pub fn from_integer(value: i64) -> Self {
        Self(RBig::from(IBig::from(value)))
    }

    /// Returns `None` when the denominator is zero.
    pub fn from_ratio(numerator: i64, denominator: i64) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        let num = IBig::from(numerator) * IBig::from(denominator.signum());
        let den = IBig::from(denominator).unsigned_abs();
        Some(Self(RBig::from_parts(num, den)))
    }

    /// Parses an unsigned decimal literal such as `12`, `0.25` or `.5` exactly.
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let (whole, frac) = match text.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (text, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        let digits_ok = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if !digits_ok(whole) || !digits_ok(frac) {
            return None;
        }
        let joined = format!("{whole}{frac}");
        let numerator = UBig::from_str_radix(&joined, 10).ok()?;
        let denominator = UBig::from(10u8).pow(frac.len());
        Some(Self(RBig::from_parts(IBig::from(numerator), denominator)))
    }

    pub fn is_integer(&self) -> bool {
        self.0.denominator().is_one()
    }

    pub fn is_negative(&self) -> bool {
        DashuSigned::is_negative(&self.0)
    }

    pub fn abs(&self) -> Self {
        Self(self.0.clone().abs())
    }

    /// Converts to an `i64` if the value is an integer that fits.
    pub fn to_i64(&self) -> Option<i64> {
        if !self.is_integer() {
            return None;
        }
        self.0.numerator().clone().try_into().ok()
    }

    pub fn checked_recip(&self) -> Option<Self> {
        if self.is_zero() {
            None
        } else {
            Some(Self(self.0.clone().inv()))
        }
    }

    /// Exact integer power.
    ///
    /// Returns `None` for a zero base with a negative exponent, and when the result
    /// would be unreasonably large to hold exactly.
    pub fn pow_i64(&self, exponent: i64) -> Option<Self> {
        if exponent == 0 {
            return Some(Self::one());
        }
        if self.is_zero() {
            return if exponent > 0 { Some(Self::zero()) } else { None };
        }
        let magnitude = usize::try_from(exponent.unsigned_abs()).ok()?;
        let bits = self
            .0
            .numerator()
            .bit_len()
            .max(self.0.denominator().bit_len());
        if bits.saturating_mul(magnitude) > MAX_POW_BITS {
            return None;
        }
        let raised = Self(self.0.pow(magnitude));
        if exponent < 0 {
            raised.checked_recip()
        } else {
            Some(raised)
        }
    }

    /// `n!`
    pub fn factorial(n: u64) -> Self {
        let mut acc = UBig::ONE;
        for k in 2..=n {
            acc *= UBig::from(k);
        }
        Self(RBig::from(IBig::from(acc)))
    }

    /// `self · (self − 1) ⋯ (self − k + 1)`, the coefficient of the `k`-th derivative
    /// of `x^self`.
    pub fn falling_factorial(&self, k: u64) -> Self {
        let mut acc = Self::one();
        let mut factor = self.clone();
        for _ in 0..k {
            if factor.is_zero() {
                return Self::zero();
            }
            acc = acc * &factor;
            factor = factor - Self::one();
        }
        acc
    }

    /// `ln|self|`, computed from the bit representation so it stays finite for
    /// values far beyond `f64::MAX`. Zero maps to negative infinity.
    pub fn ln_abs(&self) -> f64 {
        if self.is_zero() {
            return f64::NEG_INFINITY;
        }
        let numerator = self.0.numerator().clone().unsigned_abs();
        ln_ubig(&numerator) - ln_ubig(self.0.denominator())
    }

    /// Converts to `f64`.
    ///
    /// Correctly rounded when numerator and denominator both fit in 53 bits. Larger
    /// values go through `exp(ln_abs)` and carry a relative error around `1e-14`.
    /// Saturates to an infinity or to zero outside the `f64` range.
    pub fn to_f64(&self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        let numerator = self.0.numerator().clone().unsigned_abs();
        let denominator = self.0.denominator();
        let sign = if self.is_negative() { -1.0 } else { 1.0 };
        if numerator.bit_len() <= 53 && denominator.bit_len() <= 53 {
            if let (Ok(n), Ok(d)) = (
                u64::try_from(numerator.clone()),
                u64::try_from(denominator.clone()),
            ) {
                return sign * (n as f64 / d as f64);
            }
        }
        sign * self.ln_abs().exp()
    }
}

fn ln_ubig(value: &UBig) -> f64 {
    let bits = value.bit_len();
    if bits <= 64 {
        return u64::try_from(value.clone()).map_or(f64::NAN, |v| (v as f64).ln());
    }
    let shift = bits - 64;
    let top = value.clone() >> shift;
    u64::try_from(top).map_or(f64::NAN, |v| (v as f64).ln() + shift as f64 * LN_2)
}

impl Zero for Rational {
    fn zero() -> Self {
        Self(RBig::ZERO)
    }

    fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl One for Rational {
    fn one() -> Self {
        Self(RBig::ONE)
    }

    fn is_one(&self) -> bool {
        self.0 == RBig::ONE
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({})", self.0)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integer() {
            write!(f, "{}", self.0.numerator())
        } else {
            write!(f, "{}/{}", self.0.numerator(), self.0.denominator())
        }
    }
}

impl Add for Rational {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Add<&Rational> for Rational {
    type Output = Self;
    fn add(self, rhs: &Rational) -> Self {
        Self(self.0 + &rhs.0)
    }
}

impl Add for &Rational {
    type Output = Rational;
    fn add(self, rhs: Self) -> Rational {
        Rational(&self.0 + &rhs.0)
    }
}

impl Sub for Rational {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sub<&Rational> for Rational {
    type Output = Self;
    fn sub(self, rhs: &Rational) -> Self {
        Self(self.0 - &rhs.0)
    }
}

impl Mul for Rational {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl Mul<&Rational> for Rational {
    type Output = Self;
    fn mul(self, rhs: &Rational) -> Self {
        Self(self.0 * &rhs.0)
    }
}

impl Mul for &Rational {
    type Output = Rational;
    fn mul(self, rhs: Self) -> Rational {
        Rational(&self.0 * &rhs.0)
    }
}

// Callers guarantee a non-zero divisor; use `checked_recip` otherwise.
impl Div for Rational {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self(self.0 / rhs.0)
    }
}

impl Neg for Rational {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Neg for &Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        Rational(-&self.0)
    }
}

impl From<i64> for Rational {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl From<u64> for Rational {
    fn from(value: u64) -> Self {
        Self(RBig::from(IBig::from(value)))
    }
}
