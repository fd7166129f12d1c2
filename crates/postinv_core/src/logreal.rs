use crate::equation_engine::Constant;
use crate::traits::Scalar;
use num_traits::{One, Zero};
use std::f64::consts::LN_2;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Real number stored as a sign and the natural log of its magnitude.
/// sign: -1, 0 or 1 (0 only for zero)
/// ln_abs: ln|x|, NaN marks an undefined value
///
/// Post's formula multiplies factors like `q^(q+1)` and `t^-(q+1)` whose product is
/// modest although each factor overflows `f64`. In this representation products,
/// quotients and powers are additions of logarithms, so the intermediates never
/// overflow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogReal {
    sign: i8,
    ln_abs: f64,
}

impl LogReal {
    pub fn new(sign: i8, ln_abs: f64) -> Self {
        if ln_abs.is_nan() {
            return Self::nan();
        }
        if sign == 0 || ln_abs == f64::NEG_INFINITY {
            return Self::zero();
        }
        Self {
            sign: sign.signum(),
            ln_abs,
        }
    }

    pub fn nan() -> Self {
        Self {
            sign: 1,
            ln_abs: f64::NAN,
        }
    }

    pub fn infinity(sign: i8) -> Self {
        Self::new(sign, f64::INFINITY)
    }

    pub fn sign(&self) -> i8 {
        self.sign
    }

    pub fn ln_abs(&self) -> f64 {
        self.ln_abs
    }

    pub fn is_nan(&self) -> bool {
        self.ln_abs.is_nan()
    }

    fn is_infinite(&self) -> bool {
        self.ln_abs == f64::INFINITY
    }
}

impl Zero for LogReal {
    fn zero() -> Self {
        Self {
            sign: 0,
            ln_abs: f64::NEG_INFINITY,
        }
    }
    fn is_zero(&self) -> bool {
        self.sign == 0
    }
}

impl One for LogReal {
    fn one() -> Self {
        Self {
            sign: 1,
            ln_abs: 0.0,
        }
    }
}

impl Add for LogReal {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        if self.is_nan() || rhs.is_nan() {
            return Self::nan();
        }
        if self.is_zero() {
            return rhs;
        }
        if rhs.is_zero() {
            return self;
        }
        let (hi, lo) = if self.ln_abs >= rhs.ln_abs {
            (self, rhs)
        } else {
            (rhs, self)
        };
        if hi.is_infinite() {
            return if lo.is_infinite() && lo.sign != hi.sign {
                Self::nan()
            } else {
                hi
            };
        }
        // d <= 0, finite
        let d = lo.ln_abs - hi.ln_abs;
        if hi.sign == lo.sign {
            Self::new(hi.sign, hi.ln_abs + d.exp().ln_1p())
        } else if d == 0.0 {
            Self::zero()
        } else {
            Self::new(hi.sign, hi.ln_abs + (-d.exp_m1()).ln())
        }
    }
}

impl Sub for LogReal {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Mul for LogReal {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        if self.is_nan() || rhs.is_nan() {
            return Self::nan();
        }
        if self.is_zero() || rhs.is_zero() {
            // 0 * inf is undefined
            return if self.is_infinite() || rhs.is_infinite() {
                Self::nan()
            } else {
                Self::zero()
            };
        }
        Self::new(self.sign * rhs.sign, self.ln_abs + rhs.ln_abs)
    }
}

impl Div for LogReal {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        if self.is_nan() || rhs.is_nan() {
            return Self::nan();
        }
        if rhs.is_zero() {
            return if self.is_zero() {
                Self::nan()
            } else {
                Self::infinity(self.sign)
            };
        }
        if self.is_zero() {
            return Self::zero();
        }
        Self::new(self.sign * rhs.sign, self.ln_abs - rhs.ln_abs)
    }
}

impl Neg for LogReal {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            sign: -self.sign,
            ln_abs: self.ln_abs,
        }
    }
}

impl Scalar for LogReal {
    fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self::nan();
        }
        if value == 0.0 {
            return Self::zero();
        }
        let sign = if value > 0.0 { 1 } else { -1 };
        Self::new(sign, value.abs().ln())
    }

    fn from_constant(constant: &Constant) -> Self {
        let sign = if constant.negative { -1 } else { 1 };
        Self::new(sign, constant.ln_abs)
    }

    fn to_f64(self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        f64::from(self.sign) * self.ln_abs.exp()
    }

    fn powi(self, exponent: i64) -> Self {
        if exponent == 0 {
            return Self::one();
        }
        if self.is_nan() {
            return Self::nan();
        }
        if self.is_zero() {
            return if exponent > 0 {
                Self::zero()
            } else {
                Self::infinity(1)
            };
        }
        let sign = if self.sign < 0 && exponent % 2 != 0 { -1 } else { 1 };
        Self::new(sign, self.ln_abs * exponent as f64)
    }

    fn powf(self, exponent: Self) -> Self {
        let x = exponent.to_f64();
        if x == 0.0 {
            return Self::one();
        }
        if x.fract() == 0.0 && x.abs() < 9.0e15 {
            return self.powi(x as i64);
        }
        if self.is_nan() || x.is_nan() || self.sign < 0 {
            return Self::nan();
        }
        if self.is_zero() {
            return if x > 0.0 {
                Self::zero()
            } else {
                Self::infinity(1)
            };
        }
        Self::new(1, self.ln_abs * x)
    }

    fn sin(self) -> Self {
        Self::from_f64(self.to_f64().sin())
    }

    fn cos(self) -> Self {
        Self::from_f64(self.to_f64().cos())
    }

    fn exp(self) -> Self {
        if self.is_nan() {
            return Self::nan();
        }
        Self::new(1, self.to_f64())
    }

    fn ln(self) -> Self {
        if self.is_nan() || self.sign < 0 {
            return Self::nan();
        }
        if self.is_zero() {
            return Self::from_f64(f64::NEG_INFINITY);
        }
        Self::from_f64(self.ln_abs)
    }

    fn sinh(self) -> Self {
        let x = self.to_f64();
        if x.abs() < 700.0 {
            return Self::from_f64(x.sinh());
        }
        // sinh x ~ sign(x) e^|x| / 2
        let sign = if x > 0.0 { 1 } else { -1 };
        Self::new(sign, x.abs() - LN_2)
    }

    fn cosh(self) -> Self {
        let x = self.to_f64();
        if x.abs() < 700.0 {
            return Self::from_f64(x.cosh());
        }
        Self::new(1, x.abs() - LN_2)
    }

    fn atan(self) -> Self {
        Self::from_f64(self.to_f64().atan())
    }

    fn abs(self) -> Self {
        Self {
            sign: self.sign.abs(),
            ln_abs: self.ln_abs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * (1.0 + a.abs().max(b.abs()))
    }

    #[test]
    fn products_of_huge_and_tiny_factors_stay_finite() {
        let big = LogReal::new(1, 40_000.0);
        let small = LogReal::new(1, -40_000.0 + 2.0_f64.ln());
        assert!(big.to_f64().is_infinite());
        // ln(2) is recovered from two logs of size 4e4, so only ~1e-11 survives.
        assert!(((big * small).to_f64() - 2.0).abs() < 1e-9);
        assert!(close((big / LogReal::new(1, 40_000.0)).to_f64(), 1.0));
    }

    #[test]
    fn exact_cancellation_gives_zero() {
        let x = LogReal::from_f64(3.5);
        assert!((x - x).is_zero());
        assert_eq!((x - x).to_f64(), 0.0);
    }

    #[test]
    fn integer_powers_track_sign_parity() {
        let x = LogReal::from_f64(-2.0);
        assert!(close(x.powi(3).to_f64(), -8.0));
        assert!(close(x.powi(-2).to_f64(), 0.25));
        assert!(x.powf(LogReal::from_f64(0.5)).is_nan());
        assert_eq!(LogReal::zero().powi(-1).to_f64(), f64::INFINITY);
    }

    #[test]
    fn exp_and_ln_map_onto_the_log_magnitude() {
        let x = LogReal::from_f64(1000.0);
        let e = x.exp();
        assert!(close(e.ln_abs(), 1000.0));
        assert!(close(e.ln().to_f64(), 1000.0));
        assert!(LogReal::from_f64(-1.0).ln().is_nan());
    }

    #[test]
    fn undefined_combinations_are_nan() {
        let inf = LogReal::infinity(1);
        assert!((inf - inf).is_nan());
        assert!((inf * LogReal::zero()).is_nan());
        assert!((LogReal::zero() / LogReal::zero()).is_nan());
        assert_eq!((inf + inf).to_f64(), f64::INFINITY);
    }

    proptest! {
        #[test]
        fn field_operations_agree_with_f64(a in -1.0e6f64..1.0e6, b in -1.0e6f64..1.0e6) {
            let (la, lb) = (LogReal::from_f64(a), LogReal::from_f64(b));
            prop_assert!(close((la * lb).to_f64(), a * b));
            if b != 0.0 {
                prop_assert!(close((la / lb).to_f64(), a / b));
            }
            // Subtraction loses relative accuracy only to the extent f64 would.
            let sum = (la + lb).to_f64();
            prop_assert!((sum - (a + b)).abs() <= 1e-9 * (a.abs() + b.abs()));
        }

        #[test]
        fn elementary_functions_agree_with_f64(x in -20.0f64..20.0) {
            let lx = LogReal::from_f64(x);
            prop_assert!(close(lx.sin().to_f64(), x.sin()));
            prop_assert!(close(lx.exp().to_f64(), x.exp()));
            prop_assert!(close(lx.sinh().to_f64(), x.sinh()));
            prop_assert!(close(lx.cosh().to_f64(), x.cosh()));
            prop_assert!(close(lx.atan().to_f64(), x.atan()));
        }
    }
}
