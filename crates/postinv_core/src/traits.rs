use crate::equation_engine::Constant;
use crate::error::InversionError;
use crate::evaluator::NumericEvaluator;
use crate::expr::Expr;
use crate::options::InversionOptions;
use num_traits::{One, Zero};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A trait for number types the bytecode VM can run on (`f64`, `LogReal`).
/// Must support field arithmetic, the elementary functions of the engine, and
/// conversion from compiled constants.
pub trait Scalar:
    Copy
    + Debug
    + Send
    + Sync
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    fn from_f64(value: f64) -> Self;

    /// Builds the scalar from a pooled constant; may use the exact logarithm
    /// when the value itself is outside the `f64` range.
    fn from_constant(constant: &Constant) -> Self;

    fn to_f64(self) -> f64;

    fn powi(self, exponent: i64) -> Self;

    fn powf(self, exponent: Self) -> Self;

    fn sin(self) -> Self;

    fn cos(self) -> Self;

    fn exp(self) -> Self;

    fn ln(self) -> Self;

    fn sinh(self) -> Self;

    fn cosh(self) -> Self;

    fn atan(self) -> Self;

    fn abs(self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn from_constant(constant: &Constant) -> Self {
        constant.value
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn powi(self, exponent: i64) -> Self {
        f64::powf(self, exponent as f64)
    }

    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn sinh(self) -> Self {
        f64::sinh(self)
    }

    fn cosh(self) -> Self {
        f64::cosh(self)
    }

    fn atan(self) -> Self {
        f64::atan(self)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// The exact symbolic capability Post's formula consumes.
///
/// Implementations must keep steps 1-3 of the inversion exact; only
/// `compile_numeric` may introduce floating point.
pub trait SymbolicEngine: Send + Sync {
    /// `d^order expr / d var^order`.
    fn differentiate(&self, expr: &Expr, var: &str, order: u64) -> Result<Expr, InversionError>;

    /// `expr` with every occurrence of `var` replaced by `value`.
    fn substitute(&self, expr: &Expr, var: &str, value: &Expr) -> Expr;

    /// Compiles `expr`, a function of `var` alone, into a numeric evaluator.
    fn compile_numeric(
        &self,
        expr: &Expr,
        var: &str,
        options: &InversionOptions,
    ) -> Result<NumericEvaluator, InversionError>;
}
