//! Configuration for an inversion.

use crate::error::InversionError;
use serde::{Deserialize, Serialize};

/// Scalar type the numeric evaluator runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arithmetic {
    /// Sign plus natural log of the magnitude; intermediates never overflow.
    #[default]
    LogScaled,
    /// Plain `f64`; faster, overflows for large orders.
    Float,
}

/// Settings controlling a single inversion.
///
/// Missing fields take their defaults when deserialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionOptions {
    /// Derivative order `q` of Post's formula.
    pub order: i64,
    /// Return a compiled evaluator instead of an expression.
    pub numeric: bool,
    pub frequency_symbol: String,
    pub time_symbol: String,
    pub arithmetic: Arithmetic,
    /// Report non-finite evaluator output as `NumericOverflow`.
    pub strict_finite: bool,
    /// Batches at least this long are evaluated in parallel.
    pub parallel_threshold: usize,
}

impl Default for InversionOptions {
    fn default() -> Self {
        Self {
            order: 10_000,
            numeric: false,
            frequency_symbol: "s".to_string(),
            time_symbol: "t".to_string(),
            arithmetic: Arithmetic::LogScaled,
            strict_finite: false,
            parallel_threshold: 1024,
        }
    }
}

impl InversionOptions {
    pub fn with_order(order: i64) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Checks the order and the symbol configuration.
    pub fn validate(&self) -> Result<(), InversionError> {
        if self.order < 1 {
            return Err(InversionError::InvalidOrder(self.order));
        }
        if self.frequency_symbol.is_empty() || self.time_symbol.is_empty() {
            return Err(InversionError::InvalidOptions(
                "symbol names must not be empty".to_string(),
            ));
        }
        if self.frequency_symbol == self.time_symbol {
            return Err(InversionError::InvalidOptions(format!(
                "frequency and time symbols are both `{}`",
                self.time_symbol
            )));
        }
        if self.parallel_threshold == 0 {
            return Err(InversionError::InvalidOptions(
                "parallel_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `q` as an unsigned derivative order; call after `validate`.
    pub(crate) fn derivative_order(&self) -> Result<u64, InversionError> {
        u64::try_from(self.order).map_err(|_| InversionError::InvalidOrder(self.order))
    }
}
