//! Compiled numeric form of a time-domain expression.

use crate::equation_engine::{Bytecode, VM};
use crate::error::InversionError;
use crate::logreal::LogReal;
use crate::options::{Arithmetic, InversionOptions};
use crate::traits::Scalar;
use log::warn;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::sync::Arc;

/// Evaluates `f(t)` from shared bytecode.
///
/// Stateless and cheap to clone; every call allocates its own VM stack, so one
/// evaluator can be used from any number of threads at once.
#[derive(Debug, Clone)]
pub struct NumericEvaluator {
    bytecode: Arc<Bytecode>,
    arithmetic: Arithmetic,
    strict_finite: bool,
    parallel_threshold: usize,
}

impl NumericEvaluator {
    /// `bytecode` must read the time value from variable slot 0.
    pub fn new(bytecode: Bytecode, options: &InversionOptions) -> Self {
        Self {
            bytecode: Arc::new(bytecode),
            arithmetic: options.arithmetic,
            strict_finite: options.strict_finite,
            parallel_threshold: options.parallel_threshold.max(1),
        }
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    pub fn arithmetic(&self) -> Arithmetic {
        self.arithmetic
    }

    /// `f(t)` for a single positive, finite `t`.
    pub fn evaluate(&self, t: f64) -> Result<f64, InversionError> {
        check_domain(t)?;
        self.evaluate_unchecked(t)
    }

    /// `f(t)` for every element, in input order.
    ///
    /// All inputs are validated before anything is computed; the reported error is
    /// the first failure in input order.
    pub fn evaluate_batch(&self, times: &[f64]) -> Result<Vec<f64>, InversionError> {
        for &t in times {
            check_domain(t)?;
        }
        let results: Vec<Result<f64, InversionError>> = if times.len() >= self.parallel_threshold
        {
            times
                .par_iter()
                .map(|&t| self.evaluate_unchecked(t))
                .collect()
        } else {
            times.iter().map(|&t| self.evaluate_unchecked(t)).collect()
        };
        results.into_iter().collect()
    }

    /// Evaluates a scalar or a collection, preserving its shape.
    pub fn call<I: TimeInput>(&self, input: I) -> Result<I::Output, InversionError> {
        input.evaluate_with(self)
    }

    fn evaluate_unchecked(&self, t: f64) -> Result<f64, InversionError> {
        let value = match self.arithmetic {
            Arithmetic::LogScaled => {
                let mut stack = Vec::with_capacity(self.bytecode.max_stack);
                VM::execute(&self.bytecode, &[LogReal::from_f64(t)], &mut stack)?.to_f64()
            }
            Arithmetic::Float => {
                let mut stack = Vec::with_capacity(self.bytecode.max_stack);
                VM::execute(&self.bytecode, &[t], &mut stack)?
            }
        };
        if !value.is_finite() {
            if self.strict_finite {
                return Err(InversionError::NumericOverflow { time: t, value });
            }
            warn!("f({t}) evaluated to {value}");
        }
        Ok(value)
    }
}

fn check_domain(t: f64) -> Result<(), InversionError> {
    if !t.is_finite() {
        return Err(InversionError::DomainError {
            time: t,
            reason: "time must be finite",
        });
    }
    if t <= 0.0 {
        return Err(InversionError::DomainError {
            time: t,
            reason: "time must be positive",
        });
    }
    Ok(())
}

/// Inputs accepted by [`NumericEvaluator::call`].
pub trait TimeInput {
    type Output;

    fn evaluate_with(self, evaluator: &NumericEvaluator) -> Result<Self::Output, InversionError>;
}

impl TimeInput for f64 {
    type Output = f64;

    fn evaluate_with(self, evaluator: &NumericEvaluator) -> Result<f64, InversionError> {
        evaluator.evaluate(self)
    }
}

impl TimeInput for &[f64] {
    type Output = Vec<f64>;

    fn evaluate_with(self, evaluator: &NumericEvaluator) -> Result<Vec<f64>, InversionError> {
        evaluator.evaluate_batch(self)
    }
}

impl TimeInput for Vec<f64> {
    type Output = Vec<f64>;

    fn evaluate_with(self, evaluator: &NumericEvaluator) -> Result<Vec<f64>, InversionError> {
        evaluator.evaluate_batch(&self)
    }
}

impl TimeInput for &DVector<f64> {
    type Output = DVector<f64>;

    fn evaluate_with(self, evaluator: &NumericEvaluator) -> Result<DVector<f64>, InversionError> {
        Ok(DVector::from_vec(evaluator.evaluate_batch(self.as_slice())?))
    }
}

impl TimeInput for &DMatrix<f64> {
    type Output = DMatrix<f64>;

    fn evaluate_with(self, evaluator: &NumericEvaluator) -> Result<DMatrix<f64>, InversionError> {
        // Column-major storage in, column-major storage out.
        let values = evaluator.evaluate_batch(self.as_slice())?;
        Ok(DMatrix::from_vec(self.nrows(), self.ncols(), values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::Compiler;
    use crate::parser::parse;

    fn evaluator(text: &str, options: &InversionOptions) -> anyhow::Result<NumericEvaluator> {
        let expr = parse(text)?;
        let bytecode = Compiler::new(&[options.time_symbol.clone()]).compile(&expr)?;
        Ok(NumericEvaluator::new(bytecode, options))
    }

    #[test]
    fn evaluator_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NumericEvaluator>();
    }

    #[test]
    fn rejects_times_outside_the_domain() -> anyhow::Result<()> {
        let f = evaluator("exp(-t)", &InversionOptions::default())?;
        for t in [0.0, -0.0, -1.5, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(f.evaluate(t), Err(InversionError::DomainError { .. })),
                "t = {t}"
            );
        }
        assert!((f.evaluate(1.0)? - (-1.0f64).exp()).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn batch_errors_name_the_first_offender() -> anyhow::Result<()> {
        let f = evaluator("t", &InversionOptions::default())?;
        match f.evaluate_batch(&[1.0, -2.0, 0.0]) {
            Err(InversionError::DomainError { time, .. }) => assert_eq!(time, -2.0),
            other => panic!("expected a domain error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn parallel_batches_keep_input_order() -> anyhow::Result<()> {
        let options = InversionOptions {
            parallel_threshold: 8,
            ..InversionOptions::default()
        };
        let f = evaluator("t^2 + 1/t", &options)?;
        let times: Vec<f64> = (1..=2000).map(|i| i as f64 * 0.01).collect();
        let parallel = f.evaluate_batch(&times)?;
        let sequential: Vec<f64> = times
            .iter()
            .map(|&t| f.evaluate(t))
            .collect::<Result<_, _>>()?;
        assert_eq!(parallel, sequential);
        Ok(())
    }

    #[test]
    fn shapes_are_preserved() -> anyhow::Result<()> {
        // Float arithmetic keeps `2*t` exact, so values compare with `==`.
        let float = InversionOptions {
            arithmetic: Arithmetic::Float,
            ..InversionOptions::default()
        };
        let f = evaluator("2*t", &float)?;
        assert_eq!(f.call(1.5)?, 3.0);
        assert_eq!(f.call(vec![1.0, 2.0])?, vec![2.0, 4.0]);
        assert_eq!(f.call(&[0.5][..])?, vec![1.0]);

        let v = DVector::from_vec(vec![1.0, 3.0, 5.0]);
        assert_eq!(f.call(&v)?, v.map(|t| 2.0 * t));

        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = f.call(&m)?;
        assert_eq!(out.shape(), (2, 3));
        assert_eq!(out[(1, 0)], 8.0);
        assert_eq!(out[(0, 2)], 6.0);
        Ok(())
    }

    #[test]
    fn log_scaled_results_are_within_rounding_of_exact() -> anyhow::Result<()> {
        // exp(ln 2 + ln 1.5) is one ulp short of 3.
        let f = evaluator("2*t", &InversionOptions::default())?;
        let close = |a: f64, b: f64| (a - b).abs() <= 1e-14 * b.abs();
        assert!(close(f.call(1.5)?, 3.0));
        for (value, t) in f.call(vec![0.5, 3.0, 40.0])?.iter().zip([0.5, 3.0, 40.0]) {
            assert!(close(*value, 2.0 * t), "t = {t}: {value}");
        }
        let m = DMatrix::from_row_slice(1, 2, &[1.25, 7.0]);
        let out = f.call(&m)?;
        assert_eq!(out.shape(), (1, 2));
        assert!(close(out[(0, 1)], 14.0));
        Ok(())
    }

    #[test]
    fn arithmetic_modes_agree_on_moderate_values() -> anyhow::Result<()> {
        let log_scaled = evaluator("sin(t)*exp(-t/3) + t^(3/2)", &InversionOptions::default())?;
        let float = evaluator(
            "sin(t)*exp(-t/3) + t^(3/2)",
            &InversionOptions {
                arithmetic: Arithmetic::Float,
                ..InversionOptions::default()
            },
        )?;
        for t in [0.1, 1.0, 7.5, 40.0] {
            let (a, b) = (log_scaled.evaluate(t)?, float.evaluate(t)?);
            assert!((a - b).abs() <= 1e-10 * b.abs().max(1.0), "t = {t}: {a} vs {b}");
        }
        Ok(())
    }

    #[test]
    fn non_finite_values_are_reported_only_when_strict() -> anyhow::Result<()> {
        let lenient = InversionOptions {
            arithmetic: Arithmetic::Float,
            ..InversionOptions::default()
        };
        let f = evaluator("exp(t)", &lenient)?;
        assert_eq!(f.evaluate(1000.0)?, f64::INFINITY);

        let strict = InversionOptions {
            strict_finite: true,
            ..lenient
        };
        let f = evaluator("exp(t)", &strict)?;
        assert!(matches!(
            f.evaluate(1000.0),
            Err(InversionError::NumericOverflow { time, .. }) if time == 1000.0
        ));
        assert!(f.evaluate(1.0).is_ok());
        Ok(())
    }
}
