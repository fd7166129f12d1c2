use crate::diff::nth_derivative;
use crate::equation_engine::Compiler;
use crate::error::InversionError;
use crate::evaluator::NumericEvaluator;
use crate::expr::Expr;
use crate::options::InversionOptions;
use crate::traits::SymbolicEngine;

/// The in-crate exact engine: canonical rational expressions, closed-form
/// high-order derivatives and the bytecode compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactEngine;

impl SymbolicEngine for ExactEngine {
    fn differentiate(&self, expr: &Expr, var: &str, order: u64) -> Result<Expr, InversionError> {
        nth_derivative(expr, var, order)
    }

    fn substitute(&self, expr: &Expr, var: &str, value: &Expr) -> Expr {
        expr.substitute(var, value)
    }

    fn compile_numeric(
        &self,
        expr: &Expr,
        var: &str,
        options: &InversionOptions,
    ) -> Result<NumericEvaluator, InversionError> {
        let bytecode = Compiler::new(&[var.to_string()]).compile(expr)?;
        Ok(NumericEvaluator::new(bytecode, options))
    }
}
