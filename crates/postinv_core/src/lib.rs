pub mod diff;
pub mod engine;
pub mod equation_engine;
pub mod error;
pub mod evaluator;
pub mod expr;
/// The `postinv_core` crate computes numerical inverse Laplace transforms with Post's
/// formula, `f(t) ~ (-1)^q / q! * (q/t)^(q+1) * F^(q)(q/t)`, for a caller-chosen order `q`.
/// Everything up to the numeric evaluator is exact.
///
/// Key components:
/// - **Inverter**: `Inverter` / `invert`, producing a symbolic `f(t)` or a `NumericEvaluator`.
/// - **Symbolic engine**: `Rational` (dashu), canonical `Expr`, the parser and exact
///   high-order differentiation, behind the `SymbolicEngine` trait.
/// - **Equation Engine**: A bytecode VM generic over `Scalar`, run on `f64` or on the
///   overflow-free `LogReal`.
/// - **Evaluator**: domain-checked scalar, batch (rayon) and nalgebra evaluation.
pub mod inverter;
pub mod logreal;
pub mod options;
pub mod parser;
pub mod rational;
pub mod traits;

pub use engine::ExactEngine;
pub use error::{InversionError, ParseError};
pub use evaluator::{NumericEvaluator, TimeInput};
pub use expr::{Expr, Function};
pub use inverter::{invert, Inversion, Inverter};
pub use options::{Arithmetic, InversionOptions};
pub use parser::parse;
pub use rational::Rational;
pub use traits::{Scalar, SymbolicEngine};
