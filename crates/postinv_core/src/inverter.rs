//! Post's inversion formula.
//!
//! ```text
//! f(t) = lim_{q -> inf} (-1)^q / q! * (q/t)^(q+1) * F^(q)(q/t)
//! ```
//!
//! The truncated formula is built exactly for a fixed `q`: differentiate `F` `q`
//! times, substitute `s = q/t`, and multiply in the prefactor term by term so the
//! large rational constants cancel before anything is rounded.

use crate::engine::ExactEngine;
use crate::error::InversionError;
use crate::evaluator::NumericEvaluator;
use crate::expr::Expr;
use crate::options::InversionOptions;
use crate::parser::parse;
use crate::rational::Rational;
use crate::traits::SymbolicEngine;
use log::debug;

/// Result of an inversion, depending on `InversionOptions::numeric`.
#[derive(Debug, Clone)]
pub enum Inversion {
    Symbolic(Expr),
    Numeric(NumericEvaluator),
}

impl Inversion {
    pub fn as_symbolic(&self) -> Option<&Expr> {
        match self {
            Inversion::Symbolic(expr) => Some(expr),
            Inversion::Numeric(_) => None,
        }
    }

    pub fn as_numeric(&self) -> Option<&NumericEvaluator> {
        match self {
            Inversion::Numeric(evaluator) => Some(evaluator),
            Inversion::Symbolic(_) => None,
        }
    }

    pub fn into_symbolic(self) -> Option<Expr> {
        match self {
            Inversion::Symbolic(expr) => Some(expr),
            Inversion::Numeric(_) => None,
        }
    }

    pub fn into_numeric(self) -> Option<NumericEvaluator> {
        match self {
            Inversion::Numeric(evaluator) => Some(evaluator),
            Inversion::Symbolic(_) => None,
        }
    }
}

/// Inverts Laplace transforms with a fixed configuration.
///
/// Holds no mutable state; share it freely between threads.
#[derive(Debug, Clone)]
pub struct Inverter<E: SymbolicEngine = ExactEngine> {
    engine: E,
    options: InversionOptions,
}

impl Inverter<ExactEngine> {
    pub fn new(options: InversionOptions) -> Self {
        Self::with_engine(ExactEngine, options)
    }
}

impl Default for Inverter<ExactEngine> {
    fn default() -> Self {
        Self::new(InversionOptions::default())
    }
}

impl<E: SymbolicEngine> Inverter<E> {
    pub fn with_engine(engine: E, options: InversionOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &InversionOptions {
        &self.options
    }

    /// The exact truncated inverse `f_q(t)` as an expression in the time symbol.
    pub fn time_domain(&self, transform: &Expr) -> Result<Expr, InversionError> {
        self.options.validate()?;
        let q = self.options.derivative_order()?;
        let s = self.options.frequency_symbol.as_str();
        let t = self.options.time_symbol.as_str();

        let foreign: Vec<String> = transform
            .free_symbols()
            .into_iter()
            .filter(|symbol| symbol != s)
            .collect();
        if !foreign.is_empty() {
            return Err(InversionError::InvalidTransform(format!(
                "transform must depend on `{s}` only, found {}",
                foreign.join(", ")
            )));
        }

        debug!(
            "inverting {} term(s) of F({s}) with q = {q}",
            transform.term_count()
        );
        let derivative = self.engine.differentiate(transform, s, q)?;

        // s = q/t
        let point = Expr::mul(vec![
            Expr::Num(Rational::from(q)),
            Expr::pow(Expr::symbol(t), Expr::integer(-1)),
        ]);
        let at_point = self.engine.substitute(&derivative, s, &point);

        let sign = if q % 2 == 0 { 1 } else { -1 };
        let prefactor = Expr::mul(vec![
            Expr::Num(Rational::from_integer(sign) / Rational::factorial(q)),
            Expr::pow(point, Expr::Num(Rational::from(q + 1))),
        ]);
        let result = distribute(prefactor, at_point);
        debug!("f_q({t}) has {} term(s)", result.term_count());
        Ok(result)
    }

    /// Inverts `transform`, returning the form selected by the options.
    pub fn invert(&self, transform: &Expr) -> Result<Inversion, InversionError> {
        if self.options.numeric {
            self.invert_numeric(transform).map(Inversion::Numeric)
        } else {
            self.invert_symbolic(transform).map(Inversion::Symbolic)
        }
    }

    pub fn invert_symbolic(&self, transform: &Expr) -> Result<Expr, InversionError> {
        self.time_domain(transform)
    }

    pub fn invert_numeric(&self, transform: &Expr) -> Result<NumericEvaluator, InversionError> {
        let f = self.time_domain(transform)?;
        self.engine
            .compile_numeric(&f, &self.options.time_symbol, &self.options)
    }

    /// Parses `text` as a transform in the frequency symbol and inverts it.
    pub fn invert_str(&self, text: &str) -> Result<Inversion, InversionError> {
        let transform = parse(text)?;
        self.invert(&transform)
    }
}

/// Inverts `transform` (a function of `s`) with order `order` and default settings.
pub fn invert(transform: &Expr, order: i64, numeric: bool) -> Result<Inversion, InversionError> {
    let options = InversionOptions {
        order,
        numeric,
        ..InversionOptions::default()
    };
    Inverter::new(options).invert(transform)
}

fn distribute(factor: Expr, expr: Expr) -> Expr {
    match expr {
        Expr::Add(terms) => Expr::add(
            terms
                .into_iter()
                .map(|term| Expr::mul(vec![factor.clone(), term]))
                .collect(),
        ),
        other => Expr::mul(vec![factor, other]),
    }
}
