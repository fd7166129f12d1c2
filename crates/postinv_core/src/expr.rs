//! Exact symbolic expressions in canonical form.
//!
//! Every `Expr` built through the constructors on this type is kept canonical:
//! sums and products are flat and sorted, numeric parts are folded into a single
//! exact `Rational`, like terms are collected and powers of equal bases are merged.
//! Canonical form is what makes repeated inversions observably identical and what
//! lets the prefactor `(q/t)^(q+1)` cancel exactly against the derivative.

use crate::rational::Rational;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops;

/// Elementary functions understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Function {
    Sin,
    Cos,
    Exp,
    Ln,
    Sinh,
    Cosh,
    Atan,
    /// Continuous but without an exact derivative rule.
    Abs,
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Exp => "exp",
            Function::Ln => "ln",
            Function::Sinh => "sinh",
            Function::Cosh => "cosh",
            Function::Atan => "atan",
            Function::Abs => "abs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "exp" => Some(Function::Exp),
            "ln" | "log" => Some(Function::Ln),
            "sinh" => Some(Function::Sinh),
            "cosh" => Some(Function::Cosh),
            "atan" => Some(Function::Atan),
            "abs" => Some(Function::Abs),
            _ => None,
        }
    }
}

/// Symbolic expression tree.
///
/// The derived ordering is the canonical ordering of terms and factors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Num(Rational),
    Symbol(String),
    /// At least two terms; at most one numeric term, which comes first.
    Add(Vec<Expr>),
    /// At least two factors; at most one numeric coefficient, which comes first.
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Func(Function, Box<Expr>),
}

impl Expr {
    pub fn zero() -> Self {
        Expr::Num(Rational::zero())
    }

    pub fn one() -> Self {
        Expr::Num(Rational::one())
    }

    pub fn integer(value: i64) -> Self {
        Expr::Num(Rational::from(value))
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(r) if r.is_zero())
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Num(r) if r.is_one())
    }

    /// Canonical sum.
    pub fn add(terms: Vec<Expr>) -> Expr {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Expr::Add(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        let mut constant = Rational::zero();
        let mut collected: BTreeMap<Expr, Rational> = BTreeMap::new();
        for term in flat {
            match term {
                Expr::Num(r) => constant = constant + r,
                other => {
                    let (coeff, rest) = other.split_coefficient();
                    let entry = collected.entry(rest).or_insert_with(Rational::zero);
                    let updated = &*entry + &coeff;
                    *entry = updated;
                }
            }
        }

        let mut out = Vec::with_capacity(collected.len() + 1);
        if !constant.is_zero() {
            out.push(Expr::Num(constant));
        }
        for (rest, coeff) in collected {
            if !coeff.is_zero() {
                out.push(Expr::scaled(coeff, rest));
            }
        }
        match out.len() {
            0 => Expr::zero(),
            1 => out.pop().unwrap_or_else(Expr::zero),
            _ => Expr::Add(out),
        }
    }

    /// Canonical product.
    pub fn mul(factors: Vec<Expr>) -> Expr {
        let mut flat = Vec::with_capacity(factors.len());
        for factor in factors {
            match factor {
                Expr::Mul(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        let mut coeff = Rational::one();
        let mut powers: BTreeMap<Expr, Vec<Expr>> = BTreeMap::new();
        let mut exp_args = Vec::new();
        for factor in flat {
            match factor {
                Expr::Num(r) => {
                    if r.is_zero() {
                        return Expr::zero();
                    }
                    coeff = coeff * r;
                }
                Expr::Pow(base, exponent) => powers.entry(*base).or_default().push(*exponent),
                Expr::Func(Function::Exp, arg) => exp_args.push(*arg),
                other => powers.entry(other).or_default().push(Expr::one()),
            }
        }

        let mut rebuilt = Vec::with_capacity(powers.len() + 1);
        match exp_args.len() {
            0 => {}
            1 => rebuilt.push(Expr::func(Function::Exp, exp_args.remove(0))),
            _ => rebuilt.push(Expr::func(Function::Exp, Expr::add(exp_args))),
        }
        for (base, mut exponents) in powers {
            let exponent = if exponents.len() == 1 {
                exponents.remove(0)
            } else {
                Expr::add(exponents)
            };
            rebuilt.push(Expr::pow(base, exponent));
        }

        let mut factors = Vec::with_capacity(rebuilt.len() + 1);
        let mut needs_flatten = false;
        for factor in rebuilt {
            match factor {
                Expr::Num(r) => {
                    if r.is_zero() {
                        return Expr::zero();
                    }
                    coeff = coeff * r;
                }
                Expr::Mul(inner) => {
                    needs_flatten = true;
                    factors.extend(inner);
                }
                other => factors.push(other),
            }
        }
        if needs_flatten {
            factors.push(Expr::Num(coeff));
            return Expr::mul(factors);
        }

        factors.sort();
        if factors.is_empty() {
            return Expr::Num(coeff);
        }
        if coeff.is_one() && factors.len() == 1 {
            return factors.remove(0);
        }
        if !coeff.is_one() {
            factors.insert(0, Expr::Num(coeff));
        }
        Expr::Mul(factors)
    }

    /// Canonical power.
    pub fn pow(base: Expr, exponent: Expr) -> Expr {
        if let Expr::Func(Function::Exp, arg) = base {
            return Expr::func(Function::Exp, Expr::mul(vec![*arg, exponent]));
        }
        if base.is_one() {
            return Expr::one();
        }
        let Expr::Num(e) = &exponent else {
            return Expr::Pow(Box::new(base), Box::new(exponent));
        };
        if e.is_zero() {
            return Expr::one();
        }
        if e.is_one() {
            return base;
        }
        let Some(n) = e.to_i64() else {
            return Expr::Pow(Box::new(base), Box::new(exponent));
        };
        match base {
            Expr::Num(b) => match b.pow_i64(n) {
                Some(value) => Expr::Num(value),
                None => Expr::Pow(Box::new(Expr::Num(b)), Box::new(exponent)),
            },
            Expr::Pow(inner_base, inner_exponent) => {
                Expr::pow(*inner_base, Expr::mul(vec![*inner_exponent, exponent]))
            }
            Expr::Mul(factors) => Expr::mul(
                factors
                    .into_iter()
                    .map(|factor| Expr::pow(factor, exponent.clone()))
                    .collect(),
            ),
            other => Expr::Pow(Box::new(other), Box::new(exponent)),
        }
    }

    /// Function application with constant folding at the exact special values.
    pub fn func(function: Function, arg: Expr) -> Expr {
        if let Expr::Num(r) = &arg {
            if r.is_zero() {
                match function {
                    Function::Sin | Function::Sinh | Function::Atan | Function::Abs => {
                        return Expr::zero()
                    }
                    Function::Cos | Function::Cosh | Function::Exp => return Expr::one(),
                    Function::Ln => {}
                }
            }
            if function == Function::Ln && r.is_one() {
                return Expr::zero();
            }
            if function == Function::Abs {
                return Expr::Num(r.abs());
            }
        }
        match (function, arg) {
            (Function::Ln, Expr::Func(Function::Exp, inner)) => *inner,
            (Function::Abs, inner @ Expr::Func(Function::Abs, _)) => inner,
            (function, arg) => Expr::Func(function, Box::new(arg)),
        }
    }

    pub fn neg(expr: Expr) -> Expr {
        Expr::mul(vec![Expr::integer(-1), expr])
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
        Expr::add(vec![lhs, Expr::neg(rhs)])
    }

    pub fn div(numerator: Expr, denominator: Expr) -> Expr {
        Expr::mul(vec![numerator, Expr::pow(denominator, Expr::integer(-1))])
    }

    /// Splits a term into its rational coefficient and the remaining factors.
    pub fn split_coefficient(self) -> (Rational, Expr) {
        match self {
            Expr::Num(r) => (r, Expr::one()),
            Expr::Mul(mut factors) => {
                let coeff = match factors.first() {
                    Some(Expr::Num(c)) => c.clone(),
                    _ => return (Rational::one(), Expr::Mul(factors)),
                };
                factors.remove(0);
                let rest = if factors.len() == 1 {
                    factors.remove(0)
                } else {
                    Expr::Mul(factors)
                };
                (coeff, rest)
            }
            other => (Rational::one(), other),
        }
    }

    fn scaled(coeff: Rational, rest: Expr) -> Expr {
        if coeff.is_one() {
            return rest;
        }
        match rest {
            Expr::Mul(mut factors) => {
                factors.insert(0, Expr::Num(coeff));
                Expr::Mul(factors)
            }
            Expr::Num(r) => Expr::Num(coeff * r),
            other => Expr::Mul(vec![Expr::Num(coeff), other]),
        }
    }

    /// Whether `symbol` occurs anywhere in the expression.
    pub fn contains(&self, symbol: &str) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Symbol(name) => name == symbol,
            Expr::Add(items) | Expr::Mul(items) => items.iter().any(|e| e.contains(symbol)),
            Expr::Pow(base, exponent) => base.contains(symbol) || exponent.contains(symbol),
            Expr::Func(_, arg) => arg.contains(symbol),
        }
    }

    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Symbol(name) => {
                out.insert(name.clone());
            }
            Expr::Add(items) | Expr::Mul(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            Expr::Pow(base, exponent) => {
                base.collect_symbols(out);
                exponent.collect_symbols(out);
            }
            Expr::Func(_, arg) => arg.collect_symbols(out),
        }
    }

    /// Replaces every occurrence of `symbol` by `value` and re-canonicalises.
    pub fn substitute(&self, symbol: &str, value: &Expr) -> Expr {
        if !self.contains(symbol) {
            return self.clone();
        }
        match self {
            Expr::Num(_) => self.clone(),
            Expr::Symbol(_) => value.clone(),
            Expr::Add(terms) => Expr::add(terms.iter().map(|t| t.substitute(symbol, value)).collect()),
            Expr::Mul(factors) => {
                Expr::mul(factors.iter().map(|f| f.substitute(symbol, value)).collect())
            }
            Expr::Pow(base, exponent) => Expr::pow(
                base.substitute(symbol, value),
                exponent.substitute(symbol, value),
            ),
            Expr::Func(function, arg) => Expr::func(*function, arg.substitute(symbol, value)),
        }
    }

    /// Number of top-level terms.
    pub fn term_count(&self) -> usize {
        match self {
            Expr::Add(terms) => terms.len(),
            _ => 1,
        }
    }

    // Binding strength used by `Display`: 1 sum, 2 product, 3 power, 4 atom.
    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(r) if r.is_negative() => 1,
            Expr::Num(r) if !r.is_integer() => 2,
            Expr::Num(_) | Expr::Symbol(_) | Expr::Func(..) => 4,
            Expr::Add(_) => 1,
            Expr::Mul(factors) => match factors.first() {
                Some(Expr::Num(c)) if c.is_negative() => 1,
                _ => 2,
            },
            Expr::Pow(..) => 3,
        }
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "(")?;
            self.fmt_bare(f)?;
            return write!(f, ")");
        }
        self.fmt_bare(f)
    }

    fn fmt_bare(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(r) => write!(f, "{r}"),
            Expr::Symbol(name) => write!(f, "{name}"),
            Expr::Add(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    let (coeff, rest) = term.clone().split_coefficient();
                    if i == 0 {
                        term.fmt_with(f, 1)?;
                    } else if coeff.is_negative() {
                        write!(f, " - ")?;
                        Expr::scaled(-coeff, rest).fmt_with(f, 2)?;
                    } else {
                        write!(f, " + ")?;
                        term.fmt_with(f, 2)?;
                    }
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                let mut rest = factors.iter().peekable();
                if let Some(Expr::Num(c)) = factors.first() {
                    rest.next();
                    if c == &-Rational::one() {
                        write!(f, "-")?;
                    } else {
                        write!(f, "{c}*")?;
                    }
                }
                let mut first = true;
                for factor in rest {
                    if !first {
                        write!(f, "*")?;
                    }
                    factor.fmt_with(f, 3)?;
                    first = false;
                }
                Ok(())
            }
            Expr::Pow(base, exponent) => {
                base.fmt_with(f, 4)?;
                write!(f, "^")?;
                exponent.fmt_with(f, 4)
            }
            Expr::Func(function, arg) => {
                write!(f, "{}(", function.name())?;
                arg.fmt_bare(f)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_bare(f)
    }
}

impl From<Rational> for Expr {
    fn from(value: Rational) -> Self {
        Expr::Num(value)
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::add(vec![self, rhs])
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::sub(self, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::mul(vec![self, rhs])
    }
}

impl ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::div(self, rhs)
    }
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::neg(self)
    }
}
