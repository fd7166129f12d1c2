//! Exact differentiation.
//!
//! `derivative` applies the structural rules once. `nth_derivative` works term by term
//! and prefers, in order: a closed form for a single elementary factor of a linear
//! argument, the Leibniz rule for two such factors, and finally repeated first
//! derivatives with canonical simplification after every step.

use crate::error::InversionError;
use crate::expr::{Expr, Function};
use crate::rational::Rational;
use log::{debug, trace};
use num_traits::{One, Zero};

/// First derivative of `expr` with respect to `var`.
pub fn derivative(expr: &Expr, var: &str) -> Result<Expr, InversionError> {
    if !expr.contains(var) {
        return Ok(Expr::zero());
    }
    match expr {
        Expr::Num(_) => Ok(Expr::zero()),
        Expr::Symbol(_) => Ok(Expr::one()),
        Expr::Add(terms) => {
            let derived = terms
                .iter()
                .map(|term| derivative(term, var))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::add(derived))
        }
        Expr::Mul(factors) => {
            // Product rule
            let mut terms = Vec::with_capacity(factors.len());
            for (i, factor) in factors.iter().enumerate() {
                let d = derivative(factor, var)?;
                if d.is_zero() {
                    continue;
                }
                let mut product: Vec<Expr> = factors
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, other)| other.clone())
                    .collect();
                product.push(d);
                terms.push(Expr::mul(product));
            }
            Ok(Expr::add(terms))
        }
        Expr::Pow(base, exponent) => {
            let base = base.as_ref();
            let exponent = exponent.as_ref();
            if !exponent.contains(var) {
                // e * b^(e-1) * b'
                let reduced = Expr::pow(base.clone(), exponent.clone() - Expr::one());
                return Ok(Expr::mul(vec![
                    exponent.clone(),
                    reduced,
                    derivative(base, var)?,
                ]));
            }
            let ln_base = Expr::func(Function::Ln, base.clone());
            let inner = if !base.contains(var) {
                Expr::mul(vec![derivative(exponent, var)?, ln_base])
            } else {
                // b^e * (e' ln b + e b' / b)
                Expr::add(vec![
                    Expr::mul(vec![derivative(exponent, var)?, ln_base]),
                    Expr::mul(vec![
                        exponent.clone(),
                        derivative(base, var)?,
                        Expr::pow(base.clone(), Expr::integer(-1)),
                    ]),
                ])
            };
            Ok(Expr::mul(vec![expr.clone(), inner]))
        }
        Expr::Func(function, arg) => {
            let arg = arg.as_ref();
            let outer = match function {
                Function::Sin => Expr::func(Function::Cos, arg.clone()),
                Function::Cos => -Expr::func(Function::Sin, arg.clone()),
                Function::Exp => expr.clone(),
                Function::Ln => Expr::pow(arg.clone(), Expr::integer(-1)),
                Function::Sinh => Expr::func(Function::Cosh, arg.clone()),
                Function::Cosh => Expr::func(Function::Sinh, arg.clone()),
                Function::Atan => Expr::pow(
                    Expr::one() + Expr::pow(arg.clone(), Expr::integer(2)),
                    Expr::integer(-1),
                ),
                Function::Abs => {
                    return Err(InversionError::InvalidTransform(format!(
                        "abs({arg}) has no exact derivative with respect to {var}"
                    )))
                }
            };
            Ok(Expr::mul(vec![outer, derivative(arg, var)?]))
        }
    }
}

/// `d^order expr / d var^order`, exactly.
pub fn nth_derivative(expr: &Expr, var: &str, order: u64) -> Result<Expr, InversionError> {
    if order == 0 {
        return Ok(expr.clone());
    }
    if !expr.contains(var) {
        return Ok(Expr::zero());
    }
    let terms: Vec<Expr> = match expr {
        Expr::Add(terms) => terms.clone(),
        other => vec![other.clone()],
    };
    let derived = terms
        .iter()
        .map(|term| term_derivative(term, var, order))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::add(derived))
}

fn term_derivative(term: &Expr, var: &str, order: u64) -> Result<Expr, InversionError> {
    let (coeff, rest) = term.clone().split_coefficient();
    let factors = match rest {
        Expr::Mul(factors) => factors,
        other => vec![other],
    };
    let (dependent, mut constant): (Vec<Expr>, Vec<Expr>) =
        factors.into_iter().partition(|factor| factor.contains(var));
    constant.push(Expr::Num(coeff));

    let elementary: Option<Vec<Elementary>> = dependent
        .iter()
        .map(|factor| Elementary::recognise(factor, var))
        .collect();

    let derived = match (dependent.len(), elementary) {
        (0, _) => return Ok(Expr::zero()),
        (1, Some(mut single)) => single.remove(0).nth(order),
        (2, Some(pair)) => leibniz(&pair[0], &pair[1], order),
        (_, _) => {
            debug!(
                "no closed form for {} factor(s) of `{term}`; differentiating {order} times",
                dependent.len()
            );
            repeated_derivative(&Expr::mul(dependent), var, order)?
        }
    };
    constant.push(derived);
    Ok(Expr::mul(constant))
}

/// `order` successive first derivatives.
pub(crate) fn repeated_derivative(
    expr: &Expr,
    var: &str,
    order: u64,
) -> Result<Expr, InversionError> {
    let mut current = expr.clone();
    for step in 1..=order {
        current = derivative(&current, var)?;
        if current.is_zero() {
            trace!("derivative vanished at step {step}");
            break;
        }
        if step % 64 == 0 {
            trace!("step {step}/{order}: {} terms", current.term_count());
        }
    }
    Ok(current)
}

/// `d^q (f g) = sum_k C(q, k) f^(k) g^(q-k)`
fn leibniz(first: &Elementary, second: &Elementary, order: u64) -> Expr {
    let f = first.derivatives(order);
    let g = second.derivatives(order);
    let q = Rational::from(order);
    let mut binomial = Rational::one();
    let mut terms = Vec::with_capacity(f.len());
    for (k, (fk, gk)) in f.iter().zip(g.iter().rev()).enumerate() {
        terms.push(Expr::mul(vec![
            Expr::Num(binomial.clone()),
            fk.clone(),
            gk.clone(),
        ]));
        let k = Rational::from(k as u64);
        binomial = binomial * (q.clone() - &k) / (k + Rational::one());
    }
    Expr::add(terms)
}

/// A single factor with a closed-form derivative of every order.
#[derive(Debug, Clone)]
enum Elementary {
    /// `(a s + b)^n`
    Power {
        base: Expr,
        slope: Expr,
        exponent: Rational,
    },
    /// `exp(a s + b)`
    Exp { arg: Expr, slope: Expr },
    /// `sin`, `cos`, `sinh` or `cosh` of `a s + b`
    Periodic {
        function: Function,
        arg: Expr,
        slope: Expr,
    },
}

impl Elementary {
    fn recognise(factor: &Expr, var: &str) -> Option<Self> {
        match factor {
            Expr::Pow(base, exponent) => {
                let Expr::Num(n) = exponent.as_ref() else {
                    return None;
                };
                Some(Elementary::Power {
                    slope: linear_slope(base, var)?,
                    base: base.as_ref().clone(),
                    exponent: n.clone(),
                })
            }
            Expr::Func(Function::Exp, arg) => Some(Elementary::Exp {
                slope: linear_slope(arg, var)?,
                arg: arg.as_ref().clone(),
            }),
            Expr::Func(
                function @ (Function::Sin | Function::Cos | Function::Sinh | Function::Cosh),
                arg,
            ) => Some(Elementary::Periodic {
                function: *function,
                slope: linear_slope(arg, var)?,
                arg: arg.as_ref().clone(),
            }),
            Expr::Func(..) => None,
            other => Some(Elementary::Power {
                slope: linear_slope(other, var)?,
                base: other.clone(),
                exponent: Rational::one(),
            }),
        }
    }

    fn slope(&self) -> &Expr {
        match self {
            Elementary::Power { slope, .. }
            | Elementary::Exp { slope, .. }
            | Elementary::Periodic { slope, .. } => slope,
        }
    }

    /// The `k`-th derivative given `scale = a^k` (times the falling factorial for powers).
    fn assemble(&self, k: u64, scale: Expr) -> Expr {
        match self {
            Elementary::Power { base, exponent, .. } => Expr::mul(vec![
                scale,
                Expr::pow(base.clone(), Expr::Num(exponent.clone() - Rational::from(k))),
            ]),
            Elementary::Exp { arg, .. } => {
                Expr::mul(vec![scale, Expr::func(Function::Exp, arg.clone())])
            }
            Elementary::Periodic { function, arg, .. } => {
                let (sign, shifted) = periodic_shift(*function, k);
                Expr::mul(vec![
                    Expr::integer(sign),
                    scale,
                    Expr::func(shifted, arg.clone()),
                ])
            }
        }
    }

    fn nth(&self, k: u64) -> Expr {
        let slope_power = Expr::pow(self.slope().clone(), Expr::Num(Rational::from(k)));
        let scale = match self {
            Elementary::Power { exponent, .. } => {
                let falling = exponent.falling_factorial(k);
                if falling.is_zero() {
                    return Expr::zero();
                }
                Expr::mul(vec![Expr::Num(falling), slope_power])
            }
            _ => slope_power,
        };
        self.assemble(k, scale)
    }

    /// Derivatives of order `0..=order`, sharing the running coefficient.
    ///
    /// Grows as it goes; the cost of a large `order` is paid term by term.
    fn derivatives(&self, order: u64) -> Vec<Expr> {
        let mut out = Vec::new();
        let mut scale = Expr::one();
        for k in 0..=order {
            if scale.is_zero() {
                out.push(Expr::zero());
                continue;
            }
            out.push(self.assemble(k, scale.clone()));
            let step = match self {
                Elementary::Power { exponent, .. } => {
                    Expr::Num(exponent.clone() - Rational::from(k))
                }
                _ => Expr::one(),
            };
            scale = Expr::mul(vec![scale, step, self.slope().clone()]);
        }
        out
    }
}

/// `a` when `expr = a var + b` with `var`-free `a != 0`.
fn linear_slope(expr: &Expr, var: &str) -> Option<Expr> {
    let slope = derivative(expr, var).ok()?;
    if slope.is_zero() || slope.contains(var) {
        None
    } else {
        Some(slope)
    }
}

fn periodic_shift(function: Function, k: u64) -> (i64, Function) {
    match (function, k % 4) {
        (Function::Sin, 0) | (Function::Cos, 3) => (1, Function::Sin),
        (Function::Sin, 1) | (Function::Cos, 0) => (1, Function::Cos),
        (Function::Sin, 2) | (Function::Cos, 1) => (-1, Function::Sin),
        (Function::Sin, _) | (Function::Cos, _) => (-1, Function::Cos),
        (Function::Sinh, k) | (Function::Cosh, k) if k % 2 == 0 => (1, function),
        (Function::Sinh, _) => (1, Function::Cosh),
        (Function::Cosh, _) => (1, Function::Sinh),
        (other, _) => (1, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn at(expr: &Expr, value: Expr) -> Expr {
        expr.substitute("s", &value)
    }

    fn three_halves() -> Expr {
        Expr::Num(Rational::from_ratio(3, 2).expect("valid ratio"))
    }

    #[test]
    fn first_derivatives_follow_the_structural_rules() {
        let cases = [
            ("s^3", "3*s^2"),
            ("exp(2*s)", "2*exp(2*s)"),
            ("ln(s)", "1/s"),
            ("atan(s)", "1/(1 + s^2)"),
            ("cos(s)", "-sin(s)"),
            ("2^s", "2^s*ln(2)"),
            ("7", "0"),
        ];
        for (input, expected) in cases {
            let d = derivative(&parse(input).unwrap(), "s").unwrap();
            assert_eq!(d, parse(expected).unwrap(), "d/ds {input}");
        }
    }

    #[test]
    fn sine_cycles_through_its_derivatives() {
        let e = parse("sin(2*s + 1)").unwrap();
        let third = nth_derivative(&e, "s", 3).unwrap();
        assert_eq!(third, parse("-8*cos(2*s + 1)").unwrap());
        let fifth = nth_derivative(&parse("cosh(s/2)").unwrap(), "s", 5).unwrap();
        assert_eq!(fifth, parse("sinh(s/2)/32").unwrap());
    }

    #[test]
    fn closed_form_powers_match_repeated_differentiation() {
        for (text, order) in [("1/(s+1)", 6), ("(3*s - 1)^(5/2)", 4), ("s^3", 3), ("s^3", 4)] {
            let e = parse(text).unwrap();
            let closed = nth_derivative(&e, "s", order).unwrap();
            let repeated = repeated_derivative(&e, "s", order).unwrap();
            assert_eq!(at(&closed, three_halves()), at(&repeated, three_halves()), "{text}, order {order}");
        }
        let d = nth_derivative(&parse("s^3").unwrap(), "s", 4).unwrap();
        assert!(d.is_zero());
    }

    #[test]
    fn leibniz_matches_repeated_differentiation() {
        for text in ["exp(-s)/s", "1/(s*(s + 2))", "s*sin(s)"] {
            let e = parse(text).unwrap();
            for order in 1..=5 {
                let closed = nth_derivative(&e, "s", order).unwrap();
                let repeated = repeated_derivative(&e, "s", order).unwrap();
                assert_eq!(
                    at(&closed, Expr::one()),
                    at(&repeated, Expr::one()),
                    "{text}, order {order}"
                );
            }
        }
    }

    #[test]
    fn derivative_tables_cover_every_order() {
        let cubic = Elementary::recognise(&parse("(2*s + 1)^3").unwrap(), "s").unwrap();
        let table = cubic.derivatives(6);
        assert_eq!(table.len(), 7);
        assert_eq!(table[3], Expr::integer(48));
        assert!(table[4..].iter().all(Expr::is_zero));

        let exp = Elementary::recognise(&parse("exp(-s)").unwrap(), "s").unwrap();
        for (k, entry) in exp.derivatives(5).iter().enumerate() {
            assert_eq!(entry, &exp.nth(k as u64), "order {k}");
        }
        assert!(Elementary::recognise(&parse("exp(s^2)").unwrap(), "s").is_none());
    }

    #[test]
    fn general_transforms_fall_back_to_repeated_differentiation() {
        let e = parse("1/(s^2 + 1) + 4").unwrap();
        let closed = nth_derivative(&e, "s", 3).unwrap();
        let repeated = repeated_derivative(&e, "s", 3).unwrap();
        assert_eq!(at(&closed, three_halves()), at(&repeated, three_halves()));
        // d^3/ds^3 (s^2+1)^-1 at s = 0 is 0 by symmetry
        assert!(at(&closed, Expr::zero()).is_zero());
    }

    #[test]
    fn high_orders_stay_exact() {
        // d^q/ds^q s^-1 = (-1)^q q! s^-(q+1)
        let q = 300;
        let d = nth_derivative(&parse("1/s").unwrap(), "s", q).unwrap();
        let expected = Expr::mul(vec![
            Expr::Num(Rational::factorial(q)),
            Expr::pow(Expr::symbol("s"), Expr::integer(-(q as i64) - 1)),
        ]);
        assert_eq!(d, expected);
    }

    #[test]
    fn abs_of_the_variable_is_rejected() {
        let err = nth_derivative(&parse("abs(s) + 1").unwrap(), "s", 2).unwrap_err();
        assert!(matches!(err, InversionError::InvalidTransform(_)));
        // Constant arguments are fine.
        let d = nth_derivative(&parse("abs(-2)*s^2").unwrap(), "s", 2).unwrap();
        assert_eq!(d, Expr::integer(4));
    }
}
