use crate::error::InversionError;
use crate::expr::{Expr, Function};
use crate::rational::Rational;
use crate::traits::Scalar;
use num_traits::One;
use std::collections::HashMap;

/// A pooled numeric constant, pre-converted for every scalar type.
///
/// `value` may saturate to an infinity or zero; `ln_abs` is computed from the exact
/// rational and stays meaningful either way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    pub value: f64,
    pub negative: bool,
    pub ln_abs: f64,
}

impl Constant {
    pub fn from_rational(value: &Rational) -> Self {
        Self {
            value: value.to_f64(),
            negative: value.is_negative(),
            ln_abs: value.ln_abs(),
        }
    }
}

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values (f64 or LogReal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes the constant at the given pool index.
    LoadConst(usize),
    /// Pushes the value of a variable (by index).
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes a^n for an exact integer n.
    PowInt(i64),
    /// Pops top value (a), pushes -a.
    Neg,
    Sin,
    Cos,
    Exp,
    Ln,
    Sinh,
    Cosh,
    Atan,
    Abs,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
    pub constants: Vec<Constant>,
    /// Deepest stack the program reaches.
    pub max_stack: usize,
}

/// Stack-based Virtual Machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Variable values (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the single value left on the stack.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        stack: &mut Vec<T>,
    ) -> Result<T, InversionError> {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(idx) => {
                    let constant = bytecode.constants.get(idx).ok_or_else(|| {
                        InversionError::Evaluation(format!("constant {idx} out of range"))
                    })?;
                    stack.push(T::from_constant(constant));
                }
                OpCode::LoadVar(idx) => {
                    let value = vars.get(idx).ok_or_else(|| {
                        InversionError::Evaluation(format!("variable {idx} out of range"))
                    })?;
                    stack.push(*value);
                }
                OpCode::Add => binary(stack, |a, b| a + b)?,
                OpCode::Sub => binary(stack, |a, b| a - b)?,
                OpCode::Mul => binary(stack, |a, b| a * b)?,
                OpCode::Div => binary(stack, |a, b| a / b)?,
                OpCode::Pow => binary(stack, |a, b| a.powf(b))?,
                OpCode::PowInt(n) => unary(stack, |a| a.powi(n))?,
                OpCode::Neg => unary(stack, |a| -a)?,
                OpCode::Sin => unary(stack, T::sin)?,
                OpCode::Cos => unary(stack, T::cos)?,
                OpCode::Exp => unary(stack, T::exp)?,
                OpCode::Ln => unary(stack, T::ln)?,
                OpCode::Sinh => unary(stack, T::sinh)?,
                OpCode::Cosh => unary(stack, T::cosh)?,
                OpCode::Atan => unary(stack, T::atan)?,
                OpCode::Abs => unary(stack, T::abs)?,
            }
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(result), true) => Ok(result),
            (None, _) => Err(InversionError::Evaluation("empty program".to_string())),
            (Some(_), false) => Err(InversionError::Evaluation(
                "program left extra values on the stack".to_string(),
            )),
        }
    }
}

fn unary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T) -> T) -> Result<(), InversionError> {
    let a = stack.pop().ok_or_else(underflow)?;
    stack.push(f(a));
    Ok(())
}

fn binary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T, T) -> T) -> Result<(), InversionError> {
    let b = stack.pop().ok_or_else(underflow)?;
    let a = stack.pop().ok_or_else(underflow)?;
    stack.push(f(a, b));
    Ok(())
}

fn underflow() -> InversionError {
    InversionError::Evaluation("stack underflow".to_string())
}

/// Compiles an `Expr` into `Bytecode`.
/// Resolves variable names to indices and pools the exact constants.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String]) -> Self {
        let mut var_map = HashMap::new();
        for (i, name) in var_names.iter().enumerate() {
            var_map.insert(name.clone(), i);
        }
        Self { var_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, InversionError> {
        let mut emitter = Emitter::default();
        self.compile_recursive(expr, &mut emitter)?;
        Ok(Bytecode {
            ops: emitter.ops,
            constants: emitter.constants,
            max_stack: emitter.max_depth,
        })
    }

    fn compile_recursive(&self, expr: &Expr, out: &mut Emitter) -> Result<(), InversionError> {
        match expr {
            Expr::Num(value) => out.constant(value),
            Expr::Symbol(name) => {
                let idx = self.var_map.get(name).ok_or_else(|| {
                    InversionError::InvalidTransform(format!("unbound symbol `{name}`"))
                })?;
                out.push(OpCode::LoadVar(*idx));
            }
            Expr::Add(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    let (coeff, rest) = term.clone().split_coefficient();
                    if i > 0 && coeff.is_negative() && !rest.is_one() {
                        self.compile_scaled(&-coeff, &rest, out)?;
                        out.push(OpCode::Sub);
                    } else {
                        self.compile_recursive(term, out)?;
                        if i > 0 {
                            out.push(OpCode::Add);
                        }
                    }
                }
            }
            Expr::Mul(_) => {
                let (coeff, rest) = expr.clone().split_coefficient();
                if coeff == -Rational::one() {
                    self.compile_recursive(&rest, out)?;
                    out.push(OpCode::Neg);
                } else {
                    self.compile_scaled(&coeff, &rest, out)?;
                }
            }
            Expr::Pow(base, exponent) => {
                self.compile_recursive(base, out)?;
                let integer = match exponent.as_ref() {
                    Expr::Num(n) => n.to_i64(),
                    _ => None,
                };
                match integer {
                    Some(n) => out.push(OpCode::PowInt(n)),
                    None => {
                        self.compile_recursive(exponent, out)?;
                        out.push(OpCode::Pow);
                    }
                }
            }
            Expr::Func(function, arg) => {
                self.compile_recursive(arg, out)?;
                out.push(match function {
                    Function::Sin => OpCode::Sin,
                    Function::Cos => OpCode::Cos,
                    Function::Exp => OpCode::Exp,
                    Function::Ln => OpCode::Ln,
                    Function::Sinh => OpCode::Sinh,
                    Function::Cosh => OpCode::Cosh,
                    Function::Atan => OpCode::Atan,
                    Function::Abs => OpCode::Abs,
                });
            }
        }
        Ok(())
    }

    /// `coeff * f1 * f2 * ...`, dividing instead of multiplying by reciprocals.
    fn compile_scaled(
        &self,
        coeff: &Rational,
        rest: &Expr,
        out: &mut Emitter,
    ) -> Result<(), InversionError> {
        let factors: Vec<&Expr> = match rest {
            Expr::Mul(factors) => factors.iter().collect(),
            other => vec![other],
        };
        let mut started = false;
        if !coeff.is_one() {
            out.constant(coeff);
            started = true;
        }
        for factor in factors {
            if let Expr::Pow(base, exponent) = factor {
                if started && exponent.as_ref() == &Expr::integer(-1) {
                    self.compile_recursive(base, out)?;
                    out.push(OpCode::Div);
                    continue;
                }
            }
            self.compile_recursive(factor, out)?;
            if started {
                out.push(OpCode::Mul);
            }
            started = true;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Emitter {
    ops: Vec<OpCode>,
    constants: Vec<Constant>,
    depth: usize,
    max_depth: usize,
}

impl Emitter {
    fn push(&mut self, op: OpCode) {
        match op {
            OpCode::LoadConst(_) | OpCode::LoadVar(_) => {
                self.depth += 1;
                self.max_depth = self.max_depth.max(self.depth);
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                self.depth = self.depth.saturating_sub(1);
            }
            _ => {}
        }
        self.ops.push(op);
    }

    fn constant(&mut self, value: &Rational) {
        self.constants.push(Constant::from_rational(value));
        let idx = self.constants.len() - 1;
        self.push(OpCode::LoadConst(idx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logreal::LogReal;
    use crate::parser::parse;

    fn compile(text: &str) -> Bytecode {
        let expr = parse(text).expect("valid expression");
        Compiler::new(&["t".to_string()])
            .compile(&expr)
            .expect("compiles")
    }

    fn eval_f64(bytecode: &Bytecode, t: f64) -> f64 {
        let mut stack = Vec::with_capacity(bytecode.max_stack);
        VM::execute(bytecode, &[t], &mut stack).expect("runs")
    }

    #[test]
    fn evaluates_polynomials_and_quotients() {
        let code = compile("3*t^2 - 2*t + 1");
        assert_eq!(eval_f64(&code, 2.0), 9.0);
        let code = compile("(t + 1)/(t - 1)");
        assert_eq!(eval_f64(&code, 3.0), 2.0);
        assert!(code.ops.contains(&OpCode::Div));
        let code = compile("1/(t + 1)");
        assert_eq!(code.ops.last(), Some(&OpCode::PowInt(-1)));
    }

    #[test]
    fn reciprocal_factors_compile_to_division() {
        let code = compile("5/t");
        assert_eq!(
            code.ops,
            vec![OpCode::LoadConst(0), OpCode::LoadVar(0), OpCode::Div]
        );
        assert_eq!(code.max_stack, 2);
    }

    #[test]
    fn negated_terms_compile_to_subtraction() {
        let code = compile("sin(t) - cos(t)");
        assert!(code.ops.contains(&OpCode::Sub));
        let t: f64 = 0.3;
        assert!((eval_f64(&code, t) - (t.sin() - t.cos())).abs() < 1e-15);
        let code = compile("-exp(t)");
        assert_eq!(code.ops.last(), Some(&OpCode::Neg));
    }

    #[test]
    fn log_scaled_execution_survives_huge_constants() {
        // 10^400 * t^-400 at t = 10 is exactly 1; f64 sees inf * 0.
        let code = compile("10^400 * t^(-400)");
        assert!(eval_f64(&code, 10.0).is_nan());

        let mut stack = Vec::new();
        let value = VM::execute(&code, &[LogReal::from_f64(10.0)], &mut stack).expect("runs");
        assert!((value.to_f64() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unbound_symbols_are_rejected() {
        let expr = parse("s + t").expect("valid expression");
        let err = Compiler::new(&["t".to_string()]).compile(&expr).unwrap_err();
        assert!(matches!(err, InversionError::InvalidTransform(msg) if msg.contains("`s`")));
    }

    #[test]
    fn malformed_bytecode_reports_underflow() {
        let code = Bytecode {
            ops: vec![OpCode::Add],
            constants: Vec::new(),
            max_stack: 0,
        };
        let mut stack: Vec<f64> = Vec::new();
        let err = VM::execute(&code, &[], &mut stack).unwrap_err();
        assert_eq!(err, InversionError::Evaluation("stack underflow".to_string()));
    }
}
