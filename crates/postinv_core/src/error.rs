use thiserror::Error;

/// Errors produced while reading a transform from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },

    #[error("unexpected end of input")]
    UnexpectedEnd,
}

/// Errors surfaced by the inverter and by compiled evaluators.
///
/// `InvalidOrder` and `DomainError` describe bad caller input; `InvalidTransform`
/// means the method (or the exact engine) cannot handle the transform at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InversionError {
    #[error("derivative order must be a positive integer, got {0}")]
    InvalidOrder(i64),

    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    #[error("t = {time} is outside the domain: {reason}")]
    DomainError { time: f64, reason: &'static str },

    #[error("evaluation at t = {time} produced a non-finite value ({value})")]
    NumericOverflow { time: f64, value: f64 },

    #[error("failed to parse transform: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("malformed bytecode: {0}")]
    Evaluation(String),
}
