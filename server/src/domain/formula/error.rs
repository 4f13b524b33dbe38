//! Formula errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("formula: unsupported token at '{0}'")]
    UnsupportedToken(String),

    #[error("formula: unexpected end of input")]
    UnexpectedEnd,

    #[error("formula: unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("formula: missing ')'")]
    MissingClosingParen,

    #[error("formula: trailing tokens starting at '{0}'")]
    TrailingTokens(String),

    #[error("formula: argument of {function}() must be a field reference")]
    InvalidFunctionArgument { function: String },

    #[error("formula for {metric}: unsupported function {function}()")]
    UnsupportedFunction { metric: String, function: String },

    #[error("metric {field} used in formula {metric} not found")]
    UnknownField { metric: String, field: String },
}
