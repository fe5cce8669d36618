mod eval;
mod funcs;
mod lexer;
mod parser;
mod template;

pub use eval::{evaluate, is_truthy, render, EvalEnv};
pub use funcs::{FuncRegistry, UserFn, BUILTINS};
pub use parser::{parse_expr, BinaryOp, Expr, UnaryOp};
pub use template::{expand_value, parse_template, Segment, Template};

use serde_json::Value;

/// Parse and evaluate a bare expression (guards, `test`, `bind` values).
pub fn eval_str(input: &str, env: &EvalEnv<'_>) -> Result<Value, ExprError> {
    let expr = parse_expr(input)?;
    evaluate(&expr, env)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number literal: {0}")]
    InvalidNumber(String),
    #[error("unexpected token '{found}' (expected {expected})")]
    UnexpectedToken { found: String, expected: &'static str },
    #[error("unexpected end of expression (expected {0})")]
    UnexpectedEnd(&'static str),
    #[error("empty expression")]
    Empty,
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("{path}: no such key '{key}'")]
    MissingKey { path: String, key: String },
    #[error("{path}: index {index} out of range (len {len})")]
    IndexOutOfRange { path: String, index: i64, len: usize },
    #[error("{path}: cannot index into {kind}")]
    NotIndexable { path: String, kind: &'static str },
    #[error("type error: {0}")]
    Type(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("{name}(): {message}")]
    Function { name: String, message: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("unclosed template marker (missing '}}}}')")]
    UnclosedTemplate,
}

impl ExprError {
    /// Lookup failures that `??` and `?.` turn into a fallback instead of an error.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            ExprError::UndefinedVariable(_)
                | ExprError::MissingKey { .. }
                | ExprError::IndexOutOfRange { .. }
        )
    }
}
