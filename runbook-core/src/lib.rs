#![forbid(unsafe_code)]

pub mod error;
pub mod expressions;
pub mod parser;
pub mod types;

pub use crate::error::{LoadError, ParseError, PayloadError, RunbookError};
pub use crate::expressions::{eval_str, expand_value, is_truthy, EvalEnv, ExprError, FuncRegistry};
pub use crate::parser::{load_runbook, load_runbooks, parse_document_value, parse_runbook_str};
pub use crate::types::{Command, IncludeConfig, Runbook, RunnerKind, RunnerSpec, StepDef};
