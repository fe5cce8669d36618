use std::path::PathBuf;

use thiserror::Error;

use crate::expressions::ExprError;

#[derive(Debug, Error)]
pub enum RunbookError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Expr(#[from] ExprError),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("document root must be a mapping")]
    NotAMapping,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
    #[error("{location}: {message}")]
    Invalid { location: String, message: String },
    #[error("invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
    #[error("no runbooks match '{0}'")]
    NoMatch(String),
}

impl LoadError {
    pub fn invalid(location: impl Into<String>, message: impl Into<String>) -> Self {
        LoadError::Invalid {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// A runner payload that does not have the shape its runner expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {runner} payload: {message}")]
pub struct PayloadError {
    pub runner: &'static str,
    pub message: String,
}

impl PayloadError {
    pub fn new(runner: &'static str, message: impl Into<String>) -> Self {
        Self {
            runner,
            message: message.into(),
        }
    }
}
