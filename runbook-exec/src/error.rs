use std::sync::Arc;

use runbook_core::{ExprError, LoadError, PayloadError, RunnerKind};

use crate::openapi::ValidationError;
use crate::operator::RunResult;
use crate::runner::http::HttpError;

/// Problems detected while constructing operators and runners. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("step {step}: no runner named '{name}'")]
    UnknownRunner { step: String, name: String },
    #[error("runner '{name}' is declared as both {existing} and {new}")]
    DuplicateRunner {
        name: String,
        existing: RunnerKind,
        new: RunnerKind,
    },
    #[error("runner name '{0}' is reserved")]
    ReservedRunnerName(String),
    #[error("runner '{name}': unsupported scheme in '{dsn}'")]
    UnsupportedScheme { name: String, dsn: String },
    #[error("runner '{name}': invalid endpoint: {message}")]
    InvalidEndpoint { name: String, message: String },
    #[error("runner '{name}': tls: {message}")]
    Tls { name: String, message: String },
    #[error("runner '{name}': {message}")]
    Client { name: String, message: String },
    #[error("runner '{0}': grpc runners need an injected client")]
    MissingGrpcClient(String),
    #[error("runner '{name}': openapi3: {message}")]
    OpenApi { name: String, message: String },
    #[error("var '{name}': {message}")]
    InvalidVar { name: String, message: String },
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Failures raised by protocol runners while talking to their backends.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("db: {0}")]
    Db(String),
    #[error("grpc: {0}")]
    Grpc(String),
    #[error("ssh: {0}")]
    Ssh(String),
    #[error("exec: {0}")]
    Exec(String),
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Expansion,
    Payload,
    Runner,
    Validation,
    /// A body in a format the validator cannot check. Reported as a warning.
    UnsupportedValidation,
    IncludedRun,
    Cancelled,
    Hook,
    ReservedName,
    Assertion,
    RetryExhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("expansion failed: {0}")]
    Expansion(#[from] ExprError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("included run {path} failed: {source}")]
    IncludedRun {
        path: String,
        #[source]
        source: Arc<RunError>,
        result: Box<RunResult>,
    },
    #[error("step {location}: {source}")]
    Step {
        location: String,
        #[source]
        source: Box<RunError>,
    },
    #[error("cancelled")]
    Cancelled,
    #[error("hook failed: {0}")]
    Hook(String),
    #[error("'{0}' is reserved")]
    ReservedName(String),
    #[error("test failed: {expr}")]
    Assertion { expr: String },
    #[error("retry exhausted after {attempts} attempts")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Option<Box<RunError>>,
    },
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Config(_) => ErrorKind::Config,
            RunError::Expansion(_) => ErrorKind::Expansion,
            RunError::Payload(_) => ErrorKind::Payload,
            RunError::Runner(_) => ErrorKind::Runner,
            RunError::Validation(e) if e.is_unsupported() => ErrorKind::UnsupportedValidation,
            RunError::Validation(_) => ErrorKind::Validation,
            RunError::IncludedRun { .. } => ErrorKind::IncludedRun,
            RunError::Step { source, .. } => source.kind(),
            RunError::Cancelled => ErrorKind::Cancelled,
            RunError::Hook(_) => ErrorKind::Hook,
            RunError::ReservedName(_) => ErrorKind::ReservedName,
            RunError::Assertion { .. } => ErrorKind::Assertion,
            RunError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
        }
    }

    /// Whether `kind` appears anywhere in the causal chain, across include depths.
    pub fn contains(&self, kind: ErrorKind) -> bool {
        if self.kind() == kind {
            return true;
        }
        match self {
            RunError::Step { source, .. } => source.contains(kind),
            RunError::IncludedRun { source, .. } => source.contains(kind),
            RunError::RetryExhausted { last: Some(last), .. } => last.contains(kind),
            _ => false,
        }
    }

    pub fn is_included_run(&self) -> bool {
        self.contains(ErrorKind::IncludedRun)
    }

    pub fn is_unsupported_validation(&self) -> bool {
        self.contains(ErrorKind::UnsupportedValidation)
    }

    /// Runner-side failures a retry directive may absorb.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Runner | ErrorKind::Validation | ErrorKind::IncludedRun
        )
    }

    pub(crate) fn at_step(self, location: impl Into<String>) -> Self {
        match self {
            already @ RunError::Step { .. } => already,
            other => RunError::Step {
                location: location.into(),
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_walks_through_step_and_retry_wrappers() {
        let err = RunError::Step {
            location: "0".into(),
            source: Box::new(RunError::RetryExhausted {
                attempts: 3,
                last: Some(Box::new(RunError::Runner(RunnerError::Db("boom".into())))),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        assert!(err.contains(ErrorKind::Runner));
        assert!(!err.contains(ErrorKind::IncludedRun));
    }

    #[test]
    fn unsupported_formats_have_their_own_kind() {
        let unsupported = RunError::Validation(ValidationError::Unsupported {
            method: "GET".into(),
            url: "/avatar".into(),
            status: 200,
            content_type: "image/png".into(),
        });
        assert_eq!(unsupported.kind(), ErrorKind::UnsupportedValidation);
        assert!(unsupported.is_unsupported_validation());

        let invalid = RunError::Validation(ValidationError::NoRoute {
            method: "GET".into(),
            url: "/nope".into(),
        });
        assert_eq!(invalid.kind(), ErrorKind::Validation);
        assert!(!invalid.is_unsupported_validation());
    }

    #[test]
    fn at_step_does_not_double_wrap() {
        let err = RunError::Cancelled.at_step("a").at_step("b");
        match err {
            RunError::Step { location, source } => {
                assert_eq!(location, "a");
                assert!(matches!(*source, RunError::Cancelled));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
