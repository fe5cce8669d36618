mod book;
mod payload;
mod runner;
mod step;

pub use book::Runbook;
pub use payload::{
    DbQuery, ExecCommand, GrpcRequest, HttpRequest, SshCommand, MEDIA_TYPE_FORM, MEDIA_TYPE_JSON,
    MEDIA_TYPE_MULTIPART, MEDIA_TYPE_TEXT,
};
pub use runner::{
    DbRunnerSpec, GrpcRunnerSpec, HttpRunnerSpec, IncludeRunnerSpec, RunnerKind, RunnerSpec,
    SshRunnerSpec,
};
pub use step::{Command, IncludeConfig, RetrySpec, StepDef, DEFAULT_RETRY_COUNT};

pub type AnyValue = serde_json::Value;

/// Root keys of the evaluation environment that steps cannot bind over.
pub const RESERVED_BIND_NAMES: &[&str] = &["vars", "steps"];
