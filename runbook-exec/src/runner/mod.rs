//! The closed set of runners a step can dispatch to.

mod assert;
mod bind;
mod db;
mod exec;
mod grpc;
pub mod http;
mod include;
mod ssh;

use std::sync::Arc;

use runbook_core::types::{DbQuery, ExecCommand, GrpcRequest, HttpRequest, SshCommand};
use runbook_core::{Command, RunnerKind, StepDef};
use serde_json::{json, Map, Value};

pub use self::db::{split_statements, DbClient, DbRunner, SqlxDbClient, StatementOutcome};
pub use self::exec::{run_exec, DEFAULT_SHELL};
pub use self::grpc::{GrpcClient, GrpcResponse, GrpcRunner};
pub use self::http::HttpRunner;
pub use self::include::IncludeRunner;
pub use self::ssh::SshRunner;

use crate::error::RunError;
use crate::expand::expand;
use crate::operator::{Operator, RunResult};

/// What one runner invocation produced.
#[derive(Debug, Default)]
pub struct RunnerOutput {
    /// Recorded as the step result. `None` for runners without their own result.
    pub result: Option<Value>,
    /// Names to bind into the store once the step succeeds.
    pub bindings: Map<String, Value>,
    /// Non-fatal conditions, such as response bodies validation could not check.
    pub warnings: Vec<Arc<RunError>>,
    pub included: Option<Box<RunResult>>,
}

#[derive(Debug, Clone)]
pub enum Runner {
    Http(Arc<HttpRunner>),
    Db(Arc<DbRunner>),
    Grpc(Arc<GrpcRunner>),
    Ssh(Arc<SshRunner>),
    Exec,
    Bind,
    Include(Arc<IncludeRunner>),
    Assert,
}

impl Runner {
    /// Kind of a named runner. Built-ins have none.
    pub fn kind(&self) -> Option<RunnerKind> {
        match self {
            Runner::Http(_) => Some(RunnerKind::Http),
            Runner::Db(_) => Some(RunnerKind::Db),
            Runner::Grpc(_) => Some(RunnerKind::Grpc),
            Runner::Ssh(_) => Some(RunnerKind::Ssh),
            Runner::Include(_) => Some(RunnerKind::Include),
            Runner::Exec | Runner::Bind | Runner::Assert => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Runner::Http(_) => "http",
            Runner::Db(_) => "db",
            Runner::Grpc(_) => "grpc",
            Runner::Ssh(_) => "ssh",
            Runner::Exec => "exec",
            Runner::Bind => "bind",
            Runner::Include(_) => "include",
            Runner::Assert => "assert",
        }
    }

    /// Run this runner for `step`. Payloads are expanded against the
    /// operator's store first; nothing is recorded here.
    pub(crate) async fn execute(&self, op: &Operator, step: &StepDef) -> Result<RunnerOutput, RunError> {
        match self {
            Runner::Http(r) => {
                let payload = expand(op.store(), command_payload(step))?;
                let req = HttpRequest::from_payload(&payload)?;
                let trace = op
                    .options()
                    .trace
                    .then(|| json!({"id": op.id().to_string(), "step": step.label()}).to_string());
                r.run(&req, op.root(), op.options().debug, trace).await
            }
            Runner::Db(r) => {
                let payload = expand(op.store(), command_payload(step))?;
                r.run(&DbQuery::from_payload(&payload)?).await
            }
            Runner::Grpc(r) => {
                let payload = expand(op.store(), command_payload(step))?;
                r.run(&GrpcRequest::from_payload(&payload)?).await
            }
            Runner::Ssh(r) => {
                let payload = expand(op.store(), command_payload(step))?;
                r.run(&SshCommand::from_payload(&payload)?).await
            }
            Runner::Exec => {
                let payload = expand(op.store(), command_payload(step))?;
                run_exec(&ExecCommand::from_payload(&payload)?).await
            }
            Runner::Bind => bind::run(op.store(), step),
            Runner::Include(r) => r.run(op, step).await,
            Runner::Assert => assert::run(op.store(), step),
        }
    }
}

fn command_payload(step: &StepDef) -> &Value {
    static EMPTY: Value = Value::Null;
    match &step.command {
        Some(Command::Runner { payload, .. }) | Some(Command::Exec(payload)) => payload,
        _ => &EMPTY,
    }
}
