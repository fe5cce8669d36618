use std::sync::Arc;

use runbook_core::types::IncludeRunnerSpec;
use runbook_core::{load_runbook, Command, PayloadError, StepDef};
use serde_json::{Map, Value};

use super::RunnerOutput;
use crate::error::{ConfigError, RunError};
use crate::expand::{evaluate_schema, expand, expand_before_record};
use crate::operator::Operator;
use crate::store::RootKey;

/// Runs another runbook as a nested operator.
///
/// Declared under `runners:` it carries a path and call parameters, and the
/// step payload becomes the child's `nodes`. The inline form comes from a
/// step's `include:` key.
#[derive(Debug, Clone, Default)]
pub struct IncludeRunner {
    name: Option<String>,
    spec: Option<IncludeRunnerSpec>,
}

struct IncludeCall<'a> {
    path: &'a str,
    params: Option<&'a Map<String, Value>>,
    nodes: Option<Value>,
    vars: Option<&'a Map<String, Value>>,
    skip_test: bool,
}

impl IncludeRunner {
    pub fn new(name: impl Into<String>, spec: IncludeRunnerSpec) -> Self {
        Self {
            name: Some(name.into()),
            spec: Some(spec),
        }
    }

    pub fn inline() -> Self {
        Self::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) async fn run(&self, op: &Operator, step: &StepDef) -> Result<RunnerOutput, RunError> {
        let call = match (&self.spec, &step.command) {
            (_, Some(Command::Include(cfg))) => IncludeCall {
                path: &cfg.path,
                params: None,
                nodes: None,
                vars: Some(&cfg.vars),
                skip_test: cfg.skip_test,
            },
            (Some(spec), Some(Command::Runner { payload, .. })) => IncludeCall {
                path: &spec.path,
                params: Some(&spec.params),
                nodes: Some(expand(op.store(), payload)?),
                vars: None,
                skip_test: false,
            },
            _ => {
                return Err(PayloadError::new("include", "step has no include to run").into());
            }
        };
        run_call(op, call).await
    }
}

async fn run_call(op: &Operator, call: IncludeCall<'_>) -> Result<RunnerOutput, RunError> {
    let store = op.store();
    let funcs = store.funcs();
    let ipath = op.root().join(call.path);
    let env = store.env_before_record();

    let mut snapshot = store.snapshot();
    snapshot.insert(RootKey::Included.as_str().into(), Value::Bool(store.included()));
    if let Some(previous) = store.latest() {
        snapshot.insert(RootKey::Previous.as_str().into(), previous.clone());
    }
    if let Some(nodes) = call.nodes {
        snapshot.insert(RootKey::Nodes.as_str().into(), nodes);
    }

    let mut params = Map::new();
    for (k, v) in call.params.into_iter().flatten() {
        let value = match v {
            Value::String(_) => evaluate_schema(expand_before_record(store, v)?, op.root(), &env, funcs)?,
            Value::Object(_) | Value::Array(_) => expand_before_record(store, v)?,
            other => other.clone(),
        };
        params.insert(k.clone(), value);
    }
    if !params.is_empty() {
        snapshot.insert(RootKey::Params.as_str().into(), Value::Object(params));
    }

    let book = load_runbook(&ipath).map_err(ConfigError::from)?;

    let mut overrides = Map::new();
    for (k, v) in call.vars.into_iter().flatten() {
        let value = match v {
            Value::String(_) => evaluate_schema(expand_before_record(store, v)?, &book.root, &env, funcs)?,
            other => expand_before_record(store, other)?,
        };
        overrides.insert(k.clone(), value);
    }

    tracing::info!(target: "runbook::include", path = %ipath.display(), "entering included runbook");
    let mut child = op
        .child_builder(book)
        .skip_test(op.options().skip_test || call.skip_test)
        .parent(Value::Object(snapshot))
        .vars(overrides)
        .build()
        .await?;
    let result = child.run_nested().await;
    tracing::info!(
        target: "runbook::include",
        path = %ipath.display(),
        succeeded = result.succeeded,
        "leaving included runbook"
    );

    if !result.succeeded {
        let source = result
            .errors
            .first()
            .cloned()
            .unwrap_or_else(|| Arc::new(RunError::Cancelled));
        return Err(RunError::IncludedRun {
            path: call.path.to_string(),
            source,
            result: Box::new(result),
        });
    }

    Ok(RunnerOutput {
        result: Some(child.store().normalized_snapshot()),
        included: Some(Box::new(result)),
        ..RunnerOutput::default()
    })
}
