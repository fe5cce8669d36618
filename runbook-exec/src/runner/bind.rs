use runbook_core::types::RESERVED_BIND_NAMES;
use runbook_core::StepDef;
use serde_json::{Map, Value};

use super::RunnerOutput;
use crate::error::RunError;
use crate::expand::{eval_expr, expand};
use crate::store::Store;

/// Evaluate a step's `bind:` entries. String values are expressions, other
/// values are expanded as templates. Nothing is written to the store here;
/// the operator binds the returned names once the step has succeeded.
pub(crate) fn run(store: &Store, step: &StepDef) -> Result<RunnerOutput, RunError> {
    let Some(entries) = &step.bind else {
        return Ok(RunnerOutput::default());
    };
    if let Some(name) = entries.keys().find(|k| RESERVED_BIND_NAMES.contains(&k.as_str())) {
        return Err(RunError::ReservedName(name.clone()));
    }

    let mut bindings = Map::new();
    for (name, value) in entries {
        let bound = match value {
            Value::String(expr) => eval_expr(store, expr)?,
            other => expand(store, other)?,
        };
        bindings.insert(name.clone(), bound);
    }
    Ok(RunnerOutput {
        bindings,
        ..RunnerOutput::default()
    })
}
