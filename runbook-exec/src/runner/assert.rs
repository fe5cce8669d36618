use runbook_core::StepDef;

use super::RunnerOutput;
use crate::error::RunError;
use crate::expand::eval_cond;
use crate::store::Store;

/// Evaluate a step's `test:` expression with `current` bound.
pub(crate) fn run(store: &Store, step: &StepDef) -> Result<RunnerOutput, RunError> {
    let Some(expr) = &step.test else {
        return Ok(RunnerOutput::default());
    };
    if eval_cond(store, expr)? {
        Ok(RunnerOutput::default())
    } else {
        Err(RunError::Assertion { expr: expr.clone() })
    }
}
