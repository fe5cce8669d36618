//! Sequential execution of one runbook.

mod builder;
mod result;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use runbook_core::{Command, Runbook, StepDef};
use serde_json::{json, Value};
use uuid::Uuid;

pub use self::builder::{OperatorBuilder, RESERVED_RUNNER_NAMES};
pub use self::result::{RunResult, StepResult, StepStatus};

use crate::cancel::Cancellation;
use crate::error::{ConfigError, RunError};
use crate::events::{Event, EventSink};
use crate::expand::eval_cond;
use crate::retry::{decide_retry, AttemptOutcome, RetryDecision, RetryPolicy, RetryReason};
use crate::runner::{Runner, RunnerOutput};
use crate::store::Store;

/// Called with the run result before the first step and after the last.
/// Only the outermost operator runs hooks.
pub type HookFn = Arc<dyn Fn(&RunResult) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct OperatorOptions {
    /// Dump HTTP exchanges and step results through `tracing`.
    pub debug: bool,
    /// Tag HTTP requests with a trace header naming the run and step.
    pub trace: bool,
    /// Keep going after a failed step. The run still fails.
    pub force: bool,
    pub skip_test: bool,
    pub included: bool,
}

pub struct Operator {
    id: Uuid,
    book: Arc<Runbook>,
    store: Store,
    runners: BTreeMap<String, Runner>,
    inline_include: Runner,
    opts: OperatorOptions,
    before: Vec<HookFn>,
    after: Vec<HookFn>,
    events: Arc<dyn EventSink>,
    cancel: Cancellation,
}

impl Operator {
    pub fn builder(book: Runbook) -> OperatorBuilder {
        OperatorBuilder::new(book)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn book(&self) -> &Runbook {
        &self.book
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn root(&self) -> &Path {
        &self.book.root
    }

    pub fn options(&self) -> &OperatorOptions {
        &self.opts
    }

    pub fn runners(&self) -> &BTreeMap<String, Runner> {
        &self.runners
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Builder for an included runbook: protocol runners, functions, the kv
    /// map, events and cancellation are shared; hooks are not. Include
    /// runners stay behind since their paths are relative to this book.
    pub(crate) fn child_builder(&self, book: Runbook) -> OperatorBuilder {
        let protocol_runners = self
            .runners
            .iter()
            .filter(|(_, r)| !matches!(r, Runner::Include(_)))
            .map(|(name, r)| (name.clone(), r.clone()))
            .collect();
        OperatorBuilder::new(book)
            .reuse_runners(protocol_runners)
            .funcs(self.store.funcs().clone())
            .kv(self.store.kv().clone())
            .debug(self.opts.debug)
            .trace(self.opts.trace)
            .force(self.opts.force)
            .included(true)
            .events(Arc::clone(&self.events))
            .cancellation(self.cancel.clone())
    }

    pub(crate) fn run_nested(&mut self) -> Pin<Box<dyn Future<Output = RunResult> + Send + '_>> {
        Box::pin(self.run())
    }

    /// Run every step in order. Never panics on step failure; inspect the result.
    pub async fn run(&mut self) -> RunResult {
        let mut result = RunResult::new(
            self.id,
            self.book.path.as_ref().map(|p| p.display().to_string()),
            self.book.desc.clone(),
        );
        let name = self.book.display_name();
        self.emit(Event::RunStarted {
            run_id: self.id,
            runbook: name.clone(),
            included: self.opts.included,
        })
        .await;
        tracing::info!(target: "runbook::operator", runbook = %name, included = self.opts.included, "run started");

        if let Some(guard) = &self.book.guard {
            match eval_cond(&self.store, guard) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(target: "runbook::operator", runbook = %name, "run skipped by guard");
                    result.skipped = true;
                    return self.finish(result).await;
                }
                Err(e) => {
                    result.errors.push(Arc::new(e));
                    return self.finish(result).await;
                }
            }
        }

        if !self.opts.included {
            for hook in &self.before {
                if let Err(message) = hook(&result) {
                    result.errors.push(Arc::new(RunError::Hook(message)));
                    return self.finish(result).await;
                }
            }
        }

        let book = Arc::clone(&self.book);
        for step in &book.steps {
            let step_result = self.run_step(step).await;
            let failed = step_result.status == StepStatus::Failed;
            if let Some(err) = &step_result.error {
                result.errors.push(Arc::clone(err));
            }
            result.warnings.extend(step_result.warnings.iter().cloned());
            result.steps.push(step_result);
            if failed && !self.opts.force && !forced(step) {
                tracing::warn!(target: "runbook::operator", runbook = %name, step = %step.label(), "run halted");
                break;
            }
        }

        if !self.opts.included {
            result.succeeded = result.errors.is_empty();
            for hook in &self.after {
                if let Err(message) = hook(&result) {
                    result.errors.push(Arc::new(RunError::Hook(message)));
                }
            }
        }

        self.finish(result).await
    }

    async fn finish(&self, mut result: RunResult) -> RunResult {
        result.succeeded = result.errors.is_empty();
        self.emit(Event::RunFinished {
            run_id: self.id,
            succeeded: result.succeeded,
            skipped: result.skipped,
        })
        .await;
        tracing::info!(
            target: "runbook::operator",
            runbook = %self.book.display_name(),
            succeeded = result.succeeded,
            skipped = result.skipped,
            "run finished"
        );
        result
    }

    async fn run_step(&mut self, step: &StepDef) -> StepResult {
        let label = step.label();
        let mut sr = StepResult::pending(step);
        self.emit(Event::StepStarted {
            run_id: self.id,
            step: label.clone(),
        })
        .await;
        tracing::debug!(target: "runbook::operator", step = %label, "step started");

        if self.cancel.is_cancelled() {
            return self.fail_step(step, sr, RunError::Cancelled).await;
        }

        if let Some(guard) = &step.guard {
            match eval_cond(&self.store, guard) {
                Ok(true) => {}
                Ok(false) => {
                    self.store.record(step.key.clone(), Value::Null);
                    sr.status = StepStatus::Skipped;
                    self.emit(Event::StepSkipped {
                        run_id: self.id,
                        step: label.clone(),
                    })
                    .await;
                    tracing::debug!(target: "runbook::operator", step = %label, "step skipped");
                    return sr;
                }
                Err(e) => return self.fail_step(step, sr, e).await,
            }
        }

        let runner = match self.resolve_runner(step) {
            Ok(r) => r,
            Err(e) => return self.fail_step(step, sr, e).await,
        };

        let failure = match self.attempt_loop(step, runner.as_ref(), &mut sr).await {
            Some(e) => Some(e),
            None => self.post_actions(step).await.err(),
        };

        for warning in &sr.warnings {
            self.emit(Event::ValidationWarning {
                run_id: self.id,
                step: label.clone(),
                message: warning.to_string(),
            })
            .await;
        }

        match failure {
            Some(e) => self.fail_step(step, sr, e).await,
            None => {
                let value = self.store.take_current().unwrap_or(Value::Null);
                if self.opts.debug {
                    tracing::debug!(target: "runbook::operator", step = %label, result = %value, "step result");
                }
                self.store.record(step.key.clone(), value);
                self.emit(Event::StepSucceeded {
                    run_id: self.id,
                    step: label,
                })
                .await;
                sr
            }
        }
    }

    /// Invoke the runner until the retry policy stops. Returns the error that
    /// failed the step, if any; a successful attempt leaves its result as `current`.
    async fn attempt_loop(&mut self, step: &StepDef, runner: Option<&Runner>, sr: &mut StepResult) -> Option<RunError> {
        let label = step.label();
        let policy = step
            .retry
            .as_ref()
            .map(RetryPolicy::from)
            .unwrap_or_else(RetryPolicy::once);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            sr.attempts = attempt;
            self.store.take_current();
            self.emit(Event::AttemptStarted {
                run_id: self.id,
                step: label.clone(),
                attempt_no: attempt,
            })
            .await;
            tracing::debug!(
                target: "runbook::operator",
                step = %label,
                attempt,
                runner = runner.map(Runner::tag).unwrap_or("none"),
                "attempt started"
            );

            let res = match runner {
                Some(r) => self
                    .cancel
                    .guard(r.execute(self, step))
                    .await
                    .unwrap_or(Err(RunError::Cancelled)),
                None => Ok(RunnerOutput {
                    result: Some(json!({})),
                    ..RunnerOutput::default()
                }),
            };

            let (outcome, last_err) = match res {
                Ok(out) => {
                    sr.warnings.extend(out.warnings);
                    if out.included.is_some() {
                        sr.included = out.included;
                    }
                    self.store.set_current(out.result.unwrap_or_else(|| json!({})));
                    match &policy.until {
                        None => (AttemptOutcome::Satisfied, None),
                        Some(expr) => match eval_cond(&self.store, expr) {
                            Ok(true) => (AttemptOutcome::Satisfied, None),
                            Ok(false) => (AttemptOutcome::Unsatisfied, None),
                            Err(e) => (AttemptOutcome::Fatal, Some(e)),
                        },
                    }
                }
                Err(e) => {
                    if let RunError::IncludedRun { result, .. } = &e {
                        sr.included = Some(result.clone());
                    }
                    let outcome = if step.retry.is_some() && e.is_retryable() {
                        AttemptOutcome::Failed
                    } else {
                        AttemptOutcome::Fatal
                    };
                    (outcome, Some(e))
                }
            };

            self.emit(Event::AttemptFinished {
                run_id: self.id,
                step: label.clone(),
                attempt_no: attempt,
                succeeded: outcome == AttemptOutcome::Satisfied,
            })
            .await;

            match decide_retry(&policy, attempt, outcome) {
                RetryDecision::Stop {
                    reason: RetryReason::Satisfied,
                } => return None,
                RetryDecision::Stop {
                    reason: RetryReason::AttemptsExhausted,
                } if step.retry.is_some() => {
                    return Some(RunError::RetryExhausted {
                        attempts: attempt,
                        last: last_err.map(Box::new),
                    })
                }
                RetryDecision::Stop { .. } => {
                    return Some(last_err.unwrap_or(RunError::RetryExhausted {
                        attempts: attempt,
                        last: None,
                    }))
                }
                RetryDecision::RetryAfter { delay, reason } => {
                    tracing::debug!(
                        target: "runbook::operator",
                        step = %label,
                        attempt,
                        ?reason,
                        delay_ms = delay.as_millis() as u64,
                        "retrying step"
                    );
                    self.emit(Event::StepRetryScheduled {
                        run_id: self.id,
                        step: label.clone(),
                        delay_ms: delay.as_millis() as u64,
                    })
                    .await;
                    if !self.cancel.sleep(delay).await {
                        return Some(RunError::Cancelled);
                    }
                }
            }
        }
    }

    /// `test:` then `bind:`, both with `current` bound to the step result.
    async fn post_actions(&mut self, step: &StepDef) -> Result<(), RunError> {
        if step.test.is_some() && !self.opts.skip_test {
            Runner::Assert.execute(self, step).await?;
        }
        if step.bind.is_some() {
            let out = Runner::Bind.execute(self, step).await?;
            self.store.bind_all(out.bindings)?;
        }
        Ok(())
    }

    async fn fail_step(&mut self, step: &StepDef, mut sr: StepResult, err: RunError) -> StepResult {
        let label = step.label();
        let value = self.store.take_current().unwrap_or(Value::Null);
        self.store.record(step.key.clone(), value);

        let err = Arc::new(err.at_step(label.clone()));
        tracing::warn!(target: "runbook::operator", step = %label, error = %err, "step failed");
        self.emit(Event::StepFailed {
            run_id: self.id,
            step: label,
            error: err.to_string(),
        })
        .await;
        sr.status = StepStatus::Failed;
        sr.error = Some(err);
        sr
    }

    fn resolve_runner(&self, step: &StepDef) -> Result<Option<Runner>, RunError> {
        match &step.command {
            None => Ok(None),
            Some(Command::Exec(_)) => Ok(Some(Runner::Exec)),
            Some(Command::Include(_)) => Ok(Some(self.inline_include.clone())),
            Some(Command::Runner { name, .. }) => self.runners.get(name).cloned().map(Some).ok_or_else(|| {
                RunError::Config(ConfigError::UnknownRunner {
                    step: step.label(),
                    name: name.clone(),
                })
            }),
        }
    }

    async fn emit(&self, event: Event) {
        self.events.emit(event).await;
    }
}

/// An include step configured with `force` never halts its parent.
fn forced(step: &StepDef) -> bool {
    matches!(&step.command, Some(Command::Include(cfg)) if cfg.force)
}
