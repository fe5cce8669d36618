use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Event {
    RunStarted {
        run_id: Uuid,
        runbook: String,
        included: bool,
    },
    RunFinished {
        run_id: Uuid,
        succeeded: bool,
        skipped: bool,
    },
    StepStarted {
        run_id: Uuid,
        step: String,
    },
    StepSkipped {
        run_id: Uuid,
        step: String,
    },
    StepSucceeded {
        run_id: Uuid,
        step: String,
    },
    StepFailed {
        run_id: Uuid,
        step: String,
        error: String,
    },
    StepRetryScheduled {
        run_id: Uuid,
        step: String,
        delay_ms: u64,
    },
    AttemptStarted {
        run_id: Uuid,
        step: String,
        attempt_no: u32,
    },
    AttemptFinished {
        run_id: Uuid,
        step: String,
        attempt_no: u32,
        succeeded: bool,
    },
    ValidationWarning {
        run_id: Uuid,
        step: String,
        message: String,
    },
}

impl Event {
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "run.started",
            Event::RunFinished { .. } => "run.finished",
            Event::StepStarted { .. } => "step.started",
            Event::StepSkipped { .. } => "step.skipped",
            Event::StepSucceeded { .. } => "step.succeeded",
            Event::StepFailed { .. } => "step.failed",
            Event::StepRetryScheduled { .. } => "step.retry_scheduled",
            Event::AttemptStarted { .. } => "attempt.started",
            Event::AttemptFinished { .. } => "attempt.finished",
            Event::ValidationWarning { .. } => "validation.warning",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let ty = self.type_name();
        match self {
            Event::RunStarted { run_id, runbook, included } => {
                json!({ "type": ty, "run_id": run_id.to_string(), "runbook": runbook, "included": included })
            }
            Event::RunFinished { run_id, succeeded, skipped } => {
                json!({ "type": ty, "run_id": run_id.to_string(), "succeeded": succeeded, "skipped": skipped })
            }
            Event::StepStarted { run_id, step }
            | Event::StepSkipped { run_id, step }
            | Event::StepSucceeded { run_id, step } => {
                json!({ "type": ty, "run_id": run_id.to_string(), "step": step })
            }
            Event::StepFailed { run_id, step, error } => {
                json!({ "type": ty, "run_id": run_id.to_string(), "step": step, "error": error })
            }
            Event::StepRetryScheduled { run_id, step, delay_ms } => {
                json!({ "type": ty, "run_id": run_id.to_string(), "step": step, "delay_ms": delay_ms })
            }
            Event::AttemptStarted { run_id, step, attempt_no } => {
                json!({ "type": ty, "run_id": run_id.to_string(), "step": step, "attempt_no": attempt_no })
            }
            Event::AttemptFinished { run_id, step, attempt_no, succeeded } => {
                json!({ "type": ty, "run_id": run_id.to_string(), "step": step, "attempt_no": attempt_no, "succeeded": succeeded })
            }
            Event::ValidationWarning { run_id, step, message } => {
                json!({ "type": ty, "run_id": run_id.to_string(), "step": step, "message": message })
            }
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

pub struct CompositeEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl Default for CompositeEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn with(mut self, sink: Box<dyn EventSink>) -> Self {
        self.add(sink);
        self
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn emit(&self, event: Event) {
        for sink in &self.sinks {
            sink.emit(event.clone()).await;
        }
    }
}

/// JSON lines on stdout.
pub struct StdoutEventSink;

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, event: Event) {
        println!("{}", serde_json::to_string(&event.to_json()).unwrap_or_default());
    }
}

/// Forwards events to `tracing` under the `runbook::events` target.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: Event) {
        match &event {
            Event::StepFailed { step, error, .. } => {
                tracing::warn!(target: "runbook::events", step = %step, error = %error, "step failed");
            }
            Event::ValidationWarning { step, message, .. } => {
                tracing::warn!(target: "runbook::events", step = %step, "{message}");
            }
            other => {
                tracing::debug!(target: "runbook::events", event = %other.to_json(), "{}", other.type_name());
            }
        }
    }
}

pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}
}
