use std::sync::Arc;

use runbook_core::StepDef;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::RunError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub status: StepStatus,
    /// Runner invocations, retries included. Zero for skipped steps.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_error")]
    pub error: Option<Arc<RunError>>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "serialize_errors")]
    pub warnings: Vec<Arc<RunError>>,
    /// The nested run of an include step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included: Option<Box<RunResult>>,
}

impl StepResult {
    pub(crate) fn pending(step: &StepDef) -> Self {
        Self {
            index: step.index,
            key: step.key.clone(),
            desc: step.desc.clone(),
            status: StepStatus::Succeeded,
            attempts: 0,
            error: None,
            warnings: Vec::new(),
            included: None,
        }
    }

    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => self.index.to_string(),
        }
    }
}

/// Outcome of one operator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// The book-level guard was falsy; no step ran.
    pub skipped: bool,
    pub succeeded: bool,
    pub steps: Vec<StepResult>,
    /// Unrecovered errors in the order they happened. Only `force` runs collect more than one.
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<Arc<RunError>>,
    #[serde(serialize_with = "serialize_errors")]
    pub warnings: Vec<Arc<RunError>>,
}

impl RunResult {
    pub(crate) fn new(id: Uuid, path: Option<String>, desc: Option<String>) -> Self {
        Self {
            id,
            path,
            desc,
            skipped: false,
            succeeded: false,
            steps: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// The first unrecovered error.
    pub fn error(&self) -> Option<&RunError> {
        self.errors.first().map(|e| e.as_ref())
    }

    pub fn step(&self, label: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.label() == label)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

fn serialize_error<S: Serializer>(err: &Option<Arc<RunError>>, s: S) -> Result<S::Ok, S::Error> {
    match err {
        Some(e) => s.serialize_str(&e.to_string()),
        None => s.serialize_none(),
    }
}

fn serialize_errors<S: Serializer>(errs: &[Arc<RunError>], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errs.iter().map(|e| e.to_string()))
}
