use std::time::Duration;

use serde_json::{Map, Value};

pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// One declared step of a runbook.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDef {
    pub index: usize,
    /// Present for map-form runbooks.
    pub key: Option<String>,
    pub desc: Option<String>,
    /// `if:` expression; a falsy result skips the step.
    pub guard: Option<String>,
    pub retry: Option<RetrySpec>,
    pub command: Option<Command>,
    /// `test:` expression evaluated after the command with `current` bound.
    pub test: Option<String>,
    /// `bind:` name to expression.
    pub bind: Option<Map<String, Value>>,
}

impl StepDef {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            key: None,
            desc: None,
            guard: None,
            retry: None,
            command: None,
            test: None,
            bind: None,
        }
    }

    /// Display label: the map key when present, otherwise the index.
    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => self.index.to_string(),
        }
    }

    /// Name of the runner this step's command targets, if any.
    pub fn runner_name(&self) -> Option<&str> {
        match &self.command {
            Some(Command::Runner { name, .. }) => Some(name),
            Some(Command::Exec(_)) => Some("exec"),
            Some(Command::Include(_)) => Some("include"),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrySpec {
    pub count: u32,
    pub interval: Duration,
    pub until: Option<String>,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            count: DEFAULT_RETRY_COUNT,
            interval: Duration::ZERO,
            until: None,
        }
    }
}

/// The command payload of a step. Runner payloads stay unparsed until they
/// are expanded at run time because their keys may be templates.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Runner { name: String, payload: Value },
    Exec(Value),
    Include(IncludeConfig),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IncludeConfig {
    /// Child runbook path relative to the including runbook's root. Never expanded.
    pub path: String,
    pub vars: Map<String, Value>,
    pub skip_test: bool,
    pub force: bool,
}
