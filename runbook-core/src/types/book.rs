use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{Map, Value};

use super::{Command, RunnerSpec, StepDef};

/// A loaded runbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Runbook {
    pub desc: Option<String>,
    /// Book-level `if:`; a falsy result skips the whole run.
    pub guard: Option<String>,
    pub runners: BTreeMap<String, RunnerSpec>,
    pub vars: Map<String, Value>,
    pub steps: Vec<StepDef>,
    /// Directory relative paths inside the runbook resolve against.
    pub root: PathBuf,
    /// Source file, when loaded from disk.
    pub path: Option<PathBuf>,
    /// Steps were declared as a mapping and are addressed by name.
    pub use_map: bool,
    pub debug: bool,
    pub force: bool,
    pub skip_test: bool,
}

impl Runbook {
    pub fn display_name(&self) -> String {
        match (&self.path, &self.desc) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(desc)) => desc.clone(),
            (None, None) => "<inline>".to_string(),
        }
    }

    pub fn step(&self, key: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.key.as_deref() == Some(key))
    }

    /// Files this runbook includes, inline or through include runners,
    /// resolved against its root.
    pub fn included_paths(&self) -> Vec<PathBuf> {
        let inline = self.steps.iter().filter_map(|s| match &s.command {
            Some(Command::Include(cfg)) => Some(cfg.path.as_str()),
            _ => None,
        });
        let named = self.runners.values().filter_map(|r| match r {
            RunnerSpec::Include(spec) => Some(spec.path.as_str()),
            _ => None,
        });
        inline.chain(named).map(|p| self.root.join(p)).collect()
    }
}
