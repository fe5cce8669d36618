use std::process::Stdio;

use runbook_core::types::{SshCommand, SshRunnerSpec};
use tokio::process::Command;

use super::exec::{feed_and_wait, process_result};
use super::RunnerOutput;
use crate::error::{RunError, RunnerError};

const CONNECT_TIMEOUT_SECS: u32 = 5;

/// Runs commands on a remote host through the system `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshRunner {
    name: String,
    spec: SshRunnerSpec,
}

impl SshRunner {
    pub fn new(name: impl Into<String>, spec: SshRunnerSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments handed to `ssh` for `command`.
    pub fn args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(port) = self.spec.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(key) = &self.spec.key {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(self.spec.destination());
        args.push(command.to_string());
        args
    }

    pub async fn run(&self, cmd: &SshCommand) -> Result<RunnerOutput, RunError> {
        tracing::debug!(
            target: "runbook::ssh",
            runner = %self.name,
            host = %self.spec.destination(),
            command = %cmd.command,
            "ssh exec"
        );

        let child = Command::new("ssh")
            .args(self.args(&cmd.command))
            .stdin(if cmd.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::Ssh(format!("spawn ssh: {e}")))?;

        let out = feed_and_wait(child, cmd.stdin.as_deref())
            .await
            .map_err(RunnerError::Ssh)?;

        // 255 is ssh's own failure code: the remote command never ran.
        if out.status.code() == Some(255) {
            return Err(RunnerError::Ssh(format!(
                "{}: {}",
                self.spec.destination(),
                String::from_utf8_lossy(&out.stderr).trim()
            ))
            .into());
        }

        Ok(RunnerOutput {
            result: Some(process_result(out.stdout, out.stderr, out.status.code())),
            ..RunnerOutput::default()
        })
    }
}
