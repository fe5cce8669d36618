use std::io::ErrorKind;
use std::process::{Output, Stdio};

use runbook_core::types::ExecCommand;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use super::RunnerOutput;
use crate::error::{RunError, RunnerError};

pub const DEFAULT_SHELL: &str = "bash";

/// Run `cmd.command` through `<shell> -c`. Background commands are detached
/// and record an empty result.
pub async fn run_exec(cmd: &ExecCommand) -> Result<RunnerOutput, RunError> {
    let shell = cmd.shell.as_deref().unwrap_or(DEFAULT_SHELL);
    let mut command = Command::new(shell);
    command.arg("-c").arg(&cmd.command);

    if cmd.background {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
            .spawn()
            .map_err(|e| RunnerError::Exec(format!("spawn {shell}: {e}")))?;
        tracing::debug!(target: "runbook::exec", command = %cmd.command, "started in background");
        return Ok(RunnerOutput {
            result: Some(Value::Object(Default::default())),
            ..RunnerOutput::default()
        });
    }

    command
        .stdin(if cmd.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| RunnerError::Exec(format!("spawn {shell}: {e}")))?;

    let out = feed_and_wait(child, cmd.stdin.as_deref())
        .await
        .map_err(RunnerError::Exec)?;

    Ok(RunnerOutput {
        result: Some(process_result(out.stdout, out.stderr, out.status.code())),
        ..RunnerOutput::default()
    })
}

/// Write `input` to the child's stdin while its output pipes drain.
/// A child that exits without reading all of its input is not an error.
pub(crate) async fn feed_and_wait(mut child: Child, input: Option<&str>) -> Result<Output, String> {
    let stdin = child.stdin.take();
    let write = async move {
        let (Some(mut stdin), Some(input)) = (stdin, input) else {
            return Ok(());
        };
        match stdin.write_all(input.as_bytes()).await {
            Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        }
    };
    let (written, out) = tokio::join!(write, child.wait_with_output());
    let out = out.map_err(|e| format!("wait: {e}"))?;
    written.map_err(|e| format!("write stdin: {e}"))?;
    Ok(out)
}

/// `{stdout, stderr, exit_code}`; a signal-terminated process reports -1.
pub(crate) fn process_result(stdout: Vec<u8>, stderr: Vec<u8>, code: Option<i32>) -> Value {
    json!({
        "stdout": String::from_utf8_lossy(&stdout),
        "stderr": String::from_utf8_lossy(&stderr),
        "exit_code": code.unwrap_or(-1),
    })
}
