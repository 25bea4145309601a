use crate::error::ToolError;
use crate::observe::Event;
use crate::tool::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::Value;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use super::json_to_bool;

/// Substrings that make the tool refuse a command outright. This is a guard
/// against obvious accidents, not a sandbox.
const REFUSED: &[&str] = &["rm -rf /", "sudo", "shutdown"];

/// Run a command in the foreground, in its own process group, killing the
/// whole group if it outlives `timeout`.
pub(crate) async fn run_foreground(
    command: &str,
    workdir: &Path,
    timeout: Duration,
) -> Result<Value, ToolError> {
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::ProcessSpawn(format!("{}: {}", command, e)))?;

    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let status = output.status;
            let exit_code = status
                .code()
                .or_else(|| status.signal().map(|sig| 128 + sig))
                .unwrap_or(-1);
            Ok(serde_json::json!({
                "stdout": String::from_utf8_lossy(&output.stdout),
                "stderr": String::from_utf8_lossy(&output.stderr),
                "exit_code": exit_code
            }))
        }
        Ok(Err(e)) => Err(ToolError::ExecutionFailed(format!(
            "Failed to execute command: {}",
            e
        ))),
        Err(_) => {
            // The shell itself is killed on drop; this takes its children too.
            if let Some(pid) = pid {
                // SAFETY: signalling the process group created for this child.
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            Err(ToolError::ExecutionFailed(format!(
                "Command timed out after {:?} (process group killed)",
                timeout
            )))
        }
    }
}

/// Shell tool with foreground and background modes.
#[derive(Debug, Default)]
pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace. Foreground commands block until they exit and return stdout, stderr and the exit code. Set background=true for long-running commands: the call returns at once with a job id and a log file, and job status is shown to you on every turn. Use the wait tool to pause while background jobs run."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "background": {
                    "type": "boolean",
                    "description": "Run as a background job (default: false)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
        let command = input
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("command is required".to_string()))?;
        let background = input
            .get("background")
            .and_then(json_to_bool)
            .unwrap_or(false);

        if let Some(pattern) = REFUSED.iter().find(|p| command.contains(*p)) {
            return Err(ToolError::ExecutionFailed(format!(
                "Dangerous command refused (matched '{}')",
                pattern
            )));
        }

        if !background {
            let workdir = ctx.workspace.workdir().to_path_buf();
            return run_foreground(command, &workdir, ctx.settings.shell_timeout).await;
        }

        let (job_id, pid, log_path) = {
            let job = ctx.workspace.jobs.start(command)?;
            (job.id, job.pid, job.log_path.clone())
        };
        let log_file = ctx.workspace.display_path(&log_path).to_string();
        ctx.emit(Event::JobStarted {
            job_id,
            pid,
            command: command.to_string(),
            log_file: log_file.clone(),
        })
        .await;

        Ok(serde_json::json!({
            "job_id": job_id,
            "pid": pid,
            "log_file": log_file,
            "hint": format!("Use read_file on {} to check progress, or wait to pause until it finishes.", log_file)
        }))
    }
}
