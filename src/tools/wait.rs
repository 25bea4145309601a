use crate::error::ToolError;
use crate::tool::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::json_to_f64;

/// Suspends the conversation for a bounded time, then reports job status.
///
/// Nothing else runs in the meantime; background jobs keep going as
/// separate processes and are polled once the sleep ends.
#[derive(Debug, Default)]
pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Pause for the given number of seconds, then report the status of all background jobs. Use it instead of polling with sleep while background jobs run."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "seconds": {
                    "type": "number",
                    "description": "How long to wait"
                }
            },
            "required": ["seconds"]
        })
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
        let seconds = input
            .get("seconds")
            .and_then(json_to_f64)
            .ok_or_else(|| ToolError::InvalidInput("seconds must be a number".to_string()))?;
        if seconds < 0.0 {
            return Err(ToolError::InvalidInput("seconds must not be negative".to_string()));
        }

        let max = ctx.settings.max_wait;
        let requested = Duration::try_from_secs_f64(seconds).unwrap_or(max);
        let waited = requested.min(max);
        debug!(requested = ?requested, waited = ?waited, "waiting");
        tokio::time::sleep(waited).await;

        ctx.workspace.jobs.refresh_all();
        let lines = ctx.workspace.jobs.summarize();

        let mut out = format!("Waited {:.1}s", waited.as_secs_f64());
        if waited < requested {
            out.push_str(&format!(" (capped at {:.1}s)", max.as_secs_f64()));
        }
        out.push('\n');
        if lines.is_empty() {
            out.push_str("No background jobs.");
        } else {
            out.push_str("Background jobs:\n");
            out.push_str(&lines.join("\n"));
        }
        Ok(Value::String(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;
    use crate::dispatch::ToolRegistry;
    use crate::llm::ScriptedLLM;
    use crate::workspace::Workspace;
    use serde_json::json;
    use std::time::Instant;
    use tempfile::TempDir;

    async fn wait(ws: &mut Workspace, settings: &RuntimeSettings, input: Value) -> Result<Value, ToolError> {
        let registry = ToolRegistry::new();
        let llm = ScriptedLLM::new(vec![]);
        let mut ctx = ToolContext::new(ws, &registry, &llm, settings);
        WaitTool.execute(input, &mut ctx).await
    }

    #[tokio::test]
    async fn test_reports_finished_job() {
        let tmp = TempDir::new().unwrap();
        let mut ws = Workspace::bare(tmp.path());
        ws.jobs.start("true").unwrap();
        let out = wait(&mut ws, &RuntimeSettings::default(), json!({"seconds": 0.5}))
            .await
            .unwrap();
        let text = out.as_str().unwrap();
        assert!(text.starts_with("Waited 0.5s\nBackground jobs:\n"), "{}", text);
        assert!(text.contains("completed (exit 0)"), "{}", text);
    }

    #[tokio::test]
    async fn test_clamps_to_max_wait() {
        let tmp = TempDir::new().unwrap();
        let mut ws = Workspace::bare(tmp.path());
        let settings = RuntimeSettings {
            max_wait: Duration::from_millis(100),
            ..RuntimeSettings::default()
        };
        let start = Instant::now();
        let out = wait(&mut ws, &settings, json!({"seconds": "30"})).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        let text = out.as_str().unwrap();
        assert!(text.contains("Waited 0.1s (capped at 0.1s)"), "{}", text);
        assert!(text.ends_with("No background jobs."));
    }

    #[tokio::test]
    async fn test_rejects_negative() {
        let tmp = TempDir::new().unwrap();
        let mut ws = Workspace::bare(tmp.path());
        let err = wait(&mut ws, &RuntimeSettings::default(), json!({"seconds": -1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
