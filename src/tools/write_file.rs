use crate::error::ToolError;
use crate::tool::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use super::json_to_bool;

/// Tool for writing or appending to a file in the workspace.
#[derive(Debug, Default)]
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, creating parent directories if needed. Set append=true to add to the end instead of replacing."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to write, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting (default: false)"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
        let path_arg = input
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("path is required".to_string()))?;
        let content = input
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("content is required".to_string()))?;
        let append = input.get("append").and_then(json_to_bool).unwrap_or(false);

        let path = ctx.workspace.resolve_path(path_arg)?;
        let shown = ctx.workspace.display_path(&path).to_string();
        let failed = |e: std::io::Error| ToolError::ExecutionFailed(format!("Failed to write '{}': {}", shown, e));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(&failed)?;
        }

        if append {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(&failed)?;
            file.write_all(content.as_bytes()).await.map_err(&failed)?;
            file.flush().await.map_err(&failed)?;
        } else {
            tokio::fs::write(&path, content).await.map_err(&failed)?;
        }

        let verb = if append { "Appended to" } else { "Wrote" };
        Ok(Value::String(format!("{} {} ({} bytes)", verb, shown, content.len())))
    }
}
