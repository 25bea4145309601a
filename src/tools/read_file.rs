use async_trait::async_trait;
use crate::error::ToolError;
use crate::tool::{Tool, ToolContext};
use serde_json::Value;

use super::json_to_f64;

/// Tool for reading file contents from the workspace.
#[derive(Debug, Default)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace. Use it to inspect background job logs as well."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to read, relative to the workspace"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
        let path_arg = input
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("path is required".to_string()))?;
        let limit = input
            .get("limit")
            .and_then(json_to_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n as usize);

        let path = ctx.workspace.resolve_path(path_arg)?;
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::ExecutionFailed(format!(
                "Failed to read file '{}': {}",
                ctx.workspace.display_path(&path),
                e
            ))
        })?;

        let Some(limit) = limit else {
            return Ok(Value::String(contents));
        };
        let total = contents.lines().count();
        if total <= limit {
            return Ok(Value::String(contents));
        }
        let mut shown = contents.lines().take(limit).collect::<Vec<_>>().join("\n");
        shown.push_str(&format!("\n... ({} more lines)", total - limit));
        Ok(Value::String(shown))
    }
}
