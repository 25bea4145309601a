use crate::error::ToolError;
use crate::tool::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::Value;

/// Replaces the shared task list in one call.
#[derive(Debug, Default)]
pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "TodoWrite"
    }

    fn description(&self) -> &str {
        "Update the task list. Send the complete list every time; it replaces the previous one. Use it to plan multi-step work and track progress. At most one item may be in_progress."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "description": "The complete task list",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {
                                "type": "string",
                                "description": "What needs to be done"
                            },
                            "activeForm": {
                                "type": "string",
                                "description": "Present-tense label shown while the item is in progress"
                            },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"]
                            }
                        },
                        "required": ["content", "activeForm", "status"]
                    }
                }
            },
            "required": ["items"]
        })
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
        let items = input
            .get("items")
            .ok_or_else(|| ToolError::InvalidInput("items is required".to_string()))?;
        ctx.workspace.todos.replace_from_json(items)?;
        Ok(Value::String(ctx.workspace.todos.render()))
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
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replaces_and_renders() {
        let tmp = TempDir::new().unwrap();
        let mut ws = Workspace::bare(tmp.path());
        let registry = ToolRegistry::new();
        let llm = ScriptedLLM::new(vec![]);
        let settings = RuntimeSettings::default();
        let mut ctx = ToolContext::new(&mut ws, &registry, &llm, &settings);

        let out = TodoWriteTool
            .execute(
                json!({"items": [
                    {"content": "Write parser", "activeForm": "Writing parser", "status": "completed"},
                    {"content": "Add tests", "activeForm": "Adding tests", "status": "in_progress"}
                ]}),
                &mut ctx,
            )
            .await
            .unwrap();
        assert_eq!(out, json!("[x] Write parser\n[>] Add tests\n(1/2 done)"));

        let err = TodoWriteTool
            .execute(
                json!({"items": [
                    {"content": "a", "activeForm": "A", "status": "in_progress"},
                    {"content": "b", "activeForm": "B", "status": "in_progress"}
                ]}),
                &mut ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
        assert_eq!(ctx.workspace.todos.items().len(), 2);
        assert_eq!(ctx.workspace.todos.active(), Some("Adding tests"));
    }
}
