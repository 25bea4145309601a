use crate::agent_types::AgentTypes;
use crate::error::ToolError;
use crate::subagent::run_subagent;
use crate::tool::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::Value;

/// Delegates a focused subtask to a sub-agent and returns its summary.
///
/// The description is rendered once from the agent types known at startup.
/// `agent_type` carries no schema enum: an unknown name has to reach
/// `run_subagent` so it fails as an unknown agent type.
#[derive(Debug)]
pub struct TaskTool {
    description: String,
    agent_types: Vec<String>,
}

impl TaskTool {
    pub fn new(agent_types: &AgentTypes) -> Self {
        TaskTool {
            description: format!(
                "Spawn a subagent for a focused subtask. The subagent starts with a fresh history, \
                 works in the same workspace and returns a summary when done.\n\nAgent types:\n{}",
                agent_types.describe()
            ),
            agent_types: agent_types.names().into_iter().map(String::from).collect(),
        }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "Task"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short task description (3-5 words)"
                },
                "prompt": {
                    "type": "string",
                    "description": "Detailed instructions for the subagent"
                },
                "agent_type": {
                    "type": "string",
                    "description": format!("Agent type, one of: {}", self.agent_types.join(", "))
                }
            },
            "required": ["description", "prompt", "agent_type"]
        })
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
        let field = |name: &str| {
            input
                .get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidInput(format!("{} is required", name)))
        };
        let description = field("description")?;
        let prompt = field("prompt")?;
        let agent_type = field("agent_type")?;

        let summary = run_subagent(description, prompt, agent_type, ctx).await?;
        Ok(Value::String(summary))
    }
}
