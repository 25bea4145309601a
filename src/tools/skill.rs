use crate::error::ToolError;
use crate::skills::SkillRegistry;
use crate::tool::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::Value;

/// Loads a skill body into the conversation on demand.
#[derive(Debug)]
pub struct SkillTool {
    description: String,
}

impl SkillTool {
    pub fn new(skills: &SkillRegistry) -> Self {
        SkillTool {
            description: format!(
                "Load a skill to gain specialized knowledge for a task.\n\n\
                 Available skills:\n{}\n\n\
                 When to use:\n\
                 - IMMEDIATELY when the user task matches a skill description\n\
                 - Before attempting domain-specific work",
                skills.describe_all()
            ),
        }
    }
}

/// Wrap a loaded skill body for injection as a tool result.
pub fn wrap_skill(name: &str, content: &str) -> String {
    format!(
        "<skill-loaded name=\"{}\">\n{}\n</skill-loaded>\n\nFollow the instructions in the skill above to complete the user's task.",
        name, content
    )
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        "Skill"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "skill": {
                    "type": "string",
                    "description": "Name of the skill to load"
                }
            },
            "required": ["skill"]
        })
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
        let name = input
            .get("skill")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .ok_or_else(|| ToolError::InvalidInput("skill is required".to_string()))?;
        let content = ctx.workspace.skills.get_content(name)?;
        Ok(Value::String(wrap_skill(name, content)))
    }
}
