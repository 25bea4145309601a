use std::sync::Arc;

use serde_json::Value;

use crate::agent_types::AgentTypes;
use crate::dispatch::ToolRegistry;
use crate::skills::SkillRegistry;

pub mod bash;
pub mod edit_file;
pub mod read_file;
pub mod skill;
pub mod task;
pub mod todo_write;
pub mod wait;
pub mod write_file;

/// Parse a JSON value as bool, with string fallback for models that send bools as strings.
pub fn json_to_bool(v: &Value) -> Option<bool> {
    v.as_bool().or_else(|| match v.as_str()?.trim() {
        "true" | "True" | "1" => Some(true),
        "false" | "False" | "0" => Some(false),
        _ => None,
    })
}

/// Parse a JSON value as a number, accepting numeric strings.
pub fn json_to_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str()?.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

pub use bash::BashTool;
pub use edit_file::EditFileTool;
pub use read_file::ReadFileTool;
pub use skill::SkillTool;
pub use task::TaskTool;
pub use todo_write::TodoWriteTool;
pub use wait::WaitTool;
pub use write_file::WriteFileTool;

/// Registry holding every built-in tool. The Skill and Task descriptions are
/// rendered from `skills` and `agent_types` at construction.
pub fn builtin_registry(skills: &SkillRegistry, agent_types: &AgentTypes) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(BashTool));
    registry.register(Arc::new(ReadFileTool));
    registry.register(Arc::new(WriteFileTool));
    registry.register(Arc::new(EditFileTool));
    registry.register(Arc::new(TodoWriteTool));
    registry.register(Arc::new(WaitTool));
    registry.register(Arc::new(TaskTool::new(agent_types)));
    registry.register(Arc::new(SkillTool::new(skills)));
    registry
}
