//! Sub-agent flavours: a tool subset and a focused prompt each.

use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct AgentType {
    pub name: String,
    pub description: String,
    pub tools: BTreeSet<String>,
    pub prompt: String,
}

impl AgentType {
    pub fn new(name: &str, description: &str, tools: &[&str], prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            prompt: prompt.to_string(),
        }
    }

    /// System prompt for a sub-agent of this type working in `workdir`.
    pub fn system_prompt(&self, workdir: &Path) -> String {
        format!(
            "You are a {} subagent at {}.\n{}\nComplete the task and return a clear, concise summary.",
            self.name,
            workdir.display(),
            self.prompt
        )
    }

    pub fn allows(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }
}

/// The fixed set of agent types, in declaration order.
#[derive(Debug, Clone)]
pub struct AgentTypes {
    types: Vec<AgentType>,
}

impl AgentTypes {
    pub fn builtin() -> Self {
        Self {
            types: vec![
                AgentType::new(
                    "explore",
                    "Read-only agent for exploring code, finding files, searching",
                    &["bash", "read_file"],
                    "You are an exploration agent. Search and analyze, but never modify files. Return a concise summary.",
                ),
                AgentType::new(
                    "code",
                    "Full agent for implementing features and fixing bugs",
                    &[
                        "bash",
                        "read_file",
                        "write_file",
                        "edit_file",
                        "TodoWrite",
                        "wait",
                        "Skill",
                    ],
                    "You are a coding agent. Implement the requested changes efficiently.",
                ),
                AgentType::new(
                    "plan",
                    "Planning agent for designing implementation strategies",
                    &["bash", "read_file"],
                    "You are a planning agent. Analyze the codebase and output a numbered implementation plan. Do NOT make changes.",
                ),
            ],
        }
    }

    /// Types from an explicit list. Any `Task` entry is dropped so sub-agents
    /// can never nest.
    pub fn from_types(types: Vec<AgentType>) -> Self {
        let types = types
            .into_iter()
            .map(|mut t| {
                t.tools.remove("Task");
                t
            })
            .collect();
        Self { types }
    }

    pub fn get(&self, name: &str) -> Option<&AgentType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentType> {
        self.types.iter()
    }

    pub fn describe(&self) -> String {
        self.types
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for AgentTypes {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_in_order() {
        assert_eq!(AgentTypes::builtin().names(), vec!["explore", "code", "plan"]);
    }

    #[test]
    fn test_explore_is_read_only() {
        let types = AgentTypes::builtin();
        let explore = types.get("explore").unwrap();
        assert!(explore.allows("bash"));
        assert!(explore.allows("read_file"));
        assert!(!explore.allows("write_file"));
        assert!(!explore.allows("edit_file"));
    }

    #[test]
    fn test_no_type_can_spawn_tasks() {
        let types = AgentTypes::builtin();
        assert!(types.iter().all(|t| !t.allows("Task")));

        let custom = AgentTypes::from_types(vec![AgentType::new(
            "nested",
            "tries to nest",
            &["Task", "bash"],
            "p",
        )]);
        assert!(!custom.get("nested").unwrap().allows("Task"));
    }

    #[test]
    fn test_system_prompt_format() {
        let types = AgentTypes::builtin();
        let prompt = types
            .get("plan")
            .unwrap()
            .system_prompt(Path::new("/work"));
        assert!(prompt.starts_with("You are a plan subagent at /work.\n"));
        assert!(prompt.ends_with("\nComplete the task and return a clear, concise summary."));
    }

    #[test]
    fn test_describe() {
        let text = AgentTypes::builtin().describe();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("- explore: "));
        assert!(AgentTypes::builtin().get("missing").is_none());
    }
}
