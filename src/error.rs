use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LLMError;

/// Errors surfaced at the tool-dispatch boundary.
///
/// Every variant is turned into a tool-result message for the model; none of
/// them ends the conversation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown agent type '{0}'")]
    UnknownAgentType(String),

    #[error("Unknown skill '{name}'. Available: {available}")]
    SkillNotFound { name: String, available: String },

    #[error("Failed to start process: {0}")]
    ProcessSpawn(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Rendered verbatim; the message already says what went wrong.
    #[error("{0}")]
    SubagentFailed(String),
}

/// Errors that abort a conversation turn.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Backend error: {0}")]
    Backend(#[from] LLMError),

    #[error("Max iterations exceeded: {0}")]
    MaxIterationsExceeded(usize),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to create log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

impl From<JobError> for ToolError {
    fn from(e: JobError) -> Self {
        ToolError::ProcessSpawn(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TodoError {
    #[error("items must be an array")]
    NotAnArray,

    #[error("Item {index}: must be an object")]
    NotAnObject { index: usize },

    #[error("Item {index}: {field} required")]
    MissingField { index: usize, field: &'static str },

    #[error("Item {index}: invalid status '{status}'")]
    InvalidStatus { index: usize, status: String },

    #[error("Only one task can be in_progress (got {0})")]
    MultipleInProgress(usize),

    #[error("Too many items: {count} (max {max})")]
    TooMany { count: usize, max: usize },
}

impl From<TodoError> for ToolError {
    fn from(e: TodoError) -> Self {
        ToolError::InvalidInput(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("Unknown skill '{name}'. Available: {available}")]
    NotFound { name: String, available: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid skill header in {}: {reason}", path.display())]
    Header { path: PathBuf, reason: String },
}

impl From<SkillError> for ToolError {
    fn from(e: SkillError) -> Self {
        match e {
            SkillError::NotFound { name, available } => {
                ToolError::SkillNotFound { name, available }
            }
            other => ToolError::ExecutionFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing settings: {} (set them in the config file, the environment, or .env)", .0.join(", "))]
    Missing(Vec<String>),
}
