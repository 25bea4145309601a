pub mod agent_types;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod logging;
pub mod observe;
pub mod repl;
pub mod retry;
pub mod runtime;
pub mod skills;
pub mod subagent;
pub mod todo;
pub mod tool;
pub mod tools;
pub mod workspace;

// Re-export main types for convenience
pub use dispatch::{ToolRegistry, ToolSet};
pub use driver::Conversation;
pub use error::{AgentError, ToolError};
pub use llm::{LLM, OpenAIClient};
pub use runtime::Runtime;
pub use tool::{Tool, ToolContext};
pub use workspace::Workspace;
