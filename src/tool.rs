use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RuntimeSettings;
use crate::dispatch::ToolRegistry;
use crate::error::ToolError;
use crate::llm::{LLM, ToolSpec};
use crate::observe::{Event, Observer};
use crate::workspace::Workspace;

/// A tool that the model can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of this tool.
    fn name(&self) -> &str;

    /// Returns a human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// Returns the JSON schema for this tool's input parameters.
    fn schema(&self) -> Value;

    /// Executes the tool with arguments that already passed schema validation.
    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema(),
        }
    }
}

/// Everything a tool call may touch, borrowed for the duration of one call.
///
/// Exclusive access to the workspace is what keeps tool execution strictly
/// sequential: a nested sub-agent reborrows the same context through
/// [`ToolContext::scoped`] and the parent cannot run anything until it
/// returns.
pub struct ToolContext<'a> {
    pub workspace: &'a mut Workspace,
    pub registry: &'a ToolRegistry,
    pub llm: &'a dyn LLM,
    pub settings: &'a RuntimeSettings,
    pub observer: Option<Arc<dyn Observer>>,
    /// Name of the conversation issuing the call ("main" or the agent type)
    pub agent: String,
}

impl<'a> ToolContext<'a> {
    pub fn new(
        workspace: &'a mut Workspace,
        registry: &'a ToolRegistry,
        llm: &'a dyn LLM,
        settings: &'a RuntimeSettings,
    ) -> Self {
        Self {
            workspace,
            registry,
            llm,
            settings,
            observer: None,
            agent: "main".to_string(),
        }
    }

    pub fn with_observer(mut self, observer: Option<Arc<dyn Observer>>) -> Self {
        self.observer = observer;
        self
    }

    /// Reborrow this context for a nested conversation named `agent`.
    pub fn scoped(&mut self, agent: impl Into<String>) -> ToolContext<'_> {
        ToolContext {
            workspace: &mut *self.workspace,
            registry: self.registry,
            llm: self.llm,
            settings: self.settings,
            observer: self.observer.clone(),
            agent: agent.into(),
        }
    }

    pub async fn emit(&self, event: Event) {
        if let Some(observer) = &self.observer {
            observer.observe(event).await;
        }
    }

    /// Emit `JobFinished` for every job that reached a terminal state since
    /// the last call.
    pub async fn emit_finished_jobs(&mut self) {
        for t in self.workspace.jobs.drain_finished() {
            self.emit(Event::JobFinished {
                job_id: t.job_id,
                status: t.status.to_string(),
                exit_code: t.exit_code,
            })
            .await;
        }
    }
}
