//! Nested conversations for the Task tool.
//!
//! A sub-agent gets a fresh private history and a restricted tool set, but
//! runs against the same workspace as its caller. The caller is suspended
//! until the sub-agent finishes.

use std::time::Instant;

use tracing::info;

use crate::dispatch::ToolSet;
use crate::driver::{AgentContext, Conversation};
use crate::error::{AgentError, ToolError};
use crate::observe::Event;
use crate::tool::ToolContext;

pub const STEP_LIMIT_RESULT: &str = "(subagent step limit reached)";

/// Run `prompt` as a sub-agent of type `agent_type` and return its final text.
pub async fn run_subagent(
    description: &str,
    prompt: &str,
    agent_type: &str,
    ctx: &mut ToolContext<'_>,
) -> Result<String, ToolError> {
    let kind = ctx
        .workspace
        .agent_types
        .get(agent_type)
        .cloned()
        .ok_or_else(|| ToolError::UnknownAgentType(agent_type.to_string()))?;

    let mut tools = kind.tools.clone();
    tools.remove("Task");
    let context = AgentContext {
        name: kind.name.clone(),
        system_prompt: kind.system_prompt(ctx.workspace.workdir()),
        tools: ToolSet::Only(tools),
        max_iterations: Some(ctx.settings.subagent_max_steps),
    };

    info!(agent_type = %kind.name, description, "starting subagent");
    ctx.emit(Event::SubagentStart {
        agent_type: kind.name.clone(),
        description: description.to_string(),
    })
    .await;

    let start = Instant::now();
    let mut conversation = Conversation::new(context);
    let result = {
        let mut sub_ctx = ctx.scoped(kind.name.clone());
        conversation.send(prompt, &mut sub_ctx).await
    };

    ctx.emit(Event::SubagentComplete {
        agent_type: kind.name.clone(),
        steps: conversation.last_turn_steps(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: result.is_ok(),
    })
    .await;

    match result {
        Ok(text) if text.trim().is_empty() => Ok("(subagent finished)".to_string()),
        Ok(text) => Ok(text),
        Err(AgentError::MaxIterationsExceeded(_)) => {
            Err(ToolError::SubagentFailed(STEP_LIMIT_RESULT.to_string()))
        }
        Err(AgentError::Backend(e)) => Err(ToolError::SubagentFailed(format!("Subagent error: {}", e))),
    }
}
