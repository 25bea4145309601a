//! The conversation loop: query the model, run the tool calls it returns,
//! repeat until it answers without tools.

use std::path::Path;
use std::time::Instant;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::agent_types::AgentTypes;
use crate::dispatch::{ToolSet, dispatch};
use crate::error::AgentError;
use crate::llm::{ChatMessage, LLMError, LLMResponse, ToolSpec};
use crate::observe::Event;
use crate::retry::with_retry;
use crate::skills::SkillRegistry;
use crate::tool::ToolContext;
use crate::workspace::Workspace;

/// Immutable parameters of one conversation.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// "main" for the top level, the agent type name for sub-agents
    pub name: String,
    pub system_prompt: String,
    pub tools: ToolSet,
    /// Model round trips allowed per user turn; `None` is unbounded
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    AwaitingUserInput,
    ModelQuery,
    ToolExecution,
}

/// One conversation with private, append-only history.
#[derive(Debug)]
pub struct Conversation {
    context: AgentContext,
    history: Vec<ChatMessage>,
    state: DriverState,
    last_turn_steps: usize,
}

impl Conversation {
    pub fn new(context: AgentContext) -> Self {
        let history = vec![ChatMessage::system(context.system_prompt.clone())];
        Self {
            context,
            history,
            state: DriverState::AwaitingUserInput,
            last_turn_steps: 0,
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Model round trips taken by the most recent turn.
    pub fn last_turn_steps(&self) -> usize {
        self.last_turn_steps
    }

    /// Run one user turn to completion and return the final assistant text.
    ///
    /// A backend failure ends the turn with an error. History then holds
    /// everything appended before the failed call and nothing after it.
    pub async fn send(&mut self, input: &str, ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        ctx.emit(Event::TurnStart {
            agent: self.context.name.clone(),
            input: input.to_string(),
        })
        .await;
        self.history.push(ChatMessage::user(input));
        self.last_turn_steps = 0;

        let result = self.run_turn(ctx).await;
        self.state = DriverState::AwaitingUserInput;
        if let Err(e) = &result {
            ctx.emit(Event::Error {
                context: format!("{} turn", self.context.name),
                message: e.to_string(),
            })
            .await;
        }
        result
    }

    async fn run_turn(&mut self, ctx: &mut ToolContext<'_>) -> Result<String, AgentError> {
        let specs = self.context.tools.specs(ctx.registry);
        loop {
            if let Some(max) = self.context.max_iterations
                && self.last_turn_steps >= max
            {
                return Err(AgentError::MaxIterationsExceeded(max));
            }
            self.last_turn_steps += 1;

            self.state = DriverState::ModelQuery;
            let outgoing = self.outgoing(ctx).await;
            let response = query_backend(ctx, outgoing, &specs).await?;

            let content = response
                .content
                .as_deref()
                .map(strip_thinking)
                .filter(|c| !c.is_empty());

            if response.tool_calls.is_empty() {
                self.history.push(ChatMessage::assistant(content.clone(), Vec::new()));
                return Ok(content.unwrap_or_default());
            }

            self.state = DriverState::ToolExecution;
            let calls = response.tool_calls;
            self.history
                .push(ChatMessage::assistant(content, calls.clone()));
            for call in &calls {
                let outcome = dispatch(call, &self.context.tools, ctx).await;
                self.history
                    .push(ChatMessage::tool_result(call.id.clone(), outcome.content));
            }
        }
    }

    /// History plus a freshly built status message. The status message is
    /// never stored.
    async fn outgoing(&self, ctx: &mut ToolContext<'_>) -> Vec<ChatMessage> {
        let status = live_context(ctx.workspace);
        ctx.emit_finished_jobs().await;
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.extend_from_slice(&self.history);
        messages.push(ChatMessage::system(status));
        messages
    }
}

async fn query_backend(
    ctx: &ToolContext<'_>,
    messages: Vec<ChatMessage>,
    specs: &[ToolSpec],
) -> Result<LLMResponse, AgentError> {
    let llm = ctx.llm;
    let tools = (!specs.is_empty()).then(|| specs.to_vec());
    let start = Instant::now();
    let mut retries = Vec::new();

    let outcome = with_retry(
        &ctx.settings.retry,
        || llm.chat_complete(messages.clone(), tools.clone()),
        |e: &LLMError| e.is_retryable,
        |attempt, e, delay| {
            warn!(agent = %ctx.agent, attempt, error = %e, "backend call failed, retrying in {:?}", delay);
            retries.push((attempt, delay));
        },
    )
    .await;

    for (attempt, delay) in retries {
        ctx.emit(Event::Retry {
            operation: "llm_call".to_string(),
            attempt,
            delay_ms: delay.as_millis() as u64,
        })
        .await;
    }

    let response = outcome.result?;
    debug!(
        agent = %ctx.agent,
        attempts = outcome.attempts,
        tool_calls = response.tool_calls.len(),
        "backend responded"
    );
    ctx.emit(Event::LlmCall {
        agent: ctx.agent.clone(),
        model: llm.model_name().to_string(),
        tokens_in: response.usage.as_ref().map(|u| u.prompt_tokens),
        tokens_out: response.usage.as_ref().map(|u| u.completion_tokens),
        duration_ms: start.elapsed().as_millis() as u64,
        tool_calls: response.tool_calls.len(),
    })
    .await;
    Ok(response)
}

/// Current time and one line per background job. Refreshes every job.
pub fn live_context(workspace: &mut Workspace) -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    let jobs = workspace.jobs.summarize();
    if jobs.is_empty() {
        format!("Current time: {}\nNo background jobs.", now)
    } else {
        format!("Current time: {}\nBackground jobs:\n{}", now, jobs.join("\n"))
    }
}

/// System prompt for the top-level conversation.
pub fn build_system_prompt(workdir: &Path, skills: &SkillRegistry, agent_types: &AgentTypes) -> String {
    format!(
        "You are a coding agent at {}.

Loop: plan -> act with tools -> report.

**Skills available** (invoke with Skill tool when task matches):
{}

**Subagents available** (invoke with Task tool for focused subtasks):
{}

Rules:
- Use Skill tool IMMEDIATELY when a task matches a skill description
- Use Task tool for subtasks needing focused exploration or implementation
- Use TodoWrite to track multi-step work
- Start long-running commands with bash background=true and use wait instead of polling in a loop
- Prefer tools over prose. Act, don't just explain.
- After finishing, summarize what changed.",
        workdir.display(),
        skills.describe_all(),
        agent_types.describe()
    )
}

static THINK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?si)<think(?:ing)?>.*?</think(?:ing)?>",
        r"(?i)</?\s*think(?:ing)?\s*/?>",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Remove `<think>` / `<thinking>` blocks and stray tags from model output.
pub fn strip_thinking(content: &str) -> String {
    let mut text = content.to_string();
    for re in THINK_PATTERNS.iter() {
        text = re.replace_all(&text, "").into_owned();
    }
    text.trim().to_string()
}
