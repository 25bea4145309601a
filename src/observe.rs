//! Agent events and the observers that consume them.
//!
//! Diagnostics go through `tracing`; this module carries the user-facing
//! progress stream (tool activity, jobs, sub-agents) and in-memory counters.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Characters of a tool result shown in progress output.
pub const PREVIEW_CHARS: usize = 200;

/// Events emitted while a conversation runs.
#[derive(Debug, Clone, Serialize)]
pub enum Event {
    /// A user turn started on a driver
    TurnStart { agent: String, input: String },
    /// One backend round trip finished
    LlmCall {
        agent: String,
        model: String,
        tokens_in: Option<u32>,
        tokens_out: Option<u32>,
        duration_ms: u64,
        tool_calls: usize,
    },
    /// A tool call was dispatched and produced a result (or an error result)
    ToolCall {
        agent: String,
        tool_name: String,
        params: serde_json::Value,
        duration_ms: u64,
        success: bool,
        /// Leading part of the rendered result
        preview: String,
    },
    JobStarted {
        job_id: u64,
        pid: u32,
        command: String,
        log_file: String,
    },
    /// A background job was observed in a terminal state for the first time
    JobFinished {
        job_id: u64,
        status: String,
        exit_code: Option<i32>,
    },
    SubagentStart {
        agent_type: String,
        description: String,
    },
    SubagentComplete {
        agent_type: String,
        steps: usize,
        duration_ms: u64,
        success: bool,
    },
    Retry {
        operation: String,
        attempt: usize,
        delay_ms: u64,
    },
    Error { context: String, message: String },
}

#[async_trait]
pub trait Observer: Send + Sync {
    async fn observe(&self, event: Event);
}

/// Prints progress lines to stderr.
pub struct ConsoleObserver {
    /// When true, also prints turn starts, backend calls and retries.
    pub verbose: bool,
}

impl ConsoleObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn format(&self, event: &Event) -> Option<String> {
        match event {
            Event::TurnStart { agent, input } => self
                .verbose
                .then(|| format!("[{}] turn: {}", agent, truncate(input, 80))),
            Event::LlmCall {
                agent,
                model,
                tokens_in,
                tokens_out,
                duration_ms,
                tool_calls,
            } => self.verbose.then(|| {
                let tokens = match (tokens_in, tokens_out) {
                    (Some(i), Some(o)) => format!(" ({}→{} tokens)", i, o),
                    _ => String::new(),
                };
                format!(
                    "[{}] {} call took {}ms{}, {} tool call(s)",
                    agent, model, duration_ms, tokens, tool_calls
                )
            }),
            Event::ToolCall {
                agent,
                tool_name,
                params,
                success,
                preview,
                ..
            } => {
                let indent = if agent == "main" { "" } else { "    " };
                let marker = if *success { ">" } else { "!" };
                Some(format!(
                    "{indent}{marker} {tool_name} {}\n{indent}  {}",
                    truncate(&params.to_string(), 120),
                    preview.replace('\n', &format!("\n{indent}  "))
                ))
            }
            Event::JobStarted {
                job_id,
                pid,
                log_file,
                ..
            } => Some(format!("[job {}] started pid {} -> {}", job_id, pid, log_file)),
            Event::JobFinished {
                job_id,
                status,
                exit_code,
            } => Some(match exit_code {
                Some(code) => format!("[job {}] {} (exit {})", job_id, status, code),
                None => format!("[job {}] {}", job_id, status),
            }),
            Event::SubagentStart {
                agent_type,
                description,
            } => Some(format!("  [{}] {}", agent_type, description)),
            Event::SubagentComplete {
                agent_type,
                steps,
                duration_ms,
                success,
            } => {
                let status = if *success { "done" } else { "failed" };
                Some(format!(
                    "  [{}] {} ({} steps, {:.1}s)",
                    agent_type,
                    status,
                    steps,
                    *duration_ms as f64 / 1000.0
                ))
            }
            Event::Retry {
                operation,
                attempt,
                delay_ms,
            } => self.verbose.then(|| {
                format!("[retry] {} attempt {} after {}ms", operation, attempt, delay_ms)
            }),
            Event::Error { context, message } => Some(format!("[error] {}: {}", context, message)),
        }
    }
}

#[async_trait]
impl Observer for ConsoleObserver {
    async fn observe(&self, event: Event) {
        if let Some(line) = self.format(&event) {
            eprintln!("{}", line);
        }
    }
}

/// In-memory counters.
#[derive(Default)]
pub struct MetricsCollector {
    pub llm_calls: AtomicU64,
    pub tool_calls: AtomicU64,
    pub tool_errors: AtomicU64,
    pub retries: AtomicU64,
    pub total_tokens: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_errors: self.tool_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Observer for MetricsCollector {
    async fn observe(&self, event: Event) {
        match event {
            Event::LlmCall {
                tokens_in,
                tokens_out,
                ..
            } => {
                self.llm_calls.fetch_add(1, Ordering::Relaxed);
                let tokens = tokens_in.unwrap_or(0) as u64 + tokens_out.unwrap_or(0) as u64;
                self.total_tokens.fetch_add(tokens, Ordering::Relaxed);
            }
            Event::ToolCall { success, .. } => {
                self.tool_calls.fetch_add(1, Ordering::Relaxed);
                if !success {
                    self.tool_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            Event::Retry { .. } => {
                self.retries.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub llm_calls: u64,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub retries: u64,
    pub total_tokens: u64,
}

/// Fans each event out to several observers in order.
pub struct MultiObserver {
    observers: Vec<Arc<dyn Observer>>,
}

impl MultiObserver {
    pub fn new(observers: Vec<Arc<dyn Observer>>) -> Self {
        Self { observers }
    }
}

#[async_trait]
impl Observer for MultiObserver {
    async fn observe(&self, event: Event) {
        for observer in &self.observers {
            observer.observe(event.clone()).await;
        }
    }
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_event(success: bool) -> Event {
        Event::ToolCall {
            agent: "main".to_string(),
            tool_name: "bash".to_string(),
            params: json!({"command": "ls"}),
            duration_ms: 3,
            success,
            preview: "a\nb".to_string(),
        }
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_console_quiet_mode_hides_llm_calls() {
        let quiet = ConsoleObserver::new(false);
        let event = Event::LlmCall {
            agent: "main".to_string(),
            model: "m".to_string(),
            tokens_in: Some(1),
            tokens_out: Some(2),
            duration_ms: 5,
            tool_calls: 0,
        };
        assert!(quiet.format(&event).is_none());
        assert!(ConsoleObserver::new(true).format(&event).is_some());
    }

    #[test]
    fn test_console_formats_tool_and_job_lines() {
        let console = ConsoleObserver::new(false);
        let line = console.format(&tool_event(true)).unwrap();
        assert!(line.starts_with("> bash {\"command\":\"ls\"}"));
        assert!(line.contains("  a\n  b"));

        let finished = Event::JobFinished {
            job_id: 2,
            status: "failed".to_string(),
            exit_code: Some(3),
        };
        assert_eq!(console.format(&finished).unwrap(), "[job 2] failed (exit 3)");
    }

    #[tokio::test]
    async fn test_metrics_counts_tool_errors() {
        let metrics = MetricsCollector::new();
        metrics.observe(tool_event(true)).await;
        metrics.observe(tool_event(false)).await;
        metrics
            .observe(Event::Retry {
                operation: "llm".to_string(),
                attempt: 1,
                delay_ms: 10,
            })
            .await;

        let snap = metrics.snapshot();
        assert_eq!(snap.tool_calls, 2);
        assert_eq!(snap.tool_errors, 1);
        assert_eq!(snap.retries, 1);
    }

    #[tokio::test]
    async fn test_multi_observer_fans_out() {
        let a = Arc::new(MetricsCollector::new());
        let b = Arc::new(MetricsCollector::new());
        let multi = MultiObserver::new(vec![a.clone(), b.clone()]);
        multi.observe(tool_event(true)).await;
        assert_eq!(a.snapshot().tool_calls, 1);
        assert_eq!(b.snapshot().tool_calls, 1);
    }
}
