use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[async_trait]
pub trait LLM: Send + Sync {
    async fn chat_complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSpec>>,
    ) -> Result<LLMResponse, LLMError>;

    /// Returns the model name for observability purposes.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant", "tool"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_call_id: None,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON schema
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

impl LLMResponse {
    /// A final answer with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            usage: None,
        }
    }
}

/// Token usage information from LLM API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ---------------------------------------------------------------------------
// LLMError
// ---------------------------------------------------------------------------

/// Error from LLM operations with retryability classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub is_retryable: bool,
}

impl LLMError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            is_retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            is_retryable: false,
        }
    }

    /// Classify an HTTP status code as retryable or not.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let is_retryable = matches!(status, 408 | 429 | 500..=599);
        Self {
            message: message.into(),
            status_code: Some(status),
            is_retryable,
        }
    }
}

impl std::fmt::Display for LLMError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(status) = self.status_code {
            write!(f, "LLMError ({}): {}", status, self.message)
        } else {
            write!(f, "LLMError: {}", self.message)
        }
    }
}

impl std::error::Error for LLMError {}

// ---------------------------------------------------------------------------
// Wire formatting
// ---------------------------------------------------------------------------

/// Format tool calls for the OpenAI-compatible API (arguments as JSON string).
fn format_tool_calls_for_api(tool_calls: &[ToolCall]) -> Vec<Value> {
    tool_calls
        .iter()
        .map(|tc| {
            let arguments = match tc.arguments.get("_raw").and_then(|v| v.as_str()) {
                Some(raw) => raw.to_string(),
                None => tc.arguments.to_string(),
            };
            serde_json::json!({
                "id": tc.id,
                "type": "function",
                "function": {
                    "name": tc.name,
                    "arguments": arguments
                }
            })
        })
        .collect()
}

fn format_messages_openai(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            let mut val = serde_json::json!({ "role": msg.role });
            // Assistant turns that only carry tool calls still need a content key.
            val["content"] = match &msg.content {
                Some(c) => Value::String(c.clone()),
                None => Value::Null,
            };
            if let Some(id) = &msg.tool_call_id {
                val["tool_call_id"] = Value::String(id.clone());
            }
            if let Some(tcs) = &msg.tool_calls
                && !tcs.is_empty()
            {
                val["tool_calls"] = Value::Array(format_tool_calls_for_api(tcs));
            }
            val
        })
        .collect()
}

fn format_tools_openai(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters
                }
            })
        })
        .collect()
}

/// Parse an OpenAI tool_calls JSON array into `Vec<ToolCall>`.
///
/// Arguments that are not valid JSON are kept as `{"_raw": "..."}` so the
/// dispatcher can report a validation error to the model instead of the call
/// silently vanishing.
fn parse_openai_tool_calls(value: &Value) -> Vec<ToolCall> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let id = tc["id"].as_str()?.to_string();
                    let name = tc["function"]["name"].as_str()?.to_string();
                    let arguments = match &tc["function"]["arguments"] {
                        Value::String(s) if s.trim().is_empty() => serde_json::json!({}),
                        Value::String(s) => serde_json::from_str(s)
                            .unwrap_or_else(|_| serde_json::json!({ "_raw": s })),
                        Value::Null => serde_json::json!({}),
                        other => other.clone(),
                    };
                    Some(ToolCall {
                        id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_openai_usage(value: &Value) -> Option<UsageInfo> {
    value.as_object().map(|u| UsageInfo {
        prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        completion_tokens: u
            .get("completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
    })
}

// ---------------------------------------------------------------------------
// OpenAI-compatible client
// ---------------------------------------------------------------------------

pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f64>,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_http_client(Duration::from_secs(300)),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_http_client(timeout);
        self
    }

    fn build_body(&self, messages: &[ChatMessage], tools: Option<&[ToolSpec]>) -> Value {
        let mut request_body = serde_json::json!({
            "model": self.model,
            "messages": format_messages_openai(messages),
        });
        if let Some(tool_list) = tools
            && !tool_list.is_empty()
        {
            request_body["tools"] = Value::Array(format_tools_openai(tool_list));
            request_body["tool_choice"] = serde_json::json!("auto");
        }
        if let Some(t) = self.temperature {
            request_body["temperature"] = serde_json::json!(t);
        }
        request_body
    }
}

fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[async_trait]
impl LLM for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat_complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSpec>>,
    ) -> Result<LLMResponse, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request_body = self.build_body(&messages, tools.as_deref());

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LLMError::retryable(format!("Failed to send request: {}", e)))?;

        let status = response.status().as_u16();

        let response_text = response
            .text()
            .await
            .map_err(|e| LLMError::retryable(format!("Failed to read response: {}", e)))?;

        if status >= 400 {
            return Err(LLMError::from_status(
                status,
                format!("API error: {}", response_text),
            ));
        }

        let parsed: Value = serde_json::from_str(&response_text)
            .map_err(|e| LLMError::permanent(format!("Failed to parse response: {}", e)))?;

        let message = &parsed["choices"][0]["message"];
        if message.is_null() {
            return Err(LLMError::permanent("Response contained no choices"));
        }

        Ok(LLMResponse {
            content: message["content"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            tool_calls: parse_openai_tool_calls(&message["tool_calls"]),
            usage: parse_openai_usage(&parsed["usage"]),
        })
    }
}

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// One request as seen by [`ScriptedLLM`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

/// Backend that replays a fixed queue of responses and records each request.
///
/// Used for offline runs and tests. An exhausted script yields a permanent
/// error.
pub struct ScriptedLLM {
    responses: Mutex<VecDeque<Result<LLMResponse, LLMError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLLM {
    pub fn new(responses: Vec<LLMResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<LLMResponse, LLMError>>) -> Self {
        Self {
            responses: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl LLM for ScriptedLLM {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn chat_complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSpec>>,
    ) -> Result<LLMResponse, LLMError> {
        let tool_names = tools
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.name)
            .collect();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                messages,
                tool_names,
            });
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::permanent("script exhausted")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
