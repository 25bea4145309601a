//! Tool lookup, argument validation, and result rendering.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::llm::{ToolCall, ToolSpec};
use crate::observe::{Event, PREVIEW_CHARS, truncate};
use crate::tool::{Tool, ToolContext};

/// Every tool known to the process, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name replaces the earlier one
    /// in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// The tools one conversation may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSet {
    All,
    Only(BTreeSet<String>),
}

impl ToolSet {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ToolSet::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            ToolSet::All => true,
            ToolSet::Only(names) => names.contains(name),
        }
    }

    /// Schemas sent to the model, in registry order.
    pub fn specs(&self, registry: &ToolRegistry) -> Vec<ToolSpec> {
        registry
            .tools
            .iter()
            .filter(|t| self.contains(t.name()))
            .map(|t| t.spec())
            .collect()
    }

    /// Look `name` up. Tools registered globally but outside this set are
    /// reported as unknown.
    pub fn resolve(&self, registry: &ToolRegistry, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        if !self.contains(name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }
}

/// Rendered result of one dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: String,
    pub success: bool,
}

/// Route one model tool call. Never fails: every error becomes an
/// `Error: ...` result for the model to read.
pub async fn dispatch(call: &ToolCall, tools: &ToolSet, ctx: &mut ToolContext<'_>) -> ToolOutcome {
    let start = Instant::now();
    let result = match tools.resolve(ctx.registry, &call.name) {
        Ok(tool) => match validate_args(&tool.schema(), &call.arguments) {
            Ok(()) => {
                debug!(agent = %ctx.agent, tool = %call.name, "executing tool");
                tool.execute(call.arguments.clone(), ctx).await
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        warn!(agent = %ctx.agent, tool = %call.name, error = %e, "tool call failed");
    }
    let outcome = render_result(result, ctx.settings.max_tool_result_bytes);

    ctx.emit(Event::ToolCall {
        agent: ctx.agent.clone(),
        tool_name: call.name.clone(),
        params: call.arguments.clone(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: outcome.success,
        preview: truncate(&outcome.content, PREVIEW_CHARS),
    })
    .await;
    outcome
}

/// Check `args` against the subset of JSON schema the tools declare:
/// top-level object, `required`, primitive `type`s and `enum`.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let obj = args
        .as_object()
        .ok_or_else(|| ToolError::InvalidInput("arguments must be a JSON object".to_string()))?;

    let properties = schema.get("properties").and_then(|p| p.as_object());
    if let Some(raw) = obj.get("_raw").and_then(|v| v.as_str())
        && !properties.is_some_and(|p| p.contains_key("_raw"))
    {
        return Err(ToolError::InvalidInput(format!(
            "arguments are not valid JSON: {}",
            truncate(raw, 200)
        )));
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if obj.get(key).is_none_or(Value::is_null) {
                return Err(ToolError::InvalidInput(format!(
                    "missing required field '{}'",
                    key
                )));
            }
        }
    }

    let Some(properties) = properties else {
        return Ok(());
    };
    for (key, value) in obj {
        let Some(prop) = properties.get(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(ty) = prop.get("type").and_then(|t| t.as_str())
            && !type_matches(ty, value)
        {
            return Err(ToolError::InvalidInput(format!(
                "field '{}' must be of type {}",
                key, ty
            )));
        }
        if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array())
            && !allowed.contains(value)
        {
            let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            return Err(ToolError::InvalidInput(format!(
                "field '{}' must be one of {}",
                key,
                options.join(", ")
            )));
        }
    }
    Ok(())
}

/// Models regularly send booleans and numbers as strings; accept those.
fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "string" => value.is_string(),
        "boolean" => crate::tools::json_to_bool(value).is_some(),
        "integer" => crate::tools::json_to_f64(value).is_some_and(|n| n.fract() == 0.0),
        "number" => crate::tools::json_to_f64(value).is_some(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// Turn a tool result into the text stored in history.
pub fn render_result(result: Result<Value, ToolError>, max_bytes: usize) -> ToolOutcome {
    let (content, success) = match result {
        Ok(Value::String(s)) => (s, true),
        Ok(other) => (other.to_string(), true),
        Err(e) => (format!("Error: {}", e), false),
    };
    ToolOutcome {
        content: truncate_tool_result(content, max_bytes),
        success,
    }
}

fn truncate_tool_result(result: String, max_bytes: usize) -> String {
    if result.len() <= max_bytes {
        return result;
    }
    let total = result.len();
    let mut cut = max_bytes;
    while !result.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n\n[output truncated: {} bytes, showing first {}]",
        &result[..cut],
        total,
        cut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;
    use crate::llm::ScriptedLLM;
    use crate::workspace::Workspace;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the message back"
        }

        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "loud": {"type": "boolean"},
                    "mode": {"type": "string", "enum": ["plain", "fancy"]}
                },
                "required": ["message"]
            })
        }

        async fn execute(&self, input: Value, _ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
            let msg = input["message"].as_str().unwrap_or_default().to_string();
            if msg == "boom" {
                return Err(ToolError::ExecutionFailed("exploded".to_string()));
            }
            Ok(Value::String(msg))
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "placeholder"
        }

        fn schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _input: Value, _ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
            Ok(json!({"ok": true}))
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(EchoTool));
        r.register(Arc::new(NamedTool("other")));
        r
    }

    async fn run(tools: &ToolSet, name: &str, args: Value) -> ToolOutcome {
        let tmp = TempDir::new().unwrap();
        let mut ws = Workspace::bare(tmp.path());
        let reg = registry();
        let llm = ScriptedLLM::new(vec![]);
        let settings = RuntimeSettings::default();
        let mut ctx = ToolContext::new(&mut ws, &reg, &llm, &settings);
        dispatch(&ToolCall::new("c1", name, args), tools, &mut ctx).await
    }

    #[test]
    fn test_register_keeps_order_and_replaces() {
        let mut r = registry();
        r.register(Arc::new(NamedTool("echo")));
        assert_eq!(r.names(), vec!["echo", "other"]);
        assert_eq!(r.get("echo").unwrap().description(), "placeholder");
    }

    #[test]
    fn test_tool_set_specs_are_filtered() {
        let r = registry();
        assert_eq!(ToolSet::All.specs(&r).len(), 2);
        let only = ToolSet::only(["other"]);
        let specs = only.specs(&r);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "other");
    }

    #[test]
    fn test_resolve_respects_restriction() {
        let r = registry();
        let only = ToolSet::only(["other"]);
        assert!(matches!(
            only.resolve(&r, "echo"),
            Err(ToolError::UnknownTool(name)) if name == "echo"
        ));
        assert!(ToolSet::All.resolve(&r, "missing").is_err());
    }

    #[test]
    fn test_validate_required_and_types() {
        let schema = EchoTool.schema();
        assert!(validate_args(&schema, &json!({"message": "hi"})).is_ok());
        assert!(validate_args(&schema, &json!({"message": "hi", "loud": "true"})).is_ok());

        let err = validate_args(&schema, &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: missing required field 'message'");

        assert!(validate_args(&schema, &json!({"message": 3})).is_err());
        assert!(validate_args(&schema, &json!({"message": "x", "loud": "maybe"})).is_err());
        assert!(validate_args(&schema, &json!({"message": "x", "mode": "loud"})).is_err());
        assert!(validate_args(&schema, &json!("just a string")).is_err());
    }

    #[test]
    fn test_validate_numbers() {
        let schema = json!({
            "type": "object",
            "properties": {"n": {"type": "integer"}, "x": {"type": "number"}}
        });
        assert!(validate_args(&schema, &json!({"n": 3, "x": 1.5})).is_ok());
        assert!(validate_args(&schema, &json!({"n": "4", "x": "2.5"})).is_ok());
        assert!(validate_args(&schema, &json!({"n": 2.5})).is_err());
        assert!(validate_args(&schema, &json!({"x": "fast"})).is_err());
    }

    #[test]
    fn test_validate_reports_unparsed_arguments() {
        let err = validate_args(&EchoTool.schema(), &json!({"_raw": "{oops"})).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_render_and_truncate() {
        let ok = render_result(Ok(json!("plain")), 100);
        assert_eq!(ok.content, "plain");
        assert!(ok.success);

        let obj = render_result(Ok(json!({"a": 1})), 100);
        assert_eq!(obj.content, r#"{"a":1}"#);

        let err = render_result(Err(ToolError::UnknownTool("x".to_string())), 100);
        assert_eq!(err.content, "Error: Unknown tool: x");
        assert!(!err.success);

        let long = render_result(Ok(json!("é".repeat(50))), 11);
        assert!(long.content.starts_with("ééééé\n\n[output truncated: 100 bytes"));
    }

    #[tokio::test]
    async fn test_dispatch_success_and_errors() {
        let out = run(&ToolSet::All, "echo", json!({"message": "hi"})).await;
        assert_eq!(out, ToolOutcome { content: "hi".to_string(), success: true });

        let out = run(&ToolSet::All, "echo", json!({"message": "boom"})).await;
        assert_eq!(out.content, "Error: Execution failed: exploded");

        let out = run(&ToolSet::All, "nope", json!({})).await;
        assert_eq!(out.content, "Error: Unknown tool: nope");

        let out = run(&ToolSet::only(["other"]), "echo", json!({"message": "hi"})).await;
        assert_eq!(out.content, "Error: Unknown tool: echo");
        assert!(!out.success);
    }
}
