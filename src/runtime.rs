//! Owns everything a session needs and drives the top-level conversation.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::agent_types::AgentTypes;
use crate::config::{Config, RuntimeSettings};
use crate::dispatch::{ToolRegistry, ToolSet};
use crate::driver::{AgentContext, Conversation, build_system_prompt};
use crate::error::{AgentError, ConfigError};
use crate::llm::{LLM, OpenAIClient};
use crate::observe::{ConsoleObserver, MetricsCollector, MetricsSnapshot, MultiObserver, Observer};
use crate::skills::SkillRegistry;
use crate::tool::ToolContext;
use crate::tools::builtin_registry;
use crate::workspace::Workspace;

pub struct Runtime {
    workspace: Workspace,
    registry: ToolRegistry,
    llm: Arc<dyn LLM>,
    settings: RuntimeSettings,
    observer: Option<Arc<dyn Observer>>,
    metrics: Option<Arc<MetricsCollector>>,
    main: Conversation,
}

impl Runtime {
    /// Runtime over `workspace` with the built-in tools.
    pub fn new(workspace: Workspace, llm: Arc<dyn LLM>, settings: RuntimeSettings) -> Self {
        let registry = builtin_registry(&workspace.skills, &workspace.agent_types);
        let main = Conversation::new(AgentContext {
            name: "main".to_string(),
            system_prompt: build_system_prompt(
                workspace.workdir(),
                &workspace.skills,
                &workspace.agent_types,
            ),
            tools: ToolSet::All,
            max_iterations: settings.max_iterations,
        });
        Self {
            workspace,
            registry,
            llm,
            settings,
            observer: None,
            metrics: None,
            main,
        }
    }

    /// Build a session from merged configuration, with console output and
    /// metrics attached. Relative paths are taken against `cwd`.
    pub fn from_config(config: &Config, cwd: &Path) -> Result<Self, ConfigError> {
        let backend = config.backend()?;
        let llm = OpenAIClient::new(backend.api_key)
            .with_base_url(backend.base_url)
            .with_model(backend.model)
            .with_temperature(Some(backend.temperature))
            .with_timeout(backend.timeout);

        let workdir = config.workdir(cwd);
        let skills = SkillRegistry::load(&config.skills_dir(&workdir));
        let workspace = Workspace::new(
            &workdir,
            config.job_log_dir(&workdir),
            skills,
            AgentTypes::builtin(),
        );
        info!(
            workdir = %workspace.workdir().display(),
            skills = workspace.skills.len(),
            "session ready"
        );

        let metrics = Arc::new(MetricsCollector::new());
        let observer: Arc<dyn Observer> = Arc::new(MultiObserver::new(vec![
            Arc::new(ConsoleObserver::new(config.observe.verbose)),
            metrics.clone(),
        ]));

        let mut runtime = Self::new(workspace, Arc::new(llm), config.runtime_settings())
            .with_observer(observer);
        runtime.metrics = Some(metrics);
        Ok(runtime)
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run one user turn on the top-level conversation.
    pub async fn send(&mut self, input: &str) -> Result<String, AgentError> {
        let mut ctx = ToolContext::new(
            &mut self.workspace,
            &self.registry,
            self.llm.as_ref(),
            &self.settings,
        )
        .with_observer(self.observer.clone());
        self.main.send(input, &mut ctx).await
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn conversation(&self) -> &Conversation {
        &self.main
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.metrics.as_ref().map(|m| m.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMResponse, ScriptedLLM};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_history_survives_turns() {
        let tmp = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new(vec![
            LLMResponse::text("first"),
            LLMResponse::text("second"),
        ]));
        let mut runtime = Runtime::new(Workspace::bare(tmp.path()), llm.clone(), RuntimeSettings::default());

        assert_eq!(runtime.send("one").await.unwrap(), "first");
        assert_eq!(runtime.send("two").await.unwrap(), "second");

        let roles: Vec<&str> = runtime
            .conversation()
            .history()
            .iter()
            .map(|m| m.role.as_str())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user", "assistant"]);
        assert_eq!(llm.requests()[1].tool_names.len(), runtime.registry().len());
    }

    #[test]
    fn test_from_config_requires_backend_settings() {
        let tmp = TempDir::new().unwrap();
        let err = Runtime::from_config(&Config::default(), tmp.path()).err().unwrap();
        assert!(err.to_string().starts_with("missing settings: API_KEY, BASE_URL, MODEL"));
    }

    #[test]
    fn test_from_config_builds_session() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.apply_env_from(|key| match key {
            "API_KEY" => Some("k".to_string()),
            "BASE_URL" => Some("http://localhost:1/v1".to_string()),
            "MODEL" => Some("test-model".to_string()),
            _ => None,
        });
        let runtime = Runtime::from_config(&config, tmp.path()).unwrap();
        assert_eq!(runtime.model_name(), "test-model");
        assert!(runtime.workspace().skills.is_empty());
        assert_eq!(runtime.metrics().unwrap().llm_calls, 0);
    }
}
