use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Config file looked up in the current directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "kestrel.toml";

fn default_timeout_secs() -> u64 {
    300
}

fn default_subagent_max_steps() -> usize {
    10
}

fn default_max_tool_result_bytes() -> usize {
    50_000
}

fn default_shell_timeout_secs() -> u64 {
    120
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_exponential_base() -> f64 {
    2.0
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub observe: ObserveSection,
}

#[derive(Debug, Deserialize)]
pub struct LlmSection {
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Usually left out of the file and supplied through `API_KEY`
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: None,
            base_url: None,
            api_key: None,
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSection {
    /// Model round trips per top-level turn; unbounded when absent
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default = "default_subagent_max_steps")]
    pub subagent_max_steps: usize,
    #[serde(default = "default_max_tool_result_bytes")]
    pub max_tool_result_bytes: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: None,
            subagent_max_steps: default_subagent_max_steps(),
            max_tool_result_bytes: default_max_tool_result_bytes(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkspaceSection {
    pub workdir: Option<PathBuf>,
    pub skills_dir: Option<PathBuf>,
    pub job_log_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct RetrySection {
    /// Maximum number of retry attempts (0 = no retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay_ms: self.initial_delay_ms,
            max_delay_ms: self.max_delay_ms,
            exponential_base: self.exponential_base,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ObserveSection {
    /// Also print backend calls and retries
    #[serde(default)]
    pub verbose: bool,
}

/// Validated backend connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub temperature: f64,
    pub timeout: Duration,
}

/// Limits consulted while a conversation runs.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub max_iterations: Option<usize>,
    pub subagent_max_steps: usize,
    pub max_tool_result_bytes: usize,
    pub shell_timeout: Duration,
    pub max_wait: Duration,
    pub retry: RetryPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Config::default().runtime_settings()
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given (it must exist), else `./kestrel.toml` when
    /// present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Let `API_KEY`, `BASE_URL` and `MODEL` override the file.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = non_empty("BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = non_empty("MODEL") {
            self.llm.model = Some(v);
        }
    }

    /// Backend settings, or every missing name at once.
    pub fn backend(&self) -> Result<BackendSettings, ConfigError> {
        let present = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).map(String::from);
        let api_key = present(&self.llm.api_key);
        let base_url = present(&self.llm.base_url);
        let model = present(&self.llm.model);

        match (api_key, base_url, model) {
            (Some(api_key), Some(base_url), Some(model)) => Ok(BackendSettings {
                model,
                base_url,
                api_key,
                temperature: self.llm.temperature,
                timeout: Duration::from_secs(self.llm.timeout_secs),
            }),
            (api_key, base_url, model) => {
                let missing = [("API_KEY", api_key), ("BASE_URL", base_url), ("MODEL", model)]
                    .into_iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(name, _)| name.to_string())
                    .collect();
                Err(ConfigError::Missing(missing))
            }
        }
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            max_iterations: self.agent.max_iterations,
            subagent_max_steps: self.agent.subagent_max_steps,
            max_tool_result_bytes: self.agent.max_tool_result_bytes,
            shell_timeout: Duration::from_secs(self.tools.shell_timeout_secs),
            max_wait: Duration::from_secs(self.tools.max_wait_secs),
            retry: self.retry.to_policy(),
        }
    }

    /// Configured workdir, or `cwd`.
    pub fn workdir(&self, cwd: &Path) -> PathBuf {
        match &self.workspace.workdir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd.to_path_buf(),
        }
    }

    /// Configured skills directory, or `<workdir>/skills`.
    pub fn skills_dir(&self, workdir: &Path) -> PathBuf {
        match &self.workspace.skills_dir {
            Some(dir) => workdir.join(dir),
            None => workdir.join("skills"),
        }
    }

    pub fn job_log_dir(&self, workdir: &Path) -> Option<PathBuf> {
        self.workspace.job_log_dir.as_ref().map(|d| workdir.join(d))
    }
}
