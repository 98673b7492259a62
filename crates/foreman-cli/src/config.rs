//! `foreman.toml` parsing.
//!
//! Every section except `[model]` is optional; absent values fall back
//! to the defaults documented on each field. The provider API key can
//! be kept out of the file entirely and supplied through the
//! environment instead.

use std::path::PathBuf;
use std::time::Duration;

use foreman_core::{ForemanError, ForemanResult};
use foreman_llm::ModelConfig;
use foreman_suggest::{Credentials, SuggestSettings};
use serde::Deserialize;

/// Environment variable that overrides `[model] api_key` when set.
pub const API_KEY_ENV: &str = "FOREMAN_API_KEY";

/// The full configuration file.
#[derive(Debug, Deserialize)]
pub struct ForemanConfig {
    /// Provider, model, and request defaults for the generation gateway.
    pub model: ModelConfig,
    /// Bind address and auth for the HTTP surface.
    #[serde(default)]
    pub server: ServerConfig,
    /// Where the database lives.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Classifier tuning.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Suggestion pipeline tuning.
    #[serde(default)]
    pub suggestions: SuggestionsConfig,
    /// Workflow runner tuning and the definitions file.
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Integration presence flags for the prerequisite checks.
    #[serde(default)]
    pub credentials: Credentials,
}

impl ForemanConfig {
    /// Parses a config file and applies environment overrides.
    pub fn parse(raw: &str) -> ForemanResult<Self> {
        let mut config: ForemanConfig = toml::from_str(raw)
            .map_err(|e| ForemanError::Config(format!("foreman.toml: {e}")))?;
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.model.api_key = key;
            }
        }
        Ok(config)
    }
}

/// `[server]` section.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// API keys clients must present. Empty = no auth.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_keys: vec![],
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; `":memory:"` for an ephemeral database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// `[classifier]` section.
#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    /// Hard cap on the phase-two model call.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
}

impl ClassifierConfig {
    /// The timeout as a [`Duration`].
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            llm_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// `[suggestions]` section.
#[derive(Debug, Deserialize)]
pub struct SuggestionsConfig {
    /// Seconds between background generation passes.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    /// Seconds a pending suggestion lives before expiry.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Milliseconds an ingested suggestion stays hidden.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Ingestion hits allowed per agent inside the burst window.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: usize,
    /// Burst window in seconds.
    #[serde(default = "default_burst_window_secs")]
    pub burst_window_secs: u64,
    /// Ingestion hits allowed per agent per minute.
    #[serde(default = "default_minute_limit")]
    pub minute_limit: usize,
}

impl SuggestionsConfig {
    /// The section as pipeline settings.
    pub fn settings(&self) -> SuggestSettings {
        SuggestSettings {
            cycle_interval: Duration::from_secs(self.cycle_interval_secs),
            ttl: Duration::from_secs(self.ttl_secs),
            debounce: Duration::from_millis(self.debounce_ms),
            burst_limit: self.burst_limit,
            burst_window: Duration::from_secs(self.burst_window_secs),
            minute_limit: self.minute_limit,
        }
    }
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
            ttl_secs: default_ttl_secs(),
            debounce_ms: default_debounce_ms(),
            burst_limit: default_burst_limit(),
            burst_window_secs: default_burst_window_secs(),
            minute_limit: default_minute_limit(),
        }
    }
}

/// `[workflow]` section.
#[derive(Debug, Deserialize)]
pub struct WorkflowConfig {
    /// Concurrent workers draining the step queue.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Retries after a failed step attempt.
    #[serde(default = "default_retries")]
    pub retries: usize,
    /// The workflow definitions file.
    #[serde(default = "default_workflow_path")]
    pub path: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            retries: default_retries(),
            path: default_workflow_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_db_path() -> String {
    "./data/foreman.db".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    10
}
fn default_cycle_interval_secs() -> u64 {
    300
}
fn default_ttl_secs() -> u64 {
    86_400
}
fn default_debounce_ms() -> u64 {
    5_000
}
fn default_burst_limit() -> usize {
    5
}
fn default_burst_window_secs() -> u64 {
    10
}
fn default_minute_limit() -> usize {
    30
}
fn default_pool_size() -> usize {
    2
}
fn default_retries() -> usize {
    1
}
fn default_workflow_path() -> PathBuf {
    PathBuf::from("./workflows.toml")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use foreman_llm::LlmProvider;

    const MINIMAL: &str = r#"
[model]
provider = "openrouter"
model_id = "anthropic/claude-sonnet"
"#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = ForemanConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.model.provider, LlmProvider::OpenRouter);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert!(config.server.api_keys.is_empty());
        assert_eq!(config.storage.db_path, "./data/foreman.db");
        assert_eq!(config.classifier.llm_timeout(), Duration::from_secs(10));
        assert_eq!(config.workflow.pool_size, 2);
        assert_eq!(config.workflow.retries, 1);
        assert_eq!(config.workflow.path, PathBuf::from("./workflows.toml"));
        assert!(config.credentials.smtp_host.is_none());

        let settings = config.suggestions.settings();
        assert_eq!(settings.cycle_interval, Duration::from_secs(300));
        assert_eq!(settings.ttl, Duration::from_secs(86_400));
        assert_eq!(settings.debounce, Duration::from_millis(5_000));
        assert_eq!(settings.burst_limit, 5);
        assert_eq!(settings.minute_limit, 30);
    }

    #[test]
    fn test_sections_override_defaults() {
        let raw = r#"
[model]
provider = "groq"
model_id = "llama-3.3-70b"
api_key = "gsk-test"

[server]
port = 8080
api_keys = ["ops-key"]

[storage]
db_path = ":memory:"

[classifier]
llm_timeout_secs = 3

[suggestions]
cycle_interval_secs = 60
debounce_ms = 0

[workflow]
pool_size = 4
path = "./demo/workflows.toml"

[credentials]
smtp_host = "smtp.example.com"
"#;
        let config = ForemanConfig::parse(raw).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.api_keys, vec!["ops-key".to_string()]);
        assert_eq!(config.storage.db_path, ":memory:");
        assert_eq!(config.classifier.llm_timeout(), Duration::from_secs(3));
        assert_eq!(config.suggestions.settings().debounce, Duration::ZERO);
        assert_eq!(config.workflow.pool_size, 4);
        assert_eq!(config.workflow.path, PathBuf::from("./demo/workflows.toml"));
        assert_eq!(
            config.credentials.smtp_host.as_deref(),
            Some("smtp.example.com")
        );
        // Untouched knobs keep their defaults.
        assert_eq!(config.suggestions.settings().ttl, Duration::from_secs(86_400));
        assert_eq!(config.workflow.retries, 1);
    }

    #[test]
    fn test_env_var_overrides_model_key() {
        std::env::set_var(API_KEY_ENV, "from-env");
        let config = ForemanConfig::parse(MINIMAL).unwrap();
        std::env::remove_var(API_KEY_ENV);
        assert_eq!(config.model.api_key, "from-env");
    }

    #[test]
    fn test_unknown_provider_is_a_config_error() {
        let raw = r#"
[model]
provider = "mainframe"
model_id = "cobol-1"
"#;
        let err = ForemanConfig::parse(raw).unwrap_err();
        assert!(matches!(err, ForemanError::Config(_)));
    }
}
